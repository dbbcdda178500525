use genflow::core::codes;
use genflow::core::config::ConfigStore;
use genflow::core::transform::{enhance_command, fill_arguments, ResolutionCache};
use genflow_types::{GenericWorkflow, GenericWorkflowFile, GenericWorkflowJob};
use serde_json::{json, Value};
use std::collections::HashMap;

const TEMPLATE: &str = "-g {graphFile} -r {repoConfig} -o {outDir} -n {graphNodeId}";

fn config(extra: Value) -> ConfigStore {
    let mut root = json!({
        "payloadName": "demo",
        "outDir": "${SCRATCH}/{payloadName}",
        "whenSaveJobGraph": "TRANSFORM",
    });
    if let (Some(root), Value::Object(extra)) = (root.as_object_mut(), extra) {
        root.extend(extra);
    }
    ConfigStore::with_default_order(root)
        .unwrap()
        .with_env(HashMap::from([("SCRATCH".to_string(), "/scratch".to_string())]))
}

fn workflow() -> GenericWorkflow {
    let mut wf = GenericWorkflow::new("wf");
    wf.add_file(GenericWorkflowFile::new("runGraphFile", "/sub/run.graph", false, true, true));
    wf.add_job_inputs(
        "j1",
        [
            GenericWorkflowFile::new("graphFile_j1", "/sub/jobs/isr/j1.graph", true, true, true),
            GenericWorkflowFile::new("repoConfig", "/data/repo.yaml", false, true, true),
        ],
    );
    wf
}

fn job() -> GenericWorkflowJob {
    let mut job = GenericWorkflowJob::new("j1", "isr");
    job.arguments = Some(TEMPLATE.to_string());
    job.cmdvals.insert("graphNodeId".into(), json!("3,4"));
    job
}

fn enhanced(config: &ConfigStore) -> GenericWorkflowJob {
    let wf = workflow();
    let mut job = job();
    enhance_command(config, &wf, &mut job, &mut ResolutionCache::new()).unwrap();
    job
}

#[test]
fn lazy_mode_keeps_markers_and_records_values() {
    let job = enhanced(&config(json!({})));
    assert_eq!(
        job.arguments.as_deref(),
        Some("-g <FILE:graphFile_j1> -r <FILE:repoConfig> -o {outDir} -n {graphNodeId}")
    );
    assert_eq!(job.cmdvals.get("outDir"), Some(&json!("<ENV:SCRATCH>/demo")));
}

#[test]
fn eager_and_lazy_agree_under_the_same_file_policy() {
    let eager = enhanced(&config(json!({"useLazyCommands": false})));
    assert_eq!(
        eager.arguments.as_deref(),
        Some("-g /sub/jobs/isr/j1.graph -r /data/repo.yaml -o /scratch/demo -n 3,4")
    );

    let lazy_config = config(json!({}));
    let lazy = enhanced(&lazy_config);
    let filled = fill_arguments(
        true,
        &workflow(),
        lazy.arguments.as_deref().unwrap(),
        &lazy.cmdvals,
        lazy_config.env(),
    )
    .unwrap();
    assert_eq!(Some(filled.as_str()), eager.arguments.as_deref());
}

#[test]
fn without_shared_files_transferred_files_use_base_names() {
    let eager = enhanced(&config(json!({"useLazyCommands": false, "useShared": false})));
    assert_eq!(
        eager.arguments.as_deref(),
        Some("-g j1.graph -r /data/repo.yaml -o /scratch/demo -n 3,4")
    );
}

#[test]
fn graph_file_falls_back_to_run_graph_when_never_saved() {
    let config = config(json!({"whenSaveJobGraph": "NEVER"}));
    let mut wf = workflow();
    let run_graph = wf.get_file("runGraphFile").cloned().unwrap();
    wf.add_job_inputs("j1", [run_graph]);
    let mut job = job();
    enhance_command(&config, &wf, &mut job, &mut ResolutionCache::new()).unwrap();
    assert!(job
        .arguments
        .as_deref()
        .unwrap()
        .starts_with("-g <FILE:runGraphFile> "));
}

#[test]
fn unknown_placeholder_names_the_token() {
    let config = config(json!({}));
    let wf = workflow();
    let mut job = job();
    job.arguments = Some("-x {nowhere}".into());
    let err = enhance_command(&config, &wf, &mut job, &mut ResolutionCache::new()).unwrap_err();
    assert_eq!(err.code, codes::UNRESOLVED_PLACEHOLDER);
    assert_eq!(err.context.get("token"), Some(&"{nowhere}".to_string()));
}
