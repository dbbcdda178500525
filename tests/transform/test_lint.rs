use genflow::core::codes;
use genflow::core::config::ConfigStore;
use genflow::core::graph::{ArtifactRef, InMemoryGraph, WorkNode};
use genflow::core::lint::{validate, LintRegistry, LintSeverity};
use genflow::core::transform::transform;
use genflow_types::{GenericWorkflow, GenericWorkflowFile, GenericWorkflowJob};
use insta::assert_snapshot;
use serde_json::json;
use std::collections::HashMap;
use tempfile::TempDir;

fn job(name: &str, label: &str, arguments: &str) -> GenericWorkflowJob {
    let mut job = GenericWorkflowJob::new(name, label);
    job.arguments = Some(arguments.to_string());
    job
}

#[test]
fn transformed_workflow_lints_clean() {
    let tmp = TempDir::new().unwrap();
    let config = ConfigStore::with_default_order(json!({
        "uniqProcName": "lint_run",
        "runGraphFile": tmp.path().join("lint_run.graph.json").display().to_string(),
        "repoConfig": "/repo/butler.yaml",
        "runUnitCommand": "runner --graph {graphFile} --repo {repoConfig} --node {graphNodeId}",
        "task": {"init": {"runUnitCommand": "initexe --graph {graphFile}"}},
        "finalJob": {"whenRun": "SUCCESS", "command1": "finalize {runGraphFile}"},
    }))
    .unwrap()
    .with_env(HashMap::new());
    let graph = InMemoryGraph::new(
        "g",
        vec![
            WorkNode::new("1", "isr").writes(ArtifactRef::new("post").with("v", 1)),
            WorkNode::new("2", "calib").reads(ArtifactRef::new("post").with("v", 1)),
        ],
    )
    .unwrap();

    let (workflow, _) = transform(&config, &graph, tmp.path()).unwrap();
    assert!(LintRegistry::new().run(&workflow).is_empty());
    assert!(validate(&workflow).unwrap().is_empty());
}

#[test]
fn detached_files_and_missing_values_are_reported_in_order() {
    let mut wf = GenericWorkflow::new("broken");
    wf.add_file(GenericWorkflowFile::new("runGraphFile", "/sub/run.graph", false, true, true));
    wf.add_job(job("b", "calib", "calib --nodes {nodes}")).unwrap();
    wf.add_job(job("a", "isr", "isr --graph <FILE:runGraphFile>")).unwrap();
    wf.add_job_relationships(["a"], ["b"]).unwrap();

    let results = LintRegistry::new().run(&wf);
    assert_snapshot!(
        serde_json::to_string_pretty(&results).unwrap(),
        @r###"
    [
      {
        "code": "GWF-LINT-002",
        "severity": "error",
        "message": "job 'a' references file 'runGraphFile' that is neither an input nor an output",
        "location": "a",
        "suggestion": "attach the file to the job before building its command"
      },
      {
        "code": "GWF-LINT-003",
        "severity": "error",
        "message": "job 'b' has no value for placeholder {nodes}",
        "location": "b",
        "suggestion": "define 'nodes' in the configuration"
      }
    ]
    "###
    );

    let err = validate(&wf).unwrap_err();
    assert_eq!(err.code, codes::VALIDATION_FAILED);
    assert_eq!(err.context.get("rule").map(String::as_str), Some("GWF-LINT-002"));
    assert_eq!(err.context.get("location").map(String::as_str), Some("a"));
}

#[test]
fn unconditional_final_job_is_linted_too() {
    let mut wf = GenericWorkflow::new("wf");
    wf.add_job(job("a", "isr", "isr")).unwrap();
    wf.add_final(job("finalJob", "finalJob", "finalize {runGraphFile}"));

    let results = LintRegistry::new().run(&wf);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].code, "GWF-LINT-003");
    assert_eq!(results[0].location.as_deref(), Some("finalJob"));
}

#[test]
fn label_disagreement_only_warns() {
    let mut wf = GenericWorkflow::new("wf");
    let mut first = job("isr_1", "isr", "isr");
    first.queue = Some("short".to_string());
    let mut second = job("isr_2", "isr", "isr");
    second.queue = Some("long".to_string());
    wf.add_job(first).unwrap();
    wf.add_job(second).unwrap();

    let results = validate(&wf).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].severity, LintSeverity::Warning);
    assert_eq!(results[0].code, "GWF-LINT-004");
    assert!(results[0].message.contains("queue"), "{}", results[0].message);
}

#[test]
fn cycles_are_refused_when_edges_are_added() {
    let mut wf = GenericWorkflow::new("wf");
    wf.add_job(job("a", "isr", "isr")).unwrap();
    wf.add_job(job("b", "isr", "isr")).unwrap();
    wf.add_job_relationships(["a"], ["b"]).unwrap();

    assert!(wf.add_job_relationships(["b"], ["a"]).is_err());
    assert!(wf.is_acyclic());
    assert!(LintRegistry::new().run(&wf).is_empty());
}
