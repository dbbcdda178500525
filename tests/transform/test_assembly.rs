use genflow::core::codes;
use genflow::core::config::{merge_values, ConfigStore};
use genflow::core::graph::{ArtifactRef, InMemoryGraph, WorkNode};
use genflow::core::transform::transform;
use genflow::core::ErrorCategory;
use genflow_types::{GenericWorkflow, GenericWorkflowJob};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

fn unit(id: &str, label: &str) -> WorkNode {
    WorkNode::new(id, label).with_data_id("D1", 1).with_data_id("D2", 2)
}

/// T1 -> T2 -> T3 -> T4, one unit each, chained through artifacts a..d.
fn chain_graph() -> InMemoryGraph {
    InMemoryGraph::new(
        "g1",
        vec![
            unit("1", "T1").writes(ArtifactRef::new("a")),
            unit("2", "T2").reads(ArtifactRef::new("a")).writes(ArtifactRef::new("b")),
            unit("3", "T3").reads(ArtifactRef::new("b")).writes(ArtifactRef::new("c")),
            unit("4", "T4").reads(ArtifactRef::new("c")).writes(ArtifactRef::new("d")),
        ],
    )
    .unwrap()
}

/// One producer feeding two consumers, giving two sinks.
fn fan_out_graph() -> InMemoryGraph {
    InMemoryGraph::new(
        "g2",
        vec![
            WorkNode::new("1", "make").writes(ArtifactRef::new("x")),
            WorkNode::new("2", "left").reads(ArtifactRef::new("x")),
            WorkNode::new("3", "right").reads(ArtifactRef::new("x")),
        ],
    )
    .unwrap()
}

fn config(prefix: &Path, overrides: Value) -> ConfigStore {
    let mut root = json!({
        "uniqProcName": "run1",
        "project": "dev",
        "campaign": "quick",
        "operator": "tester",
        "payloadName": "demo",
        "runGraphFile": prefix.join("run1.graph.json").display().to_string(),
        "repoConfig": "/repo/butler.yaml",
        "whenSaveJobGraph": "TRANSFORM",
        "runInit": false,
        "runUnitCommand": "runner --graph {graphFile}",
        "auxState": {"whenCreate": "NEVER"},
        "finalJob": {
            "whenRun": "ALWAYS",
            "command1": "finalize --graph {runGraphFile} --repo {repoConfig}",
        },
    });
    merge_values(&mut root, overrides);
    ConfigStore::with_default_order(root)
        .unwrap()
        .with_env(HashMap::new())
}

/// Root-level site and per-cluster site and cloud, each with its own runner.
fn site_cloud_overrides() -> Value {
    json!({
        "computeSite": "global",
        "clusterTemplate": "{D1}_{D2}",
        "cluster": {
            "cl1": {
                "tasks": "T1, T2",
                "dimensions": "D1, D2",
                "computeSite": "notthere",
                "computeCloud": "cloud2",
            },
            "cl2": {
                "tasks": "T3, T4",
                "dimensions": "D1, D2",
                "computeSite": "site1",
            },
        },
        "site": {
            "site1": {"runUnitCommand": "s1exe --graph {graphFile}"},
            "site2": {"runUnitCommand": "s2exe --graph {graphFile}"},
            "global": {"runUnitCommand": "s3exe --graph {graphFile}"},
        },
        "cloud": {
            "cloud1": {"runUnitCommand": "c1exe --graph {graphFile}"},
            "cloud2": {"runUnitCommand": "c2exe --graph {graphFile}"},
        },
        "finalJob": {
            "computeSite": "special_site",
            "computeCloud": "special_cloud",
        },
    })
}

fn exe(job: &GenericWorkflowJob) -> &str {
    job.executable
        .as_ref()
        .map(|exe| exe.src_uri.as_str())
        .unwrap_or_default()
}

fn assert_file_edges(wf: &GenericWorkflow) {
    for (parent, child) in wf.edges() {
        let outputs: Vec<&str> = wf.get_job_outputs(&parent).iter().map(|f| f.name()).collect();
        let shared = wf
            .get_job_inputs(&child)
            .iter()
            .any(|f| outputs.contains(&f.name()));
        assert!(shared, "edge {} -> {} carries no file", parent, child);
    }
}

#[test]
fn cluster_site_and_cloud_pick_the_runner() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path(), site_cloud_overrides());
    let (wf, _) = transform(&cfg, &chain_graph(), tmp.path()).unwrap();

    let names: Vec<&str> = wf.job_names().collect();
    assert_eq!(names, vec!["cl1_1_2", "cl2_1_2"]);

    let cl1 = wf.get_job("cl1_1_2").unwrap();
    assert_eq!(cl1.compute_site.as_deref(), Some("notthere"));
    assert_eq!(cl1.compute_cloud.as_deref(), Some("cloud2"));
    assert_eq!(exe(cl1), "c2exe");
    assert_eq!(cl1.quanta_counts.get("T1"), Some(&1));
    assert_eq!(cl1.quanta_counts.get("T2"), Some(&1));

    let cl2 = wf.get_job("cl2_1_2").unwrap();
    assert_eq!(cl2.compute_site.as_deref(), Some("site1"));
    assert_eq!(cl2.compute_cloud, None);
    assert_eq!(exe(cl2), "s1exe");

    let final_job = wf.get_final().unwrap();
    assert_eq!(final_job.compute_site.as_deref(), Some("special_site"));
    assert_eq!(final_job.compute_cloud.as_deref(), Some("special_cloud"));
}

#[test]
fn site_wins_over_cloud_without_cluster_overrides() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(
        tmp.path(),
        json!({
            "computeSite": "site2",
            "computeCloud": "cloud1",
            "site": {"site2": {"runUnitCommand": "s2exe --graph {graphFile}"}},
            "cloud": {"cloud1": {"runUnitCommand": "c1exe --graph {graphFile}"}},
        }),
    );
    let (wf, _) = transform(&cfg, &chain_graph(), tmp.path()).unwrap();

    assert_eq!(wf.len(), 4);
    for job in wf.jobs() {
        assert_eq!(exe(job), "s2exe", "job {}", job.name);
    }
    assert_eq!(wf.get_final().unwrap().compute_site.as_deref(), Some("site2"));
}

#[test]
fn clustered_jobs_follow_artifacts_and_get_graph_slices() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path(), site_cloud_overrides());
    let (wf, _) = transform(&cfg, &chain_graph(), tmp.path()).unwrap();

    insta::assert_debug_snapshot!(wf.edges(), @r###"
    [
        (
            "cl1_1_2",
            "cl2_1_2",
        ),
    ]
    "###);
    assert!(wf.is_acyclic());
    assert_file_edges(&wf);

    let cl1 = wf.get_job("cl1_1_2").unwrap();
    assert_eq!(cl1.cmdvals.get("graphId"), Some(&json!("g1")));
    assert_eq!(cl1.cmdvals.get("graphNodeId"), Some(&json!("1,2")));
    assert_eq!(
        cl1.arguments.as_deref(),
        Some("--graph <FILE:graphFile_cl1_1_2>")
    );

    let slice = tmp.path().join("jobs").join("cl1").join("cl1_1_2.graph");
    assert!(slice.exists(), "missing {}", slice.display());
    let slice_file = wf.get_file("graphFile_cl1_1_2").unwrap();
    assert_eq!(slice_file.src_uri(), slice.display().to_string());
}

#[test]
fn saved_graph_never_points_jobs_at_the_run_graph() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path(), json!({"whenSaveJobGraph": "NEVER"}));
    let (wf, _) = transform(&cfg, &chain_graph(), tmp.path()).unwrap();

    assert!(!tmp.path().join("jobs").exists());
    for job in wf.jobs() {
        assert_eq!(job.arguments.as_deref(), Some("--graph <FILE:runGraphFile>"));
    }
}

#[test]
fn always_final_job_stays_outside_the_graph() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path(), json!({}));
    let (wf, _) = transform(&cfg, &fan_out_graph(), tmp.path()).unwrap();

    let final_job = wf.get_final().unwrap();
    assert_eq!(final_job.name, "finalJob");
    assert!(wf.get_job("finalJob").is_none());
    assert_eq!(wf.len(), 3);
    assert_eq!(wf.sinks(), vec!["left_2".to_string(), "right_3".to_string()]);
    assert_eq!(
        final_job.arguments.as_deref(),
        Some("<FILE:runGraphFile> /repo/butler.yaml")
    );
    assert!(tmp.path().join("final_job.bash").exists());
}

#[test]
fn success_final_job_waits_for_every_sink() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path(), json!({"finalJob": {"whenRun": "SUCCESS"}}));
    let (wf, _) = transform(&cfg, &fan_out_graph(), tmp.path()).unwrap();

    assert!(wf.get_final().is_none());
    assert_eq!(wf.sinks(), vec!["finalJob".to_string()]);
    let mut parents = wf.predecessors("finalJob");
    parents.sort();
    assert_eq!(parents, vec!["left_2", "right_3"]);
    assert!(wf.is_acyclic());
}

#[test]
fn merge_job_reads_the_auxiliary_state() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(
        tmp.path(),
        json!({
            "auxStateDir": "aux",
            "finalJob": {"whenRun": "NEVER"},
            "auxState": {
                "whenCreate": "ALWAYS",
                "whenMerge": "SUCCESS",
                "command1": "merge-state --repo {repoConfig} --aux {auxStateDir}",
            },
        }),
    );
    let (wf, _) = transform(&cfg, &fan_out_graph(), tmp.path()).unwrap();

    let repo = wf.get_file("repoConfig").unwrap();
    assert_eq!(repo.src_uri(), tmp.path().join("aux").display().to_string());
    assert!(repo.wms_transfer());
    assert!(!repo.job_shared());

    let merge = wf.get_job("auxState").unwrap();
    assert_eq!(merge.arguments.as_deref(), Some("/repo/butler.yaml <FILE:repoConfig>"));
    assert_eq!(wf.sinks(), vec!["auxState".to_string()]);
    assert!(tmp.path().join("merge_job.bash").exists());
}

#[test]
fn init_jobs_run_first_in_pipeline_order() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(
        tmp.path(),
        json!({
            "runInit": true,
            "task": {"init": {"runUnitCommand": "initexe --graph {graphFile}"}},
        }),
    );
    let graph = InMemoryGraph::new(
        "g3",
        vec![
            WorkNode::new("1", "T1").writes(ArtifactRef::new("a")),
            WorkNode::new("2", "T2").reads(ArtifactRef::new("a")),
        ],
    )
    .unwrap();
    let (wf, _) = transform(&cfg, &graph, tmp.path()).unwrap();

    assert_eq!(wf.sources(), vec!["init_T1".to_string()]);
    assert_eq!(
        wf.edges(),
        vec![
            ("T1_1".to_string(), "T2_2".to_string()),
            ("init_T1".to_string(), "init_T2".to_string()),
            ("init_T2".to_string(), "T1_1".to_string()),
        ]
    );
    let init = wf.get_job("init_T1").unwrap();
    assert_eq!(init.label, "init");
    assert_eq!(exe(init), "initexe");
    assert_eq!(init.arguments.as_deref(), Some("--graph <FILE:runGraphFile>"));
    assert!(wf
        .get_job_inputs("init_T2")
        .iter()
        .any(|f| f.name() == "T1_init"));
}

#[test]
fn task_labelled_init_keeps_its_own_values() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(
        tmp.path(),
        json!({
            "runInit": true,
            "cluster": {
                "grp": {"tasks": "init", "dimensions": "D1, D2", "computeSite": "site1"},
            },
            "site": {"site1": {"runUnitCommand": "s1exe --graph {graphFile}"}},
        }),
    );
    let graph = InMemoryGraph::new(
        "g4",
        vec![
            unit("1", "init").writes(ArtifactRef::new("a")),
            unit("2", "T2").reads(ArtifactRef::new("a")),
        ],
    )
    .unwrap();
    let (wf, _) = transform(&cfg, &graph, tmp.path()).unwrap();

    let clustered = wf.jobs().find(|job| job.label == "grp").unwrap();
    assert_eq!(clustered.compute_site.as_deref(), Some("site1"));
    assert_eq!(exe(clustered), "s1exe");

    let init = wf.get_job("init_init").unwrap();
    assert_eq!(init.label, "init");
    assert_eq!(init.compute_site, None);
    assert_eq!(exe(init), "runner");
    assert_eq!(exe(wf.get_job("init_T2").unwrap()), "runner");
}

#[test]
fn run_attributes_describe_the_run() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path(), json!({"computeSite": "site9"}));
    let (wf, workflow_config) = transform(&cfg, &fan_out_graph(), tmp.path()).unwrap();

    let attrs = wf.run_attrs();
    assert_eq!(attrs.get("wf_isjob").map(String::as_str), Some("True"));
    assert_eq!(attrs.get("wf_run").map(String::as_str), Some("run1"));
    assert_eq!(attrs.get("wf_project").map(String::as_str), Some("dev"));
    assert_eq!(attrs.get("wf_campaign").map(String::as_str), Some("quick"));
    assert_eq!(attrs.get("wf_operator").map(String::as_str), Some("tester"));
    assert_eq!(attrs.get("wf_payload").map(String::as_str), Some("demo"));
    assert_eq!(attrs.get("wf_runsite").map(String::as_str), Some("site9"));

    assert_eq!(wf.name(), "run1");
    assert_eq!(workflow_config.get("workflowName"), Some(&json!("run1")));
    assert_eq!(
        workflow_config.get("workflowPath"),
        Some(&json!(tmp.path().display().to_string()))
    );
}

#[test]
fn empty_graph_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(tmp.path(), json!({}));
    let graph = InMemoryGraph::new("empty", Vec::new()).unwrap();
    let err = transform(&cfg, &graph, tmp.path()).unwrap_err();
    assert_eq!(err.code, codes::EMPTY_GRAPH);
    assert_eq!(err.category, ErrorCategory::AssemblyError);
    assert_eq!(err.context.get("graph").map(String::as_str), Some("empty"));
}

#[test]
fn missing_final_policy_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let mut cfg_value = config(tmp.path(), json!({})).to_value();
    if let Some(root) = cfg_value.as_object_mut() {
        root.remove("finalJob");
        root.remove("auxState");
    }
    let cfg = ConfigStore::with_default_order(cfg_value).unwrap();
    let err = transform(&cfg, &fan_out_graph(), tmp.path()).unwrap_err();
    assert_eq!(err.code, codes::NO_FINAL_JOB);
}

#[test]
fn task_listed_in_two_clusters_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(
        tmp.path(),
        json!({
            "cluster": {
                "a": {"tasks": "T1, T2"},
                "b": {"tasks": "T2, T3"},
            },
        }),
    );
    let err = transform(&cfg, &chain_graph(), tmp.path()).unwrap_err();
    assert_eq!(err.code, codes::INVALID_SOURCE);
    assert_eq!(err.context.get("task").map(String::as_str), Some("T2"));
}
