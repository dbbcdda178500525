use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const GRAPH: &str = r#"{
  "graphId": "cli-graph",
  "units": [
    {"id": "1", "label": "isr", "outputs": [{"name": "postIsr", "dataId": {"visit": 1}}]},
    {"id": "2", "label": "calib", "inputs": [{"name": "postIsr", "dataId": {"visit": 1}}]}
  ]
}"#;

struct Run {
    dir: TempDir,
}

impl Run {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("run.yaml"),
            "uniqProcName: cli_run\noperator: ci\nrepoConfig: /repo/butler.yaml\n",
        )
        .unwrap();
        fs::write(dir.path().join("graph.json"), GRAPH).unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self) -> PathBuf {
        self.path().join("run.yaml")
    }

    fn submit_dir(&self) -> PathBuf {
        self.path().join("submit")
    }

    fn genflow(&self) -> Command {
        let mut cmd = Command::cargo_bin("genflow").unwrap();
        cmd.current_dir(self.path())
            .env("GENFLOW_LOG_DIR", self.path().join("logs"))
            .env_remove("GENFLOW_BACKEND")
            .env_remove("GENFLOW_SUBMIT_PATH")
            .env_remove("GENFLOW_COMPUTE_SITE")
            .env_remove("GENFLOW_LOG_CONSOLE")
            .env_remove("RUST_LOG");
        cmd
    }

    fn with_graph(&self, subcommand: &str) -> Command {
        let mut cmd = self.genflow();
        cmd.arg(subcommand)
            .arg("--config")
            .arg(self.config())
            .arg("--graph")
            .arg(self.path().join("graph.json"))
            .arg("--submit-path")
            .arg(self.submit_dir());
        cmd
    }
}

#[test]
fn help_lists_subcommands() {
    let run = Run::new();
    run.genflow()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("transform"))
        .stdout(predicate::str::contains("submit"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn config_key_resolves_through_overrides() {
    let run = Run::new();
    run.genflow()
        .args(["config", "--key", "payloadName", "--config"])
        .arg(run.config())
        .assert()
        .success()
        .stdout("demo\n");

    run.genflow()
        .args(["config", "--key", "payloadName", "--override", "payloadName=nightly", "--config"])
        .arg(run.config())
        .assert()
        .success()
        .stdout("nightly\n");
}

#[test]
fn config_unknown_key_fails() {
    let run = Run::new();
    run.genflow()
        .args(["config", "--key", "noSuchKey", "--config"])
        .arg(run.config())
        .assert()
        .failure()
        .stderr(predicate::str::contains("GWF-CFG-001"));
}

#[test]
fn config_env_documents_variables() {
    let run = Run::new();
    run.genflow()
        .args(["config", "--env"])
        .assert()
        .success()
        .stdout(predicate::str::contains("GENFLOW_BACKEND"))
        .stdout(predicate::str::contains("GENFLOW_LOG_DIR"));
}

#[test]
fn transform_writes_workflow_files() {
    let run = Run::new();
    run.with_graph("transform")
        .assert()
        .success()
        .stdout(predicate::str::contains("Workflow: cli_run"))
        .stdout(predicate::str::contains("Jobs: 4"))
        .stdout(predicate::str::contains("Unconditional final job: finalJob"));

    let submit = run.submit_dir();
    assert!(submit.join("cli_run.generic.json").exists());
    assert!(submit.join("cli_run.config.yaml").exists());
    assert!(submit.join("cli_run.graph.json").exists());
    assert!(submit.join("jobs").join("isr").join("isr_1.graph").exists());
    assert!(!submit.join("cli_run.workflow.json").exists());
    assert!(run.path().join("logs").join("genflow.log").exists());
}

#[test]
fn submit_prints_the_run_id() {
    let run = Run::new();
    run.with_graph("submit")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backend: dryrun"))
        .stdout(predicate::str::is_match(r"Run Id: [0-9a-f-]{36}").unwrap());

    assert!(run.submit_dir().join("cli_run.workflow.json").exists());
}

#[test]
fn missing_config_file_is_reported() {
    let run = Run::new();
    run.genflow()
        .args(["config", "--config"])
        .arg(run.path().join("absent.yaml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("GWF-CFG-005"))
        .stderr(predicate::str::contains("absent.yaml"));
}

#[test]
fn unknown_backend_fails_submit() {
    let run = Run::new();
    run.with_graph("submit")
        .args(["--backend", "condor"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GWF-BE-001"));
}
