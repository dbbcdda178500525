use genflow::core::codes;
use genflow::core::config::{ConfigLoader, ConfigSources, SearchRequest};
use genflow_backend::BackendRegistry;
use regex::Regex;
use serde_json::json;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn clear_genflow_env() {
    for v in &[
        "GENFLOW_BACKEND",
        "GENFLOW_SUBMIT_PATH",
        "GENFLOW_COMPUTE_SITE",
    ] {
        env::remove_var(v);
    }
}

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("run.yaml");
    fs::write(&path, body).unwrap();
    path
}

fn resolved(store: &genflow::core::ConfigStore, key: &str) -> String {
    store
        .search_str(key, &SearchRequest::new().required(true))
        .unwrap()
        .unwrap()
}

#[test]
#[serial]
fn layers_merge_in_order() {
    clear_genflow_env();
    let dir = TempDir::new().unwrap();
    let file = write_config(
        &dir,
        r#"
payloadName: fromfile
requestMemory: 4096
dryrun:
  pretty: false
site:
  s1:
    requestCpus: 8
"#,
    );
    let sources = ConfigSources {
        file: Some(file),
        overrides: vec!["requestMemory=8192".into(), ".site.s1.queue=long".into()],
        submit_path: Some(dir.path().join("submit")),
        ..ConfigSources::default()
    };
    let loaded = ConfigLoader::load(&sources, &BackendRegistry::with_builtins()).unwrap();
    let store = &loaded.store;

    // defaults survive where nothing overrides them
    assert_eq!(store.get("campaign"), Some(&json!("quick")));
    // backend defaults sit beneath the user file
    assert_eq!(store.get("backendName"), Some(&json!("dryrun")));
    assert_eq!(store.get(".dryrun.pretty"), Some(&json!(false)));
    // file beats defaults, overrides beat the file
    assert_eq!(store.get("payloadName"), Some(&json!("fromfile")));
    assert_eq!(
        store.search("requestMemory", &SearchRequest::new()).unwrap().1,
        json!(8192)
    );
    assert_eq!(store.get(".site.s1.requestCpus"), Some(&json!(8)));
    assert_eq!(store.get(".site.s1.queue"), Some(&json!("long")));
}

#[test]
#[serial]
fn computed_keys_are_filled() {
    clear_genflow_env();
    env::set_var("USER", "alice");
    let dir = TempDir::new().unwrap();
    let sources = ConfigSources {
        overrides: vec!["payloadName=cal".into()],
        submit_path: Some(dir.path().join("submit")),
        ..ConfigSources::default()
    };
    let loaded = ConfigLoader::load(&sources, &BackendRegistry::with_builtins()).unwrap();
    let store = &loaded.store;

    let stamp = resolved(store, "timestamp");
    assert!(Regex::new(r"^\d{8}T\d{6}Z$").unwrap().is_match(&stamp), "{}", stamp);

    let uniq = resolved(store, "uniqProcName");
    assert_eq!(uniq, format!("u_alice_cal_{}", stamp));

    let submit = resolved(store, "submitPath");
    assert_eq!(Path::new(&submit), dir.path().join("submit"));
    assert_eq!(
        resolved(store, "runGraphFile"),
        dir.path()
            .join("submit")
            .join(format!("{}.graph.json", uniq))
            .display()
            .to_string()
    );
    assert_eq!(
        resolved(store, "auxStateDir"),
        dir.path().join("submit").join("aux_state").display().to_string()
    );
}

#[test]
#[serial]
fn environment_overrides_file_but_not_command_line() {
    clear_genflow_env();
    let dir = TempDir::new().unwrap();
    let file = write_config(&dir, "computeSite: fromfile\nsubmitPath: /from/file\n");
    let env_submit = dir.path().join("env_submit");
    env::set_var("GENFLOW_SUBMIT_PATH", &env_submit);
    env::set_var("GENFLOW_COMPUTE_SITE", "fromenv");

    let sources = ConfigSources {
        file: Some(file.clone()),
        ..ConfigSources::default()
    };
    let loaded = ConfigLoader::load(&sources, &BackendRegistry::with_builtins()).unwrap();
    assert_eq!(resolved(&loaded.store, "computeSite"), "fromenv");
    assert_eq!(
        resolved(&loaded.store, "submitPath"),
        env_submit.display().to_string()
    );

    let cli_submit = dir.path().join("cli_submit");
    let sources = ConfigSources {
        file: Some(file),
        overrides: vec!["computeSite=fromcli".into()],
        submit_path: Some(cli_submit.clone()),
        ..ConfigSources::default()
    };
    let loaded = ConfigLoader::load(&sources, &BackendRegistry::with_builtins()).unwrap();
    assert_eq!(resolved(&loaded.store, "computeSite"), "fromcli");
    assert_eq!(
        resolved(&loaded.store, "submitPath"),
        cli_submit.display().to_string()
    );
    clear_genflow_env();
}

#[test]
#[serial]
fn backend_selection_precedence() {
    clear_genflow_env();
    let dir = TempDir::new().unwrap();
    let file = write_config(&dir, "backend: fromfile\n");
    let registry = BackendRegistry::with_builtins();

    env::set_var("GENFLOW_BACKEND", "fromenv");
    let err = ConfigLoader::load(&ConfigSources::default(), &registry).unwrap_err();
    assert_eq!(err.code, codes::BACKEND_FAILURE);
    assert!(err.message.contains("fromenv"));

    let sources = ConfigSources {
        file: Some(file.clone()),
        ..ConfigSources::default()
    };
    let err = ConfigLoader::load(&sources, &registry).unwrap_err();
    assert!(err.message.contains("fromfile"));

    let sources = ConfigSources {
        file: Some(file),
        backend: Some("dryrun".into()),
        submit_path: Some(dir.path().join("submit")),
        ..ConfigSources::default()
    };
    let loaded = ConfigLoader::load(&sources, &registry).unwrap();
    assert_eq!(loaded.backend.name(), "dryrun");
    assert_eq!(loaded.store.get("backend"), Some(&json!("dryrun")));
    clear_genflow_env();
}

#[test]
#[serial]
fn unreadable_sources_name_the_path() {
    clear_genflow_env();
    let dir = TempDir::new().unwrap();
    let registry = BackendRegistry::with_builtins();

    let missing = dir.path().join("missing.yaml");
    let sources = ConfigSources {
        file: Some(missing.clone()),
        ..ConfigSources::default()
    };
    let err = ConfigLoader::load(&sources, &registry).unwrap_err();
    assert_eq!(err.code, codes::INVALID_SOURCE);
    assert_eq!(
        err.context.get("path"),
        Some(&missing.display().to_string())
    );

    let list = write_config(&dir, "- just\n- a list\n");
    let sources = ConfigSources {
        file: Some(list),
        ..ConfigSources::default()
    };
    assert_eq!(
        ConfigLoader::load(&sources, &registry).unwrap_err().code,
        codes::INVALID_SOURCE
    );
}
