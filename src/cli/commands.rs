use crate::{
    cli::args::{ConfigArgs, ConfigOptions, SubmitArgs, TransformArgs},
    core::{
        codes,
        config::formatter::value_to_string,
        transform::transform as build_workflow,
        AppError, ConfigLoader, ConfigSources, InMemoryGraph, LoadedConfig, SearchRequest,
    },
    logging::config::LoggingConfig,
    Result,
};
use anyhow::Context;
use genflow_backend::{BackendRegistry, SubmitOptions};
use genflow_types::GenericWorkflow;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything transform produced for one run.
struct TransformedRun {
    loaded: LoadedConfig,
    workflow: GenericWorkflow,
    workflow_config: serde_json::Value,
    submit_path: PathBuf,
}

fn load_config(options: &ConfigOptions) -> Result<LoadedConfig> {
    let sources = ConfigSources {
        file: options.config.clone(),
        overrides: options.overrides.clone(),
        backend: options.backend.clone(),
        submit_path: options.submit_path.clone(),
    };
    let registry = BackendRegistry::with_builtins();
    Ok(ConfigLoader::load(&sources, &registry)?)
}

fn required_str(loaded: &LoadedConfig, key: &str) -> Result<String> {
    Ok(loaded
        .store
        .search_str(key, &SearchRequest::new().required(true))?
        .unwrap_or_default())
}

fn run_transform(options: &ConfigOptions, graph_path: &Path) -> Result<TransformedRun> {
    let loaded = load_config(options)?;
    let graph = InMemoryGraph::from_path(graph_path)?;

    let submit_path = PathBuf::from(required_str(&loaded, "submitPath")?);
    fs::create_dir_all(&submit_path)
        .with_context(|| format!("failed to create submit directory {}", submit_path.display()))?;

    let run_graph = PathBuf::from(required_str(&loaded, "runGraphFile")?);
    if let Some(parent) = run_graph.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(graph_path, &run_graph).with_context(|| {
        format!(
            "failed to copy {} to {}",
            graph_path.display(),
            run_graph.display()
        )
    })?;

    let (workflow, workflow_config) = build_workflow(&loaded.store, &graph, &submit_path)?;
    let workflow_config = workflow_config.to_value();

    let snapshot_path = submit_path.join(format!("{}.generic.json", workflow.name()));
    fs::write(&snapshot_path, serde_json::to_string_pretty(&workflow.snapshot())?)
        .with_context(|| format!("failed to write {}", snapshot_path.display()))?;
    let config_path = submit_path.join(format!("{}.config.yaml", workflow.name()));
    fs::write(&config_path, serde_yaml::to_string(&workflow_config)?)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    tracing::info!(
        workflow = workflow.name(),
        jobs = workflow.len(),
        submit_path = %submit_path.display(),
        "generic workflow written"
    );
    Ok(TransformedRun {
        loaded,
        workflow,
        workflow_config,
        submit_path,
    })
}

fn print_summary(run: &TransformedRun) {
    println!("Workflow: {}", run.workflow.name());
    println!("Jobs: {}", run.workflow.len());
    let final_job = run
        .workflow
        .get_final()
        .map(|job| job.name.as_str())
        .unwrap_or("none");
    println!("Unconditional final job: {}", final_job);
    println!("Submit path: {}", run.submit_path.display());
}

pub fn transform(args: TransformArgs) -> Result<()> {
    let run = run_transform(&args.config, &args.graph)?;
    print_summary(&run);
    Ok(())
}

pub fn submit(args: SubmitArgs) -> Result<()> {
    let mut run = run_transform(&args.config, &args.graph)?;
    print_summary(&run);
    let options = SubmitOptions {
        submit_path: run.submit_path.clone(),
        config: run.workflow_config.clone(),
    };
    let handle = run.loaded.backend.submit(&run.workflow, &options)?;
    let run_id = run.loaded.backend.get_id(&handle)?;
    tracing::info!(backend = %handle.backend, run_id = %run_id, "workflow submitted");
    println!("Backend: {}", handle.backend);
    println!("Run Id: {}", run_id);
    Ok(())
}

pub fn config(args: ConfigArgs) -> Result<()> {
    if args.env {
        for line in ConfigLoader::env_var_documentation()
            .iter()
            .chain(LoggingConfig::env_var_documentation())
        {
            println!("{}", line);
        }
        return Ok(());
    }

    let loaded = load_config(&args.config)?;
    match args.key {
        Some(key) => {
            let request = SearchRequest::new().replace_vars(true);
            let (found, value) = loaded.store.search(&key, &request)?;
            if !found {
                return Err(AppError::configuration(
                    codes::MISSING_REQUIRED,
                    format!("key '{}' not found in configuration", key),
                )
                .with_detail("key", key)
                .into());
            }
            println!("{}", value_to_string(&value));
        }
        None => print!("{}", serde_yaml::to_string(&loaded.store.to_value())?),
    }
    Ok(())
}
