#![allow(clippy::result_large_err)]

//! Computation graph to generic workflow.

pub mod aggregate;
pub mod cache;
pub mod command;
pub mod final_job;
pub mod init;
pub mod job_values;

pub use aggregate::fold_job_values;
pub use cache::{LabelSettings, ResolutionCache};
pub use command::{enhance_command, fill_arguments};
pub use job_values::{get_job_values, JobValues, DEFAULT_MEM_RETRIES};

use crate::core::config::{ConfigStore, SearchRequest};
use crate::core::error::{codes, AppError};
use crate::core::graph::{cluster_units, ArtifactRef, Cluster, ComputationGraph};
use crate::core::lint::LintRegistry;
use crate::core::types::{WhenRun, WhenSave};
use cache::search_bool;
use genflow_types::{GenericWorkflow, GenericWorkflowFile, GenericWorkflowJob};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

/// File name of the whole-run computation graph.
pub const RUN_GRAPH_FILE: &str = "runGraphFile";
/// File name of the data repository configuration jobs read.
pub const REPO_CONFIG_FILE: &str = "repoConfig";
/// Label shared by all init jobs.
pub const INIT_LABEL: &str = "init";
/// Key of the command line template for unit jobs.
pub const UNIT_COMMAND_KEY: &str = "runUnitCommand";

/// Build the generic workflow for `graph` plus the configuration that goes
/// with it.
pub fn transform(
    config: &ConfigStore,
    graph: &dyn ComputationGraph,
    prefix: &Path,
) -> Result<(GenericWorkflow, ConfigStore), AppError> {
    let name = config
        .search_str("uniqProcName", &SearchRequest::new().required(true))?
        .unwrap_or_default();
    tracing::info!(workflow = %name, units = graph.len(), "transform started");
    let workflow = create_generic_workflow(config, graph, &name, prefix)?;
    let workflow_config = create_generic_workflow_config(config, prefix)?;
    tracing::info!(workflow = %name, jobs = workflow.len(), "transform finished");
    Ok((workflow, workflow_config))
}

/// Copy of `config` carrying `workflowName` and `workflowPath`.
pub fn create_generic_workflow_config(config: &ConfigStore, prefix: &Path) -> Result<ConfigStore, AppError> {
    let name = config
        .search_str("uniqProcName", &SearchRequest::new().required(true))?
        .unwrap_or_default();
    Ok(config.snapshot_with(&[
        ("workflowName", Value::String(name)),
        ("workflowPath", Value::String(prefix.display().to_string())),
    ]))
}

pub fn create_generic_workflow(
    config: &ConfigStore,
    graph: &dyn ComputationGraph,
    name: &str,
    prefix: &Path,
) -> Result<GenericWorkflow, AppError> {
    if graph.is_empty() {
        return Err(AppError::assembly(
            codes::EMPTY_GRAPH,
            format!("computation graph '{}' has no execution units", graph.graph_id()),
        )
        .with_detail("graph", graph.graph_id()));
    }

    let required = SearchRequest::new().required(true);
    let run_graph_file = GenericWorkflowFile::new(
        RUN_GRAPH_FILE,
        config.search_str(RUN_GRAPH_FILE, &required)?.unwrap_or_default(),
        false,
        true,
        true,
    );
    let repo_file = repo_config_file(config, prefix)?;

    let mut workflow = GenericWorkflow::new(name);
    workflow.add_file(run_graph_file.clone());
    workflow.add_file(repo_file.clone());

    let mut cache = ResolutionCache::new();
    let clustered = cluster_units(config, graph)?;
    for cluster in clustered.clusters() {
        let job = create_job_from_cluster(
            config,
            graph,
            cluster,
            &mut workflow,
            &run_graph_file,
            &repo_file,
            prefix,
            &mut cache,
        )?;
        workflow.add_job(job)?;
    }
    for (parent, child) in clustered.edges() {
        workflow.add_job_relationships([parent], [child])?;
    }

    if search_bool(config, "runInit", &SearchRequest::new(), true)? {
        init::add_workflow_init_nodes(
            config,
            graph,
            &mut workflow,
            &run_graph_file,
            &repo_file,
            prefix,
            &mut cache,
        )?;
    }

    add_run_attrs(config, &mut workflow)?;
    final_job::add_final_job(config, &mut workflow, prefix, &mut cache)?;

    let report = LintRegistry::new().run(&workflow);
    LintRegistry::ensure_clean(&report)?;
    Ok(workflow)
}

/// The repository configuration file jobs read. When auxiliary state is
/// created it points at the state directory and the backend stages it.
fn repo_config_file(config: &ConfigStore, prefix: &Path) -> Result<GenericWorkflowFile, AppError> {
    let when_create = match config.search_str(".auxState.whenCreate", &SearchRequest::new())? {
        Some(text) => text.parse::<WhenRun>().map_err(|reason| {
            AppError::configuration(codes::INVALID_ENUM, format!("auxState.whenCreate: {}", reason))
                .with_detail("key", ".auxState.whenCreate")
        })?,
        None => WhenRun::Never,
    };
    if when_create == WhenRun::Never {
        let src = config
            .search_str(REPO_CONFIG_FILE, &SearchRequest::new().required(true))?
            .unwrap_or_default();
        return Ok(GenericWorkflowFile::new(REPO_CONFIG_FILE, src, false, true, true));
    }
    let aux_dir = config
        .search_str("auxStateDir", &SearchRequest::new().required(true))?
        .unwrap_or_default();
    let src = if Path::new(&aux_dir).is_absolute() {
        aux_dir
    } else {
        prefix.join(aux_dir).display().to_string()
    };
    Ok(GenericWorkflowFile::new(REPO_CONFIG_FILE, src, true, false, false))
}

#[allow(clippy::too_many_arguments)]
fn create_job_from_cluster(
    config: &ConfigStore,
    graph: &dyn ComputationGraph,
    cluster: &Cluster,
    workflow: &mut GenericWorkflow,
    run_graph_file: &GenericWorkflowFile,
    repo_file: &GenericWorkflowFile,
    prefix: &Path,
    cache: &mut ResolutionCache,
) -> Result<GenericWorkflowJob, AppError> {
    let mut job = GenericWorkflowJob::new(cluster.name.clone(), cluster.label.clone());
    job.tags = cluster.tags.clone();

    let mut request = SearchRequest::new()
        .with_curval("curr_cluster", cluster.label.as_str())
        .replace_vars(false)
        .expand_env_vars(false)
        .replace_env_vars(true);
    for (key, curval) in [("computeSite", "curr_site"), ("computeCloud", "curr_cloud")] {
        let (found, value) = config.search(key, &request)?;
        if found && !value.is_null() {
            request = request.with_curval(curval, value);
        }
    }

    let mut outputs = Vec::new();
    let mut inputs = Vec::new();
    let mut produced = HashSet::new();
    let mut unit_ids = Vec::with_capacity(cluster.unit_ids.len());
    for id in &cluster.unit_ids {
        let unit = graph.unit(id).ok_or_else(|| {
            AppError::assembly(
                codes::GRAPH_STRUCTURE,
                format!("cluster '{}' refers to unknown unit '{}'", cluster.name, id),
            )
            .with_detail("job", cluster.name.clone())
        })?;
        *job.quanta_counts.entry(unit.label.clone()).or_insert(0) += 1;

        let values = cache.job_values(&unit.label, || {
            let unit_request = request.clone().with_curval("curr_task", unit.label.as_str());
            get_job_values(config, &unit_request, Some(UNIT_COMMAND_KEY))
        })?;
        fold_job_values(values, &mut job)
            .map_err(|e| e.with_detail("unit", unit.id.clone()))?;

        for artifact in &unit.outputs {
            produced.insert(artifact.address());
            outputs.push(artifact_file(artifact));
        }
        inputs.extend(unit.inputs.iter().cloned());
        unit_ids.push(unit.id.clone());
    }
    unit_ids.sort();

    job.cmdvals
        .insert("graphId".to_string(), Value::String(graph.graph_id().to_string()));
    job.cmdvals
        .insert("graphNodeId".to_string(), Value::String(unit_ids.join(",")));

    let settings = cache.label_settings(config, &job.label)?;
    let graph_file = if settings.when_save == WhenSave::Never {
        run_graph_file.clone()
    } else {
        let path = prefix
            .join("jobs")
            .join(&job.label)
            .join(format!("{}.graph", job.name));
        if settings.when_save == WhenSave::Transform {
            write_graph_slice(graph, &unit_ids, &path)?;
        }
        GenericWorkflowFile::new(
            command::graph_file_key(&job.name),
            path.display().to_string(),
            true,
            true,
            true,
        )
    };

    let external_inputs = inputs
        .iter()
        .filter(|artifact| !produced.contains(&artifact.address()))
        .map(artifact_file);
    let mut job_inputs = vec![graph_file, repo_file.clone()];
    job_inputs.extend(external_inputs);
    workflow.add_job_inputs(&job.name, job_inputs);
    workflow.add_job_outputs(&job.name, outputs);

    enhance_command(config, workflow, &mut job, cache)?;
    tracing::debug!(job = %job.name, units = unit_ids.len(), "cluster job created");
    Ok(job)
}

/// Artifacts become file nodes named by address, read in place.
fn artifact_file(artifact: &ArtifactRef) -> GenericWorkflowFile {
    let address = artifact.address();
    GenericWorkflowFile::new(address.clone(), address, false, true, true)
}

fn write_graph_slice(graph: &dyn ComputationGraph, unit_ids: &[String], path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = graph.subset(unit_ids)?;
    std::fs::write(path, bytes).map_err(|e| {
        AppError::from(e).with_detail("path", path.display().to_string())
    })?;
    Ok(())
}

fn add_run_attrs(config: &ConfigStore, workflow: &mut GenericWorkflow) -> Result<(), AppError> {
    let request = SearchRequest::new();
    workflow.add_run_attr("wf_isjob", "True");
    for (attr, key) in [
        ("wf_project", "project"),
        ("wf_campaign", "campaign"),
        ("wf_run", "uniqProcName"),
        ("wf_operator", "operator"),
        ("wf_payload", "payloadName"),
        ("wf_runsite", "computeSite"),
    ] {
        if let Some(value) = config.search_str(key, &request)? {
            workflow.add_run_attr(attr, value);
        }
    }
    Ok(())
}
