#![allow(clippy::result_large_err)]

use super::aggregate::fold_job_values;
use super::cache::{search_bool, ResolutionCache};
use super::command::enhance_command;
use super::job_values::get_job_values;
use super::{INIT_LABEL, UNIT_COMMAND_KEY};
use crate::core::config::{ConfigStore, SearchRequest};
use crate::core::error::AppError;
use crate::core::graph::ComputationGraph;
use genflow_types::{GenericWorkflow, GenericWorkflowFile, GenericWorkflowJob};
use serde_json::Value;
use std::path::Path;

/// Put the init jobs in front of every job currently in `workflow`.
pub fn add_workflow_init_nodes(
    config: &ConfigStore,
    graph: &dyn ComputationGraph,
    workflow: &mut GenericWorkflow,
    run_graph_file: &GenericWorkflowFile,
    repo_file: &GenericWorkflowFile,
    prefix: &Path,
    cache: &mut ResolutionCache,
) -> Result<(), AppError> {
    let init = create_init_workflow(config, graph, run_graph_file, repo_file, prefix, cache)?;
    tracing::debug!(jobs = ?init.job_names().collect::<Vec<_>>(), "init workflow created");
    workflow.add_workflow_source(init)?;
    Ok(())
}

/// One init job per task label, each reading a single representative unit.
///
/// With `chainInit` the jobs run in pipeline order: each one's marker file
/// is an input of the next.
pub fn create_init_workflow(
    config: &ConfigStore,
    graph: &dyn ComputationGraph,
    run_graph_file: &GenericWorkflowFile,
    repo_file: &GenericWorkflowFile,
    prefix: &Path,
    cache: &mut ResolutionCache,
) -> Result<GenericWorkflow, AppError> {
    let mut request = SearchRequest::new()
        .with_curval("curr_task", INIT_LABEL)
        .replace_vars(false)
        .expand_env_vars(false)
        .replace_env_vars(true);
    for (key, curval) in [("computeSite", "curr_site"), ("computeCloud", "curr_cloud")] {
        let (found, value) = config.search(key, &request)?;
        if found && !value.is_null() {
            request = request.with_curval(curval, value);
        }
    }
    let chain = search_bool(config, "chainInit", &request, true)?;

    let mut init = GenericWorkflow::new("init");
    init.add_file(run_graph_file.clone());
    init.add_file(repo_file.clone());

    let mut previous: Option<(String, GenericWorkflowFile)> = None;
    for label in graph.task_labels() {
        let Some(unit) = graph.representative_unit(&label) else {
            continue;
        };
        let name = format!("{}_{}", INIT_LABEL, label);
        let mut job = GenericWorkflowJob::new(name.clone(), INIT_LABEL);
        job.quanta_counts.insert(label.clone(), 1);

        let values =
            cache.init_job_values(|| get_job_values(config, &request, Some(UNIT_COMMAND_KEY)))?;
        fold_job_values(values, &mut job)?;
        job.cmdvals
            .insert("graphId".to_string(), Value::String(graph.graph_id().to_string()));
        job.cmdvals
            .insert("graphNodeId".to_string(), Value::String(unit.id.clone()));
        job.cmdvals
            .insert("taskLabel".to_string(), Value::String(label.clone()));

        let marker = GenericWorkflowFile::new(
            format!("{}_init", label),
            prefix.join("init").join(format!("{}.done", label)).display().to_string(),
            true,
            false,
            true,
        );
        let mut inputs = vec![run_graph_file.clone(), repo_file.clone()];
        if chain {
            if let Some((_, file)) = &previous {
                inputs.push(file.clone());
            }
        }
        init.add_job_inputs(&name, inputs);
        init.add_job_outputs(&name, [marker.clone()]);

        enhance_command(config, &init, &mut job, cache)?;
        init.add_job(job)?;
        if chain {
            if let Some((parent, _)) = &previous {
                init.add_job_relationships([parent.as_str()], [name.as_str()])?;
            }
        }
        previous = Some((name, marker));
    }
    Ok(init)
}
