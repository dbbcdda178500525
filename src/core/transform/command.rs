#![allow(clippy::result_large_err)]

//! Two-phase command line construction.
//!
//! Phase A ([`enhance_command`]) runs while the workflow is assembled: file
//! references become `<FILE:name>` markers and every other `{name}` is
//! resolved once and recorded in the job's `cmdvals`. Phase B
//! ([`fill_arguments`]) turns markers and values into the final string. It
//! runs immediately for labels with `useLazyCommands: false` and is left to
//! the backend otherwise.

use super::cache::ResolutionCache;
use super::{INIT_LABEL, RUN_GRAPH_FILE};
use crate::core::config::formatter::{self, file_marker, Segment};
use crate::core::config::ConfigStore;
use crate::core::error::{codes, AppError};
use crate::core::types::WhenSave;
use genflow_types::{GenericWorkflow, GenericWorkflowJob};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;

/// Name of the per-job graph slice file for `job_name`.
pub fn graph_file_key(job_name: &str) -> String {
    format!("graphFile_{}", job_name)
}

/// Phase A: rewrite file references and collect substitution values.
pub fn enhance_command(
    config: &ConfigStore,
    workflow: &GenericWorkflow,
    job: &mut GenericWorkflowJob,
    cache: &mut ResolutionCache,
) -> Result<(), AppError> {
    let Some(mut arguments) = job.arguments.clone() else {
        return Ok(());
    };
    let settings = cache.label_settings(config, &job.label)?;

    let graph_key = if settings.when_save == WhenSave::Never || job.label == INIT_LABEL {
        RUN_GRAPH_FILE.to_string()
    } else {
        graph_file_key(&job.name)
    };
    arguments = arguments.replace("{graphFile}", &format!("{{{}}}", graph_key));

    for file in workflow
        .get_job_inputs(&job.name)
        .into_iter()
        .chain(workflow.get_job_outputs(&job.name))
    {
        arguments = arguments.replace(
            &format!("{{{}}}", file.name()),
            &format!("<FILE:{}>", file.name()),
        );
    }

    let names: Vec<String> = formatter::parse_template(&arguments)
        .map_err(|e| {
            AppError::configuration(
                codes::MALFORMED_TEMPLATE,
                format!("malformed command line for job '{}': {}", job.name, e),
            )
            .with_detail("job", job.name.clone())
        })?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Field { name, .. } => Some(name.to_string()),
            Segment::Literal(_) => None,
        })
        .collect();

    for name in names {
        if job.cmdvals.contains_key(&name) {
            continue;
        }
        match cache.value(config, &job.label, &name)? {
            Some(value) => {
                job.cmdvals.insert(name, value);
            }
            None => {
                return Err(unresolved(&format!("{{{}}}", name), &job.name));
            }
        }
    }
    tracing::debug!(job = %job.name, arguments = %arguments, "command line enhanced");

    if !settings.use_lazy_commands {
        arguments = fill_arguments(
            settings.use_shared,
            workflow,
            &arguments,
            &job.cmdvals,
            config.env(),
        )
        .map_err(|e| e.with_detail("job", job.name.clone()))?;
    }
    job.arguments = Some(arguments);
    Ok(())
}

/// Phase B: substitute file markers, deferred environment references and
/// `cmdvals` into `arguments`.
///
/// File markers become the source location when the backend does not
/// transfer the file, or when the file is shared and `use_shared` is set;
/// otherwise only the base name is used.
pub fn fill_arguments(
    use_shared: bool,
    workflow: &GenericWorkflow,
    arguments: &str,
    cmdvals: &IndexMap<String, Value>,
    env: &HashMap<String, String>,
) -> Result<String, AppError> {
    let mut missing_file = None;
    let with_files = file_marker().replace_all(arguments, |caps: &regex::Captures<'_>| {
        let Some(file) = workflow.get_file(&caps[1]) else {
            missing_file.get_or_insert_with(|| caps[0].to_string());
            return caps[0].to_string();
        };
        if !file.wms_transfer() || (use_shared && file.job_shared()) {
            file.src_uri().to_string()
        } else {
            file.basename().to_string()
        }
    });
    if let Some(token) = missing_file {
        return Err(unresolved(&token, ""));
    }

    let submit_side = |text: &str| formatter::expand_env(&formatter::restore_deferred_env(text), env);
    let expanded = submit_side(&with_files);

    let segments = formatter::parse_template(&expanded).map_err(|e| {
        AppError::configuration(
            codes::MALFORMED_TEMPLATE,
            format!("malformed command line: {}", e),
        )
        .with_detail("template", arguments)
    })?;
    let mut out = String::with_capacity(expanded.len());
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Field { name, spec, raw } => {
                let Some(value) = cmdvals.get(name) else {
                    return Err(unresolved(raw, ""));
                };
                let value = match value {
                    Value::String(text) => {
                        let text = submit_side(text);
                        if let Some(token) = leftover_field(&text) {
                            return Err(unresolved(&token, "").with_detail("value_of", name));
                        }
                        Value::String(text)
                    }
                    other => other.clone(),
                };
                let rendered = formatter::format_value(&value, spec).map_err(|e| {
                    AppError::configuration(
                        codes::MALFORMED_TEMPLATE,
                        format!("cannot format {}: {}", raw, e),
                    )
                    .with_detail("token", raw)
                })?;
                out.push_str(&rendered);
            }
        }
    }

    if let Some(token) = leftover_marker(&out) {
        return Err(unresolved(&token, ""));
    }
    Ok(out)
}

fn leftover_marker(text: &str) -> Option<String> {
    if let Some(m) = file_marker().find(text) {
        return Some(m.as_str().to_string());
    }
    formatter::deferred_env_names(text)
        .into_iter()
        .next()
        .map(|name| format!("<ENV:{}>", name))
}

/// First `{field}` still present in a substituted value.
fn leftover_field(text: &str) -> Option<String> {
    formatter::parse_template(text)
        .ok()?
        .into_iter()
        .find_map(|segment| match segment {
            Segment::Field { raw, .. } => Some(raw.to_string()),
            Segment::Literal(_) => None,
        })
}

fn unresolved(token: &str, job: &str) -> AppError {
    let mut error = AppError::assembly(
        codes::UNRESOLVED_PLACEHOLDER,
        format!("unresolved placeholder {}", token),
    )
    .with_detail("token", token);
    if !job.is_empty() {
        error = error.with_detail("job", job);
    }
    error
}
