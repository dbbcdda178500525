#![allow(clippy::result_large_err)]

use super::cache::ResolutionCache;
use super::command::enhance_command;
use super::job_values::get_job_values;
use super::{REPO_CONFIG_FILE, RUN_GRAPH_FILE};
use crate::core::config::formatter::file_marker;
use crate::core::config::{ConfigStore, SearchRequest};
use crate::core::error::{codes, AppError};
use crate::core::types::WhenRun;
use genflow_types::{GenericWorkflow, GenericWorkflowExec, GenericWorkflowJob, JobAttribute, MergeClass};
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const FINAL_JOB_SECTION: &str = "finalJob";
pub const AUX_STATE_SECTION: &str = "auxState";

type FinalJobHandler =
    fn(&ConfigStore, &mut GenericWorkflow, &Path, &mut ResolutionCache) -> Result<(), AppError>;

/// Checked top to bottom; the first key present and not `NEVER` picks the handler.
const FINAL_JOB_POLICIES: [(&str, FinalJobHandler); 2] = [
    (".finalJob.whenRun", add_explicit_final_job),
    (".auxState.whenCreate", add_merge_job),
];

type CommandBuilder = fn(&ConfigStore, &Path) -> Result<(GenericWorkflowExec, String), AppError>;

/// Attach the workflow's final job according to the first enabled policy.
pub fn add_final_job(
    config: &ConfigStore,
    workflow: &mut GenericWorkflow,
    prefix: &Path,
    cache: &mut ResolutionCache,
) -> Result<(), AppError> {
    for (key, handler) in FINAL_JOB_POLICIES {
        let enabled = config
            .get(key)
            .map(|value| !value.as_str().is_some_and(|s| s.eq_ignore_ascii_case("NEVER")))
            .unwrap_or(false);
        if enabled {
            tracing::debug!(policy = key, "final job policy selected");
            return handler(config, workflow, prefix, cache);
        }
    }
    Err(AppError::assembly(
        codes::NO_FINAL_JOB,
        "Final job specification not found: set finalJob.whenRun or auxState.whenCreate",
    )
    .with_detail("keys", ".finalJob.whenRun, .auxState.whenCreate"))
}

fn when_run(config: &ConfigStore, key: &str) -> Result<WhenRun, AppError> {
    let text = config
        .search_str(key, &SearchRequest::new().required(true))?
        .unwrap_or_default();
    text.parse().map_err(|reason: String| {
        AppError::configuration(codes::INVALID_ENUM, format!("{}: {}", key, reason))
            .with_detail("key", key)
            .with_detail("value", text.clone())
    })
}

fn add_explicit_final_job(
    config: &ConfigStore,
    workflow: &mut GenericWorkflow,
    prefix: &Path,
    cache: &mut ResolutionCache,
) -> Result<(), AppError> {
    let when = when_run(config, ".finalJob.whenRun")?;
    if when == WhenRun::Never {
        return Ok(());
    }
    let job = create_final_job(
        config,
        workflow,
        prefix,
        FINAL_JOB_SECTION,
        create_final_command,
        cache,
    )?;
    attach(workflow, job, when)
}

fn add_merge_job(
    config: &ConfigStore,
    workflow: &mut GenericWorkflow,
    prefix: &Path,
    cache: &mut ResolutionCache,
) -> Result<(), AppError> {
    let when_create = when_run(config, ".auxState.whenCreate")?;
    let when_merge = when_run(config, ".auxState.whenMerge")?;
    if when_create == WhenRun::Never || when_merge == WhenRun::Never {
        tracing::info!("auxiliary state is never merged; no final job added");
        return Ok(());
    }
    let job = create_final_job(
        config,
        workflow,
        prefix,
        AUX_STATE_SECTION,
        create_merge_command,
        cache,
    )?;
    attach(workflow, job, when_merge)
}

fn attach(workflow: &mut GenericWorkflow, job: GenericWorkflowJob, when: WhenRun) -> Result<(), AppError> {
    match when {
        WhenRun::Always => workflow.add_final(job),
        WhenRun::Success => add_final_job_as_sink(workflow, job)?,
        WhenRun::Never => {}
    }
    Ok(())
}

/// Add `job` as the single new sink, depending on every current sink.
pub fn add_final_job_as_sink(workflow: &mut GenericWorkflow, job: GenericWorkflowJob) -> Result<(), AppError> {
    let sinks = workflow.sinks();
    tracing::debug!(?sinks, job = %job.name, "attaching final job after sinks");
    let name = job.name.clone();
    workflow.add_job(job)?;
    workflow.add_job_relationships(&sinks, [name.as_str()])?;
    Ok(())
}

/// Build a final job from its config section. Attributes come from the
/// section first, then the usual search order; misc attributes are skipped.
fn create_final_job(
    config: &ConfigStore,
    workflow: &mut GenericWorkflow,
    prefix: &Path,
    section: &str,
    create_command: CommandBuilder,
    cache: &mut ResolutionCache,
) -> Result<GenericWorkflowJob, AppError> {
    let mut job = GenericWorkflowJob::new(section, section);
    let mut request = SearchRequest::new()
        .search_obj(config.get(section).cloned())
        .default_value(Value::Null);
    for (key, curval) in [("computeSite", "curr_site"), ("computeCloud", "curr_cloud")] {
        let (_, value) = config.search(key, &request)?;
        if !value.is_null() {
            request = request.with_curval(curval, value);
        }
    }

    let values = get_job_values(config, &request, None)?;
    for attr in JobAttribute::ALL {
        if attr.merge_class() == MergeClass::Misc || job.get(attr).is_some() {
            continue;
        }
        if let Some(value) = values.get(attr) {
            job.set(attr, Some(value.clone()))?;
        }
    }

    let (executable, arguments) = create_command(config, prefix)?;
    job.executable = Some(executable);

    let mut inputs = Vec::new();
    for caps in file_marker().captures_iter(&arguments) {
        let file = workflow.get_file(&caps[1]).cloned().ok_or_else(|| {
            AppError::assembly(
                codes::UNRESOLVED_PLACEHOLDER,
                format!("final job refers to unknown file '{}'", &caps[1]),
            )
            .with_detail("job", section)
        })?;
        inputs.push(file);
    }
    workflow.add_job_inputs(&job.name, inputs);
    job.arguments = Some(arguments);

    enhance_command(config, workflow, &mut job, cache)?;
    Ok(job)
}

fn shell_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid shell reference regex"))
}

fn kept_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<KEEP:([^>]+)>").expect("valid kept reference regex"))
}

fn repo_config_value(config: &ConfigStore) -> Result<String, AppError> {
    Ok(config
        .search_str(REPO_CONFIG_FILE, &SearchRequest::new().required(true))?
        .unwrap_or_default())
}

/// Script run after the workflow: `final_job.bash <runGraphFile> <repoConfig>`.
fn create_final_command(config: &ConfigStore, prefix: &Path) -> Result<(GenericWorkflowExec, String), AppError> {
    let script = write_script(
        config,
        prefix,
        "final_job.bash",
        FINAL_JOB_SECTION,
        &[RUN_GRAPH_FILE, REPO_CONFIG_FILE],
    )?;
    let executable = GenericWorkflowExec::from_uri(script.display().to_string(), true);
    Ok((
        executable,
        format!("<FILE:{}> {}", RUN_GRAPH_FILE, repo_config_value(config)?),
    ))
}

/// Script merging auxiliary state back: `merge_job.bash <repoConfig> <auxStateDir>`.
fn create_merge_command(config: &ConfigStore, prefix: &Path) -> Result<(GenericWorkflowExec, String), AppError> {
    let script = write_script(
        config,
        prefix,
        "merge_job.bash",
        AUX_STATE_SECTION,
        &[REPO_CONFIG_FILE, "auxStateDir"],
    )?;
    let executable = GenericWorkflowExec::from_uri(script.display().to_string(), true);
    Ok((
        executable,
        format!("{} <FILE:{}>", repo_config_value(config)?, REPO_CONFIG_FILE),
    ))
}

/// Write `<prefix>/<file_name>` running `command1..N` from `section`.
///
/// `positional` names the script's arguments in order. Inside commands,
/// `{name}` for a positional argument and any `${VAR}` stay shell variables;
/// other `{vars}` are resolved now.
pub fn write_script(
    config: &ConfigStore,
    prefix: &Path,
    file_name: &str,
    section: &str,
    positional: &[&str],
) -> Result<PathBuf, AppError> {
    let raw = SearchRequest::new()
        .search_obj(config.get(section).cloned())
        .replace_vars(false)
        .expand_env_vars(false)
        .replace_env_vars(false);
    let resolve = raw.clone().replace_vars(true);

    let mut lines = vec![
        "#!/bin/bash".to_string(),
        String::new(),
        "set -e".to_string(),
        "set -x".to_string(),
    ];
    for (i, name) in positional.iter().enumerate() {
        lines.push(format!("{}=${}", name, i + 1));
    }

    let mut i = 1;
    while let Some(command) = config.search_str(&format!("command{}", i), &raw)? {
        let mut command = shell_reference()
            .replace_all(&command, "<KEEP:${1}>")
            .into_owned();
        for name in positional {
            command = command.replace(&format!("{{{}}}", name), &format!("<KEEP:{}>", name));
        }
        let command = config.format(&format!(".{}.command{}", section, i), &command, &resolve)?;
        lines.push(kept_reference().replace_all(&command, "$${${1}}").into_owned());
        i += 1;
    }
    if i == 1 {
        tracing::warn!(section, "final job section has no command1; script only sets variables");
    }

    std::fs::create_dir_all(prefix)?;
    let path = prefix.join(file_name);
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(&path, body)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    }
    tracing::info!(path = %path.display(), "final job script written");
    Ok(path)
}
