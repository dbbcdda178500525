#![allow(clippy::result_large_err)]

use super::job_values::JobValues;
use crate::core::config::{ConfigStore, SearchRequest};
use crate::core::error::{codes, AppError};
use crate::core::types::WhenSave;
use serde_json::Value;
use std::collections::HashMap;

/// Per-label settings that steer command construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSettings {
    pub when_save: WhenSave,
    pub use_lazy_commands: bool,
    pub use_shared: bool,
}

/// Values resolved once per label (or task label) during one transform.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    settings: HashMap<String, LabelSettings>,
    values: HashMap<String, HashMap<String, Option<Value>>>,
    job_values: HashMap<String, JobValues>,
    init_values: Option<JobValues>,
}

/// Request used for everything resolved on behalf of a job label: nested
/// variables resolved, environment references deferred to the job.
pub fn label_request(label: &str) -> SearchRequest {
    SearchRequest::new()
        .with_curval("curr_task", label)
        .replace_vars(true)
        .expand_env_vars(false)
        .replace_env_vars(true)
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label_settings(&mut self, config: &ConfigStore, label: &str) -> Result<LabelSettings, AppError> {
        if let Some(settings) = self.settings.get(label) {
            return Ok(*settings);
        }
        let request = label_request(label);
        let when_save = config
            .search_str("whenSaveJobGraph", &request.clone().default_value("TRANSFORM"))?
            .unwrap_or_else(|| "TRANSFORM".to_string());
        let when_save: WhenSave = when_save.parse().map_err(|reason: String| {
            AppError::configuration(codes::INVALID_ENUM, format!("whenSaveJobGraph: {}", reason))
                .with_detail("key", "whenSaveJobGraph")
                .with_detail("label", label)
        })?;
        let settings = LabelSettings {
            when_save,
            use_lazy_commands: search_bool(config, "useLazyCommands", &request, true)?,
            use_shared: search_bool(config, "useShared", &request, true)?,
        };
        tracing::debug!(label, ?settings, "cached label settings");
        self.settings.insert(label.to_string(), settings);
        Ok(settings)
    }

    /// Resolved value of `key` for `label`; `None` when the key is unknown.
    pub fn value(&mut self, config: &ConfigStore, label: &str, key: &str) -> Result<Option<Value>, AppError> {
        let per_label = self.values.entry(label.to_string()).or_default();
        if let Some(cached) = per_label.get(key) {
            return Ok(cached.clone());
        }
        let (found, value) = config.search(key, &label_request(label))?;
        let resolved = (found && !value.is_null()).then_some(value);
        per_label.insert(key.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Job values for `task_label`, computed on first use.
    pub fn job_values<F>(&mut self, task_label: &str, compute: F) -> Result<&JobValues, AppError>
    where
        F: FnOnce() -> Result<JobValues, AppError>,
    {
        if !self.job_values.contains_key(task_label) {
            let values = compute()?;
            self.job_values.insert(task_label.to_string(), values);
        }
        self.job_values.get(task_label).ok_or_else(|| {
            AppError::new(
                crate::core::types::ErrorCategory::InternalError,
                format!("job values for '{}' missing from cache", task_label),
            )
        })
    }

    /// Job values shared by every init job. Kept apart from the task label
    /// entries since a pipeline task may itself be labelled `init`.
    pub fn init_job_values<F>(&mut self, compute: F) -> Result<&JobValues, AppError>
    where
        F: FnOnce() -> Result<JobValues, AppError>,
    {
        if self.init_values.is_none() {
            self.init_values = Some(compute()?);
        }
        self.init_values.as_ref().ok_or_else(|| {
            AppError::new(
                crate::core::types::ErrorCategory::InternalError,
                "init job values missing from cache",
            )
        })
    }
}

/// Boolean setting that also accepts the usual string spellings.
pub fn search_bool(
    config: &ConfigStore,
    key: &str,
    request: &SearchRequest,
    default: bool,
) -> Result<bool, AppError> {
    let (found, value) = config.search(key, request)?;
    if !found {
        return Ok(default);
    }
    match &value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(default),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(bool_error(key, &value)),
        },
        _ => Err(bool_error(key, &value)),
    }
}

fn bool_error(key: &str, value: &Value) -> AppError {
    AppError::configuration(
        codes::TYPE_CONVERSION,
        format!("{} must be a boolean, found {}", key, value),
    )
    .with_detail("key", key)
}
