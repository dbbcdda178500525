#![allow(clippy::result_large_err)]

use crate::core::config::{ConfigStore, SearchRequest};
use crate::core::error::AppError;
use genflow_types::{AttrValue, GenericWorkflowExec, JobAttribute};
use indexmap::IndexMap;

/// Retry count assigned when memory scaling is on but no count was configured.
pub const DEFAULT_MEM_RETRIES: i64 = 5;

/// Attribute values resolved for one execution unit. Absent means unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobValues {
    values: IndexMap<JobAttribute, AttrValue>,
}

impl JobValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attr: JobAttribute, value: AttrValue) -> Self {
        self.values.insert(attr, value);
        self
    }

    pub fn get(&self, attr: JobAttribute) -> Option<&AttrValue> {
        self.values.get(&attr)
    }

    pub fn set(&mut self, attr: JobAttribute, value: Option<AttrValue>) {
        match value {
            Some(value) => {
                self.values.insert(attr, value);
            }
            None => {
                self.values.shift_remove(&attr);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (JobAttribute, &AttrValue)> {
        self.values.iter().map(|(attr, value)| (*attr, value))
    }

    /// Scaling is on when the multiplier rounds up past 1; then a retry count
    /// is guaranteed. Otherwise the multiplier is dropped.
    pub fn normalize_memory_scaling(&mut self) {
        let multiplier = match self.get(JobAttribute::MemoryMultiplier) {
            Some(AttrValue::Float(x)) => Some(*x),
            Some(AttrValue::Int(i)) => Some(*i as f64),
            _ => None,
        };
        match multiplier {
            Some(x) if x.ceil() > 1.0 => {
                if self.get(JobAttribute::NumberOfRetries).is_none() {
                    self.set(
                        JobAttribute::NumberOfRetries,
                        Some(AttrValue::Int(DEFAULT_MEM_RETRIES)),
                    );
                }
            }
            _ => self.set(JobAttribute::MemoryMultiplier, None),
        }
    }
}

/// Resolve every configurable attribute with `request`, then split the
/// command line found under `cmd_line_key` into executable and arguments.
pub fn get_job_values(
    config: &ConfigStore,
    request: &SearchRequest,
    cmd_line_key: Option<&str>,
) -> Result<JobValues, AppError> {
    tracing::debug!(?cmd_line_key, curvals = ?request.curvals, "resolving job values");
    let mut values = JobValues::new();
    for attr in JobAttribute::ALL {
        if matches!(attr, JobAttribute::Label | JobAttribute::Cmdvals) {
            continue;
        }
        let key = attr.config_key();
        let (found, raw) = config.search(key, request)?;
        if !found {
            continue;
        }
        let value = AttrValue::coerce(attr, &raw)
            .map_err(|e| AppError::from(e).with_detail("key", key))?;
        values.set(attr, value);
    }

    values.normalize_memory_scaling();

    if let Some(key) = cmd_line_key {
        if let Some(cmdline) = config.search_str(key, request)? {
            let cmdline = cmdline.trim();
            if !cmdline.is_empty() {
                let (cmd, args) = cmdline.split_once(' ').unwrap_or((cmdline, ""));
                values.set(
                    JobAttribute::Executable,
                    Some(AttrValue::Exec(GenericWorkflowExec::from_uri(cmd, false))),
                );
                let args = args.trim();
                if !args.is_empty() {
                    values.set(JobAttribute::Arguments, Some(AttrValue::Text(args.to_string())));
                }
            }
        }
    }
    Ok(values)
}
