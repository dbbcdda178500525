#![allow(clippy::result_large_err)]

//! Folding per-unit values into a cluster job.
//!
//! Attributes fold by merge class: universal values must agree, max values
//! keep the largest, sum values add up, misc values are left to the caller.
//! Memory scaling travels with the memory request: the unit with the largest
//! `(requestMemory, memoryMultiplier)` pair, unset ordering below set, sets
//! both on the job. `numberOfRetries` is a plain max over the normalized unit
//! values, so a job with a multiplier always carries retries and the result
//! does not depend on fold order.

use super::job_values::JobValues;
use crate::core::error::{codes, AppError};
use crate::core::types::ErrorCategory;
use genflow_types::{AttrValue, GenericWorkflowJob, JobAttribute, MergeClass};
use std::cmp::Ordering;

/// Fold one unit's values into `job`.
pub fn fold_job_values(values: &JobValues, job: &mut GenericWorkflowJob) -> Result<(), AppError> {
    fold_universal(values, job)?;
    fold_max(values, job)?;
    fold_sum(values, job)?;
    Ok(())
}

fn is_unset(value: &Option<AttrValue>) -> bool {
    match value {
        None => true,
        Some(AttrValue::Text(text)) => text.is_empty(),
        Some(_) => false,
    }
}

pub fn fold_universal(values: &JobValues, job: &mut GenericWorkflowJob) -> Result<(), AppError> {
    for attr in JobAttribute::of_class(MergeClass::Universal) {
        let Some(unit_value) = values.get(attr) else {
            continue;
        };
        let current = job.get(attr);
        if is_unset(&current) {
            job.set(attr, Some(unit_value.clone()))?;
            continue;
        }
        if let Some(current) = current {
            if &current != unit_value {
                tracing::error!(
                    attribute = %attr,
                    job = %job.name,
                    job_value = %current,
                    unit_value = %unit_value,
                    "inconsistent value in cluster"
                );
                return Err(AppError::new(
                    ErrorCategory::ClusterConsistencyError,
                    format!(
                        "Inconsistent value for {} in cluster {}: job has '{}', unit has '{}'",
                        attr, job.name, current, unit_value
                    ),
                )
                .with_code(codes::CLUSTER_MISMATCH)
                .with_detail("attribute", attr.config_key())
                .with_detail("job", job.name.clone())
                .with_detail("job_value", current.to_string())
                .with_detail("unit_value", unit_value.to_string()));
            }
        }
    }
    Ok(())
}

pub fn fold_max(values: &JobValues, job: &mut GenericWorkflowJob) -> Result<(), AppError> {
    let mut values = values.clone();
    values.normalize_memory_scaling();

    let unit_memory = values.get(JobAttribute::RequestMemory);
    let unit_multiplier = values.get(JobAttribute::MemoryMultiplier);
    let job_memory = job.get(JobAttribute::RequestMemory);
    let job_multiplier = job.get(JobAttribute::MemoryMultiplier);
    let owns_memory = match compare_set(unit_memory, job_memory.as_ref()) {
        Ordering::Greater => true,
        Ordering::Equal => compare_set(unit_multiplier, job_multiplier.as_ref()) == Ordering::Greater,
        Ordering::Less => false,
    };
    if owns_memory {
        job.set(JobAttribute::RequestMemory, unit_memory.cloned())?;
        job.set(JobAttribute::MemoryMultiplier, unit_multiplier.cloned())?;
    }

    for attr in JobAttribute::of_class(MergeClass::Max) {
        if matches!(attr, JobAttribute::RequestMemory | JobAttribute::MemoryMultiplier) {
            continue;
        }
        raise(&values, job, attr)?;
    }
    Ok(())
}

/// Order two optional values, unset below set.
fn compare_set(left: Option<&AttrValue>, right: Option<&AttrValue>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) if left.exceeds(right) => Ordering::Greater,
        (Some(left), Some(right)) if right.exceeds(left) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Set `attr` to the unit's value when the job has none or a smaller one.
fn raise(values: &JobValues, job: &mut GenericWorkflowJob, attr: JobAttribute) -> Result<(), AppError> {
    let Some(unit_value) = values.get(attr) else {
        return Ok(());
    };
    let needs_update = match job.get(attr) {
        None => true,
        Some(current) => unit_value.exceeds(&current),
    };
    if needs_update {
        job.set(attr, Some(unit_value.clone()))?;
    }
    Ok(())
}

pub fn fold_sum(values: &JobValues, job: &mut GenericWorkflowJob) -> Result<(), AppError> {
    for attr in JobAttribute::of_class(MergeClass::Sum) {
        let Some(unit_value) = values.get(attr) else {
            continue;
        };
        let next = match job.get(attr) {
            None => unit_value.clone(),
            Some(current) => current.checked_add(unit_value).ok_or_else(|| {
                AppError::configuration(
                    codes::TYPE_CONVERSION,
                    format!("cannot add '{}' to '{}' for {}", unit_value, current, attr),
                )
                .with_detail("attribute", attr.config_key())
                .with_detail("job", job.name.clone())
            })?,
        };
        job.set(attr, Some(next))?;
    }
    Ok(())
}
