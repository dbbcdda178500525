use genflow::core::codes;
use genflow::core::config::{ConfigStore, SearchRequest};
use genflow::core::transform::{fold_job_values, get_job_values, JobValues};
use genflow::core::ErrorCategory;
use genflow_types::{AttrValue, GenericWorkflowJob, JobAttribute};
use serde_json::json;

fn unit(site: &str) -> JobValues {
    JobValues::new().with(JobAttribute::ComputeSite, AttrValue::Text(site.to_string()))
}

fn config() -> ConfigStore {
    ConfigStore::with_default_order(json!({
        "requestCpus": 1,
        "task": {
            "small": {"requestMemory": 2048, "requestDisk": 10},
            "big": {"requestMemory": 4096, "memoryMultiplier": 2.0, "requestDisk": 20},
            "wide": {"requestCpus": 8, "requestDisk": 30},
        }
    }))
    .unwrap()
}

fn values_for(config: &ConfigStore, task: &str) -> JobValues {
    let request = SearchRequest::new().with_curval("curr_task", task);
    get_job_values(config, &request, None).unwrap()
}

#[test]
fn universal_values_must_agree() {
    let mut job = GenericWorkflowJob::new("cl1_v1", "cl1");
    fold_job_values(&unit("s1"), &mut job).unwrap();
    fold_job_values(&unit("s1"), &mut job).unwrap();
    assert_eq!(job.compute_site.as_deref(), Some("s1"));

    let err = fold_job_values(&unit("s2"), &mut job).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ClusterConsistencyError);
    assert_eq!(err.code, codes::CLUSTER_MISMATCH);
    assert_eq!(err.context.get("attribute"), Some(&"computeSite".to_string()));
    assert_eq!(err.context.get("job"), Some(&"cl1_v1".to_string()));
    assert_eq!(err.context.get("job_value"), Some(&"s1".to_string()));
    assert_eq!(err.context.get("unit_value"), Some(&"s2".to_string()));
}

#[test]
fn unset_universal_value_does_not_conflict() {
    let mut job = GenericWorkflowJob::new("j", "l");
    fold_job_values(&JobValues::new(), &mut job).unwrap();
    fold_job_values(&unit("s1"), &mut job).unwrap();
    fold_job_values(&JobValues::new(), &mut job).unwrap();
    assert_eq!(job.compute_site.as_deref(), Some("s1"));
}

#[test]
fn memory_scaling_follows_the_largest_request_in_any_order() {
    let config = config();
    let small = values_for(&config, "small");
    let big = values_for(&config, "big");
    assert_eq!(small.get(JobAttribute::MemoryMultiplier), None);
    assert_eq!(big.get(JobAttribute::NumberOfRetries), Some(&AttrValue::Int(5)));

    let mut forward = GenericWorkflowJob::new("j", "l");
    fold_job_values(&small, &mut forward).unwrap();
    fold_job_values(&big, &mut forward).unwrap();

    let mut backward = GenericWorkflowJob::new("j", "l");
    fold_job_values(&big, &mut backward).unwrap();
    fold_job_values(&small, &mut backward).unwrap();

    for job in [&forward, &backward] {
        assert_eq!(job.request_memory, Some(4096));
        assert_eq!(job.memory_multiplier, Some(2.0));
        assert_eq!(job.number_of_retries, Some(5));
    }
    assert_eq!(forward, backward);
}

#[test]
fn max_and_sum_over_three_units() {
    let config = config();
    let mut job = GenericWorkflowJob::new("j", "l");
    for task in ["small", "wide", "big"] {
        fold_job_values(&values_for(&config, task), &mut job).unwrap();
    }
    assert_eq!(job.request_cpus, Some(8));
    assert_eq!(job.request_disk, Some(60));
}

#[test]
fn walltime_sums_like_disk() {
    let mut job = GenericWorkflowJob::new("j", "l");
    for minutes in [1, 2, 3] {
        let values = JobValues::new().with(JobAttribute::RequestWalltime, AttrValue::Int(minutes));
        fold_job_values(&values, &mut job).unwrap();
    }
    assert_eq!(job.request_walltime, Some(6));
}

#[test]
fn scaling_without_memory_request_is_order_independent() {
    let with_memory = JobValues::new().with(JobAttribute::RequestMemory, AttrValue::Int(4096));
    let with_multiplier =
        JobValues::new().with(JobAttribute::MemoryMultiplier, AttrValue::Float(2.0));

    let mut forward = GenericWorkflowJob::new("cl", "cl");
    fold_job_values(&with_memory, &mut forward).unwrap();
    fold_job_values(&with_multiplier, &mut forward).unwrap();

    let mut backward = GenericWorkflowJob::new("cl", "cl");
    fold_job_values(&with_multiplier, &mut backward).unwrap();
    fold_job_values(&with_memory, &mut backward).unwrap();

    assert_eq!(forward, backward);
    assert_eq!(forward.request_memory, Some(4096));
    assert_eq!(forward.memory_multiplier, None);
    assert_eq!(forward.number_of_retries, Some(5));
}

#[test]
fn lone_multiplier_always_carries_retries() {
    let mut job = GenericWorkflowJob::new("cl", "cl");
    let values = JobValues::new().with(JobAttribute::MemoryMultiplier, AttrValue::Float(2.0));
    fold_job_values(&values, &mut job).unwrap();
    assert_eq!(job.request_memory, None);
    assert_eq!(job.memory_multiplier, Some(2.0));
    assert_eq!(job.number_of_retries, Some(5));
}
