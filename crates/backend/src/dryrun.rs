use crate::error::BackendError;
use crate::{Backend, RunHandle, SubmitOptions};
use chrono::Utc;
use genflow_types::{GenericWorkflow, WorkflowSnapshot};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;

#[derive(Serialize)]
struct DryRunDocument<'a> {
    workflow: WorkflowSnapshot<'a>,
    config: &'a Value,
}

/// Backend that writes the workflow to disk instead of submitting it.
#[derive(Debug, Default)]
pub struct DryRunBackend {
    submitted: Vec<RunHandle>,
}

impl DryRunBackend {
    pub const NAME: &'static str = "dryrun";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> &[RunHandle] {
        &self.submitted
    }
}

impl Backend for DryRunBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn default_config(&self) -> Value {
        json!({
            "backendName": Self::NAME,
            "dryrun": {
                "pretty": true
            }
        })
    }

    fn submit(
        &mut self,
        workflow: &GenericWorkflow,
        options: &SubmitOptions,
    ) -> Result<RunHandle, BackendError> {
        if workflow.is_empty() && workflow.get_final().is_none() {
            return Err(BackendError::Submit {
                backend: Self::NAME.to_string(),
                workflow: workflow.name().to_string(),
                reason: "workflow has no jobs".to_string(),
            });
        }

        fs::create_dir_all(&options.submit_path)?;
        let pretty = options
            .config
            .pointer("/dryrun/pretty")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let document = DryRunDocument {
            workflow: workflow.snapshot(),
            config: &options.config,
        };
        let body = if pretty {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        };
        let path = options
            .submit_path
            .join(format!("{}.workflow.json", workflow.name()));
        fs::write(&path, body)?;

        let handle = RunHandle {
            run_id: uuid::Uuid::new_v4().to_string(),
            backend: Self::NAME.to_string(),
            workflow: workflow.name().to_string(),
            submit_path: options.submit_path.clone(),
            submitted_at: Utc::now(),
        };
        tracing::info!(
            run_id = %handle.run_id,
            path = %path.display(),
            jobs = workflow.len(),
            "dry-run submission written"
        );
        self.submitted.push(handle.clone());
        Ok(handle)
    }

    fn get_id(&self, run: &RunHandle) -> Result<String, BackendError> {
        Ok(run.run_id.clone())
    }
}
