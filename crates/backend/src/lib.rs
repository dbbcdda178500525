//! Backend capability interface and registry.
//!
//! A backend takes a finished [`GenericWorkflow`] and hands it to a workload
//! manager. The registry maps the identifier chosen in configuration to a
//! factory; the engine resolves it once at startup.

pub mod dryrun;
pub mod error;
pub mod registry;

pub use dryrun::DryRunBackend;
pub use error::BackendError;
pub use registry::{BackendFactory, BackendRegistry};

use chrono::{DateTime, Utc};
use genflow_types::GenericWorkflow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Inputs a backend needs besides the workflow itself.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub submit_path: PathBuf,
    /// Resolved configuration snapshot accompanying the workflow.
    pub config: Value,
}

/// Handle returned after a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: String,
    pub backend: String,
    pub workflow: String,
    pub submit_path: PathBuf,
    pub submitted_at: DateTime<Utc>,
}

/// Capability every workload-manager adapter implements.
pub trait Backend {
    /// Identifier used in configuration.
    fn name(&self) -> &str;

    /// Configuration layered beneath the user's file when this backend is selected.
    fn default_config(&self) -> Value;

    fn submit(
        &mut self,
        workflow: &GenericWorkflow,
        options: &SubmitOptions,
    ) -> Result<RunHandle, BackendError>;

    fn get_id(&self, run: &RunHandle) -> Result<String, BackendError>;
}
