use serde::{Deserialize, Serialize};
use std::path::Path;

/// A file a job reads or writes.
///
/// The three flags are independent: `wms_transfer` asks the backend to stage the
/// file, `job_access_remote` says the job can read it in place from a remote
/// location, and `job_shared` says it lives on a filesystem shared with the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericWorkflowFile {
    name: String,
    src_uri: String,
    wms_transfer: bool,
    job_access_remote: bool,
    job_shared: bool,
}

impl GenericWorkflowFile {
    pub fn new(
        name: impl Into<String>,
        src_uri: impl Into<String>,
        wms_transfer: bool,
        job_access_remote: bool,
        job_shared: bool,
    ) -> Self {
        Self {
            name: name.into(),
            src_uri: src_uri.into(),
            wms_transfer,
            job_access_remote,
            job_shared,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn src_uri(&self) -> &str {
        &self.src_uri
    }

    pub fn wms_transfer(&self) -> bool {
        self.wms_transfer
    }

    pub fn job_access_remote(&self) -> bool {
        self.job_access_remote
    }

    pub fn job_shared(&self) -> bool {
        self.job_shared
    }

    /// Final path component of the source location.
    pub fn basename(&self) -> &str {
        Path::new(&self.src_uri)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.src_uri)
    }
}

/// Executable a job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericWorkflowExec {
    pub name: String,
    pub src_uri: String,
    pub transfer_executable: bool,
}

impl GenericWorkflowExec {
    /// Build an executable whose name is the basename of `src_uri`.
    pub fn from_uri(src_uri: impl Into<String>, transfer_executable: bool) -> Self {
        let src_uri = src_uri.into();
        let name = Path::new(&src_uri)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&src_uri)
            .to_string();
        Self {
            name,
            src_uri,
            transfer_executable,
        }
    }
}
