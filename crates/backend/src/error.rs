use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unknown backend '{name}' (available: {available})")]
    UnknownBackend { name: String, available: String },

    #[error("backend '{backend}' failed to submit workflow '{workflow}': {reason}")]
    Submit {
        backend: String,
        workflow: String,
        reason: String,
    },

    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
