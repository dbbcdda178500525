use crate::core::types::{ErrorCategory, ErrorSeverity};
use chrono::{DateTime, Utc};
use genflow_backend::BackendError;
use genflow_types::GraphError;
use std::collections::HashMap;

/// Stable error codes surfaced to users.
pub mod codes {
    pub const MISSING_REQUIRED: &str = "GWF-CFG-001";
    pub const INVALID_ENUM: &str = "GWF-CFG-002";
    pub const MALFORMED_TEMPLATE: &str = "GWF-CFG-003";
    pub const TYPE_CONVERSION: &str = "GWF-CFG-004";
    pub const INVALID_SOURCE: &str = "GWF-CFG-005";
    pub const CLUSTER_MISMATCH: &str = "GWF-CLU-001";
    pub const NO_FINAL_JOB: &str = "GWF-ASM-001";
    pub const UNRESOLVED_PLACEHOLDER: &str = "GWF-ASM-002";
    pub const EMPTY_GRAPH: &str = "GWF-ASM-003";
    pub const GRAPH_STRUCTURE: &str = "GWF-ASM-004";
    pub const VALIDATION_FAILED: &str = "GWF-ASM-005";
    pub const BACKEND_FAILURE: &str = "GWF-BE-001";
}

#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
    pub context: HashMap<String, String>,
    pub occurred_at: DateTime<Utc>,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        AppError {
            category,
            severity: ErrorSeverity::Error,
            code: format!("ERR-{}", uuid::Uuid::new_v4()),
            message: message.into(),
            context: HashMap::new(),
            occurred_at: Utc::now(),
            source: None,
        }
    }

    pub fn with_source<T: Into<String>>(
        category: ErrorCategory,
        message: T,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        let mut error = AppError::new(category, message);
        error.source = Some(anyhow::anyhow!(source));
        error
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    /// Attach a named detail, e.g. the key, job, or attribute that failed.
    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn add_context(&mut self, key: &str, value: &str) {
        self.context.insert(key.to_string(), value.to_string());
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn configuration<T: Into<String>>(code: &str, message: T) -> Self {
        AppError::new(ErrorCategory::ConfigurationError, message).with_code(code)
    }

    pub fn assembly<T: Into<String>>(code: &str, message: T) -> Self {
        AppError::new(ErrorCategory::AssemblyError, message).with_code(code)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if !self.context.is_empty() {
            let mut entries: Vec<_> = self.context.iter().collect();
            entries.sort();
            write!(f, " (Context: {:?})", entries)?;
        }
        if let Some(ref source) = self.source {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError {
            category: ErrorCategory::InternalError,
            severity: ErrorSeverity::Error,
            code: "ANYHOW_ERROR".to_string(),
            message: e.to_string(),
            context: HashMap::new(),
            occurred_at: Utc::now(),
            source: Some(e),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError {
            category: ErrorCategory::IoError,
            severity: ErrorSeverity::Error,
            code: "IO_ERROR".to_string(),
            message: e.to_string(),
            context: HashMap::new(),
            occurred_at: Utc::now(),
            source: Some(anyhow::anyhow!(e)),
        }
    }
}

impl From<GraphError> for AppError {
    fn from(e: GraphError) -> Self {
        let (category, code) = match &e {
            GraphError::AttributeType { .. } => {
                (ErrorCategory::ConfigurationError, codes::TYPE_CONVERSION)
            }
            _ => (ErrorCategory::AssemblyError, codes::GRAPH_STRUCTURE),
        };
        AppError::new(category, e.to_string()).with_code(code)
    }
}

impl From<BackendError> for AppError {
    fn from(e: BackendError) -> Self {
        let message = e.to_string();
        AppError::with_source(ErrorCategory::BackendError, message, Box::new(e))
            .with_code(codes::BACKEND_FAILURE)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::new(ErrorCategory::SerializationError, e.to_string())
            .with_code("SERIALIZATION_ERROR")
    }
}

pub trait ErrorReporter {
    fn report_error(&self, error: &AppError);
    fn report_warning(&self, message: &str, context: Option<String>);
    fn report_info(&self, message: &str);
}

pub struct DefaultErrorReporter;

impl DefaultErrorReporter {
    pub fn new() -> Self {
        DefaultErrorReporter
    }
}

impl Default for DefaultErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorReporter for DefaultErrorReporter {
    fn report_error(&self, error: &AppError) {
        eprintln!("[ERROR] {}: {}", error.code, error.message);
        if !error.context.is_empty() {
            let mut entries: Vec<_> = error.context.iter().collect();
            entries.sort();
            for (key, value) in entries {
                eprintln!("  {}: {}", key, value);
            }
        }
        if let Some(ref source) = error.source {
            eprintln!("  Caused by: {}", source);
        }
    }

    fn report_warning(&self, message: &str, context: Option<String>) {
        eprintln!("[WARNING] {}", message);
        if let Some(ref ctx) = context {
            eprintln!("  Context: {}", ctx);
        }
    }

    fn report_info(&self, message: &str) {
        println!("[INFO] {}", message);
    }
}
