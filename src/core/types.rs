use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    ConfigurationError,
    ClusterConsistencyError,
    AssemblyError,
    BackendError,
    SerializationError,
    IoError,
    InternalError,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
    Debug,
}

/// When a final, merge, or auxiliary-state step runs relative to the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WhenRun {
    Always,
    Success,
    Never,
}

impl FromStr for WhenRun {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ALWAYS" => Ok(WhenRun::Always),
            "SUCCESS" => Ok(WhenRun::Success),
            "NEVER" => Ok(WhenRun::Never),
            _ => Err(format!(
                "invalid value '{}'; supported values are ALWAYS, SUCCESS, NEVER",
                value
            )),
        }
    }
}

impl fmt::Display for WhenRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhenRun::Always => write!(f, "ALWAYS"),
            WhenRun::Success => write!(f, "SUCCESS"),
            WhenRun::Never => write!(f, "NEVER"),
        }
    }
}

/// Submission stage at which per-job graph slices are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WhenSave {
    Never,
    Transform,
    Prepare,
    Submit,
}

impl FromStr for WhenSave {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NEVER" => Ok(WhenSave::Never),
            "TRANSFORM" => Ok(WhenSave::Transform),
            "PREPARE" => Ok(WhenSave::Prepare),
            "SUBMIT" => Ok(WhenSave::Submit),
            _ => Err(format!(
                "invalid value '{}'; supported values are NEVER, TRANSFORM, PREPARE, SUBMIT",
                value
            )),
        }
    }
}

impl fmt::Display for WhenSave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhenSave::Never => write!(f, "NEVER"),
            WhenSave::Transform => write!(f, "TRANSFORM"),
            WhenSave::Prepare => write!(f, "PREPARE"),
            WhenSave::Submit => write!(f, "SUBMIT"),
        }
    }
}
