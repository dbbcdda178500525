pub mod config;
pub mod error;
pub mod graph;
pub mod lint;
pub mod transform;
pub mod types;

pub use config::{ConfigLoader, ConfigSources, ConfigStore, LoadedConfig, SearchRequest};
pub use error::{codes, AppError, DefaultErrorReporter, ErrorReporter};
pub use graph::{ComputationGraph, InMemoryGraph};
pub use lint::{LintRegistry, LintResult, LintSeverity};
pub use transform::{create_generic_workflow, create_generic_workflow_config, transform};
pub use types::*;
