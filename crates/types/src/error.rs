use thiserror::Error;

/// Structural errors raised while building a generic workflow.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("job '{0}' already exists in workflow")]
    DuplicateJob(String),

    #[error("job '{0}' is not part of the workflow")]
    UnknownJob(String),

    #[error("edge {parent} -> {child} would create a cycle")]
    Cycle { parent: String, child: String },

    #[error("attribute {attribute} expects a {expected} value, found {found}")]
    AttributeType {
        attribute: String,
        expected: String,
        found: String,
    },
}
