//! Backend-agnostic generic workflow data model.
//!
//! A [`GenericWorkflow`] is a DAG of [`GenericWorkflowJob`]s plus the
//! [`GenericWorkflowFile`]s each job reads or writes. Backends consume it
//! without knowing anything about the computation graph it came from.

pub mod attribute;
pub mod error;
pub mod file;
pub mod job;
pub mod workflow;

pub use attribute::{AttrKind, AttrValue, JobAttribute, MergeClass};
pub use error::GraphError;
pub use file::{GenericWorkflowExec, GenericWorkflowFile};
pub use job::GenericWorkflowJob;
pub use workflow::{GenericWorkflow, WorkflowSnapshot};
