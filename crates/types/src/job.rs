use crate::attribute::{AttrValue, JobAttribute};
use crate::error::GraphError;
use crate::file::GenericWorkflowExec;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// One submittable job in a generic workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenericWorkflowJob {
    pub name: String,
    pub label: String,
    /// Number of execution units per task label folded into this job.
    pub quanta_counts: IndexMap<String, usize>,
    pub tags: IndexMap<String, String>,
    pub executable: Option<GenericWorkflowExec>,
    pub arguments: Option<String>,
    pub cmdvals: IndexMap<String, Value>,
    pub memory_multiplier: Option<f64>,
    pub number_of_retries: Option<i64>,
    pub request_cpus: Option<i64>,
    pub request_memory: Option<i64>,
    pub request_memory_max: Option<i64>,
    pub request_disk: Option<i64>,
    pub request_walltime: Option<i64>,
    pub compute_site: Option<String>,
    pub compute_cloud: Option<String>,
    pub queue: Option<String>,
    pub priority: Option<i64>,
    pub category: Option<String>,
    pub concurrency_limit: Option<String>,
    pub mail_to: Option<String>,
    pub when_to_mail: Option<String>,
    pub retry_unless_exit: Option<i64>,
    pub abort_on_value: Option<i64>,
    pub abort_return_value: Option<i64>,
    pub pre_cmdline: Option<String>,
    pub post_cmdline: Option<String>,
    pub preemptible: Option<bool>,
    pub environment: IndexMap<String, Value>,
    pub profile: IndexMap<String, Value>,
    pub attrs: IndexMap<String, Value>,
}

impl GenericWorkflowJob {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    /// Read an attribute; empty maps and empty labels read as unset.
    pub fn get(&self, attr: JobAttribute) -> Option<AttrValue> {
        use JobAttribute::*;
        fn map(values: &IndexMap<String, Value>) -> Option<AttrValue> {
            (!values.is_empty()).then(|| AttrValue::Map(values.clone()))
        }
        match attr {
            Label => (!self.label.is_empty()).then(|| AttrValue::Text(self.label.clone())),
            Cmdvals => map(&self.cmdvals),
            Profile => map(&self.profile),
            Attrs => map(&self.attrs),
            Environment => map(&self.environment),
            MemoryMultiplier => self.memory_multiplier.map(AttrValue::Float),
            NumberOfRetries => self.number_of_retries.map(AttrValue::Int),
            RequestCpus => self.request_cpus.map(AttrValue::Int),
            RequestMemory => self.request_memory.map(AttrValue::Int),
            RequestMemoryMax => self.request_memory_max.map(AttrValue::Int),
            RequestDisk => self.request_disk.map(AttrValue::Int),
            RequestWalltime => self.request_walltime.map(AttrValue::Int),
            Priority => self.priority.map(AttrValue::Int),
            RetryUnlessExit => self.retry_unless_exit.map(AttrValue::Int),
            AbortOnValue => self.abort_on_value.map(AttrValue::Int),
            AbortReturnValue => self.abort_return_value.map(AttrValue::Int),
            Preemptible => self.preemptible.map(AttrValue::Bool),
            ComputeSite => self.compute_site.clone().map(AttrValue::Text),
            ComputeCloud => self.compute_cloud.clone().map(AttrValue::Text),
            Queue => self.queue.clone().map(AttrValue::Text),
            Category => self.category.clone().map(AttrValue::Text),
            ConcurrencyLimit => self.concurrency_limit.clone().map(AttrValue::Text),
            MailTo => self.mail_to.clone().map(AttrValue::Text),
            WhenToMail => self.when_to_mail.clone().map(AttrValue::Text),
            PreCmdline => self.pre_cmdline.clone().map(AttrValue::Text),
            PostCmdline => self.post_cmdline.clone().map(AttrValue::Text),
            Arguments => self.arguments.clone().map(AttrValue::Text),
            Executable => self.executable.clone().map(AttrValue::Exec),
        }
    }

    /// Write an attribute, rejecting values of the wrong kind.
    pub fn set(&mut self, attr: JobAttribute, value: Option<AttrValue>) -> Result<(), GraphError> {
        use JobAttribute::*;
        let mismatch = |value: &AttrValue| GraphError::AttributeType {
            attribute: attr.config_key().to_string(),
            expected: attr.kind().to_string(),
            found: value.to_string(),
        };
        match (attr, value) {
            (Label, None) => self.label.clear(),
            (Cmdvals, None) => self.cmdvals.clear(),
            (Profile, None) => self.profile.clear(),
            (Attrs, None) => self.attrs.clear(),
            (Environment, None) => self.environment.clear(),
            (MemoryMultiplier, None) => self.memory_multiplier = None,
            (NumberOfRetries, None) => self.number_of_retries = None,
            (RequestCpus, None) => self.request_cpus = None,
            (RequestMemory, None) => self.request_memory = None,
            (RequestMemoryMax, None) => self.request_memory_max = None,
            (RequestDisk, None) => self.request_disk = None,
            (RequestWalltime, None) => self.request_walltime = None,
            (Priority, None) => self.priority = None,
            (RetryUnlessExit, None) => self.retry_unless_exit = None,
            (AbortOnValue, None) => self.abort_on_value = None,
            (AbortReturnValue, None) => self.abort_return_value = None,
            (Preemptible, None) => self.preemptible = None,
            (ComputeSite, None) => self.compute_site = None,
            (ComputeCloud, None) => self.compute_cloud = None,
            (Queue, None) => self.queue = None,
            (Category, None) => self.category = None,
            (ConcurrencyLimit, None) => self.concurrency_limit = None,
            (MailTo, None) => self.mail_to = None,
            (WhenToMail, None) => self.when_to_mail = None,
            (PreCmdline, None) => self.pre_cmdline = None,
            (PostCmdline, None) => self.post_cmdline = None,
            (Arguments, None) => self.arguments = None,
            (Executable, None) => self.executable = None,

            (Label, Some(AttrValue::Text(s))) => self.label = s,
            (Cmdvals, Some(AttrValue::Map(m))) => self.cmdvals = m,
            (Profile, Some(AttrValue::Map(m))) => self.profile = m,
            (Attrs, Some(AttrValue::Map(m))) => self.attrs = m,
            (Environment, Some(AttrValue::Map(m))) => self.environment = m,
            (MemoryMultiplier, Some(AttrValue::Float(x))) => self.memory_multiplier = Some(x),
            (MemoryMultiplier, Some(AttrValue::Int(i))) => {
                self.memory_multiplier = Some(i as f64)
            }
            (NumberOfRetries, Some(AttrValue::Int(i))) => self.number_of_retries = Some(i),
            (RequestCpus, Some(AttrValue::Int(i))) => self.request_cpus = Some(i),
            (RequestMemory, Some(AttrValue::Int(i))) => self.request_memory = Some(i),
            (RequestMemoryMax, Some(AttrValue::Int(i))) => self.request_memory_max = Some(i),
            (RequestDisk, Some(AttrValue::Int(i))) => self.request_disk = Some(i),
            (RequestWalltime, Some(AttrValue::Int(i))) => self.request_walltime = Some(i),
            (Priority, Some(AttrValue::Int(i))) => self.priority = Some(i),
            (RetryUnlessExit, Some(AttrValue::Int(i))) => self.retry_unless_exit = Some(i),
            (AbortOnValue, Some(AttrValue::Int(i))) => self.abort_on_value = Some(i),
            (AbortReturnValue, Some(AttrValue::Int(i))) => self.abort_return_value = Some(i),
            (Preemptible, Some(AttrValue::Bool(b))) => self.preemptible = Some(b),
            (ComputeSite, Some(AttrValue::Text(s))) => self.compute_site = Some(s),
            (ComputeCloud, Some(AttrValue::Text(s))) => self.compute_cloud = Some(s),
            (Queue, Some(AttrValue::Text(s))) => self.queue = Some(s),
            (Category, Some(AttrValue::Text(s))) => self.category = Some(s),
            (ConcurrencyLimit, Some(AttrValue::Text(s))) => self.concurrency_limit = Some(s),
            (MailTo, Some(AttrValue::Text(s))) => self.mail_to = Some(s),
            (WhenToMail, Some(AttrValue::Text(s))) => self.when_to_mail = Some(s),
            (PreCmdline, Some(AttrValue::Text(s))) => self.pre_cmdline = Some(s),
            (PostCmdline, Some(AttrValue::Text(s))) => self.post_cmdline = Some(s),
            (Arguments, Some(AttrValue::Text(s))) => self.arguments = Some(s),
            (Executable, Some(AttrValue::Exec(e))) => self.executable = Some(e),
            (_, Some(other)) => return Err(mismatch(&other)),
        }
        Ok(())
    }
}
