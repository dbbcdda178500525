use crate::error::GraphError;
use crate::file::GenericWorkflowExec;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// How values from several execution units combine into one cluster job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MergeClass {
    /// Every unit must agree.
    Universal,
    /// Largest value wins.
    Max,
    /// Values add up.
    Sum,
    /// Never merged automatically.
    Misc,
}

/// Value type an attribute holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttrKind {
    Bool,
    Int,
    Float,
    Text,
    Exec,
    Map,
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttrKind::Bool => "boolean",
            AttrKind::Int => "integer",
            AttrKind::Float => "number",
            AttrKind::Text => "string",
            AttrKind::Exec => "executable",
            AttrKind::Map => "mapping",
        };
        f.write_str(name)
    }
}

/// Closed set of job attributes that configuration can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum JobAttribute {
    Label,
    Cmdvals,
    Profile,
    Attrs,
    MemoryMultiplier,
    NumberOfRetries,
    RequestCpus,
    RequestMemory,
    RequestMemoryMax,
    RequestDisk,
    RequestWalltime,
    ComputeSite,
    ComputeCloud,
    Queue,
    Priority,
    Category,
    ConcurrencyLimit,
    MailTo,
    WhenToMail,
    RetryUnlessExit,
    AbortOnValue,
    AbortReturnValue,
    PreCmdline,
    PostCmdline,
    Preemptible,
    Environment,
    Executable,
    Arguments,
}

impl JobAttribute {
    pub const ALL: [JobAttribute; 28] = [
        JobAttribute::Label,
        JobAttribute::Cmdvals,
        JobAttribute::Profile,
        JobAttribute::Attrs,
        JobAttribute::MemoryMultiplier,
        JobAttribute::NumberOfRetries,
        JobAttribute::RequestCpus,
        JobAttribute::RequestMemory,
        JobAttribute::RequestMemoryMax,
        JobAttribute::RequestDisk,
        JobAttribute::RequestWalltime,
        JobAttribute::ComputeSite,
        JobAttribute::ComputeCloud,
        JobAttribute::Queue,
        JobAttribute::Priority,
        JobAttribute::Category,
        JobAttribute::ConcurrencyLimit,
        JobAttribute::MailTo,
        JobAttribute::WhenToMail,
        JobAttribute::RetryUnlessExit,
        JobAttribute::AbortOnValue,
        JobAttribute::AbortReturnValue,
        JobAttribute::PreCmdline,
        JobAttribute::PostCmdline,
        JobAttribute::Preemptible,
        JobAttribute::Environment,
        JobAttribute::Executable,
        JobAttribute::Arguments,
    ];

    pub fn merge_class(self) -> MergeClass {
        use JobAttribute::*;
        match self {
            Label | Cmdvals | Profile | Attrs => MergeClass::Misc,
            MemoryMultiplier | NumberOfRetries | RequestCpus | RequestMemory
            | RequestMemoryMax => MergeClass::Max,
            RequestDisk | RequestWalltime => MergeClass::Sum,
            _ => MergeClass::Universal,
        }
    }

    pub fn kind(self) -> AttrKind {
        use JobAttribute::*;
        match self {
            MemoryMultiplier => AttrKind::Float,
            NumberOfRetries | RequestCpus | RequestMemory | RequestMemoryMax | RequestDisk
            | RequestWalltime | Priority | RetryUnlessExit | AbortOnValue | AbortReturnValue => {
                AttrKind::Int
            }
            Preemptible => AttrKind::Bool,
            Cmdvals | Profile | Attrs | Environment => AttrKind::Map,
            Executable => AttrKind::Exec,
            Label | ComputeSite | ComputeCloud | Queue | Category | ConcurrencyLimit | MailTo
            | WhenToMail | PreCmdline | PostCmdline | Arguments => AttrKind::Text,
        }
    }

    /// Key used for this attribute in configuration files.
    pub fn config_key(self) -> &'static str {
        use JobAttribute::*;
        match self {
            Label => "label",
            Cmdvals => "cmdvals",
            Profile => "profile",
            Attrs => "attrs",
            MemoryMultiplier => "memoryMultiplier",
            NumberOfRetries => "numberOfRetries",
            RequestCpus => "requestCpus",
            RequestMemory => "requestMemory",
            RequestMemoryMax => "requestMemoryMax",
            RequestDisk => "requestDisk",
            RequestWalltime => "requestWalltime",
            ComputeSite => "computeSite",
            ComputeCloud => "computeCloud",
            Queue => "queue",
            Priority => "priority",
            Category => "category",
            ConcurrencyLimit => "concurrencyLimit",
            MailTo => "mailTo",
            WhenToMail => "whenToMail",
            RetryUnlessExit => "retryUnlessExit",
            AbortOnValue => "abortOnValue",
            AbortReturnValue => "abortReturnValue",
            PreCmdline => "preCmdline",
            PostCmdline => "postCmdline",
            Preemptible => "preemptible",
            Environment => "environment",
            Executable => "executable",
            Arguments => "arguments",
        }
    }

    /// Attributes of the given merge class, in declaration order.
    pub fn of_class(class: MergeClass) -> impl Iterator<Item = JobAttribute> {
        Self::ALL
            .into_iter()
            .filter(move |attr| attr.merge_class() == class)
    }
}

impl fmt::Display for JobAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Typed value of a [`JobAttribute`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Exec(GenericWorkflowExec),
    Map(IndexMap<String, Value>),
}

impl AttrValue {
    /// Convert a configuration value into the attribute's declared kind.
    ///
    /// `null` means unset and yields `Ok(None)`.
    pub fn coerce(attr: JobAttribute, value: &Value) -> Result<Option<AttrValue>, GraphError> {
        if value.is_null() {
            return Ok(None);
        }
        let kind = attr.kind();
        let converted = match (kind, value) {
            (AttrKind::Bool, Value::Bool(b)) => Some(AttrValue::Bool(*b)),
            (AttrKind::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(AttrValue::Bool(true)),
                "false" | "no" | "0" => Some(AttrValue::Bool(false)),
                _ => None,
            },
            (AttrKind::Int, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(AttrValue::Int),
            (AttrKind::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(AttrValue::Int),
            (AttrKind::Float, Value::Number(n)) => n.as_f64().map(AttrValue::Float),
            (AttrKind::Float, Value::String(s)) => {
                s.trim().parse::<f64>().ok().map(AttrValue::Float)
            }
            (AttrKind::Text, Value::String(s)) => Some(AttrValue::Text(s.clone())),
            (AttrKind::Text, Value::Number(n)) => Some(AttrValue::Text(n.to_string())),
            (AttrKind::Text, Value::Bool(b)) => Some(AttrValue::Text(b.to_string())),
            (AttrKind::Exec, Value::String(s)) => {
                Some(AttrValue::Exec(GenericWorkflowExec::from_uri(s.clone(), false)))
            }
            (AttrKind::Map, Value::Object(map)) => Some(AttrValue::Map(
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )),
            _ => None,
        };
        converted.map(Some).ok_or_else(|| GraphError::AttributeType {
            attribute: attr.config_key().to_string(),
            expected: kind.to_string(),
            found: value.to_string(),
        })
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Numeric comparison; non-numeric values never exceed anything.
    pub fn exceeds(&self, other: &AttrValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }

    /// Numeric addition; `None` when either side is not a number.
    pub fn checked_add(&self, other: &AttrValue) -> Option<AttrValue> {
        match (self, other) {
            (AttrValue::Int(a), AttrValue::Int(b)) => a.checked_add(*b).map(AttrValue::Int),
            _ => Some(AttrValue::Float(self.as_f64()? + other.as_f64()?)),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Int(i) => write!(f, "{}", i),
            AttrValue::Float(x) => write!(f, "{}", x),
            AttrValue::Text(s) => f.write_str(s),
            AttrValue::Exec(exec) => f.write_str(&exec.src_uri),
            AttrValue::Map(map) => write!(f, "{:?}", map),
        }
    }
}
