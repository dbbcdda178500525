use super::{LintResult, LintSeverity, WorkflowLintRule};
use crate::core::config::formatter::{self, file_marker, Segment};
use genflow_types::{AttrValue, GenericWorkflow, GenericWorkflowJob, JobAttribute, MergeClass};
use std::collections::{BTreeMap, HashSet};

pub fn built_in_rules() -> Vec<Box<dyn WorkflowLintRule>> {
    vec![
        Box::new(AcyclicRule),
        Box::new(FileReferenceRule),
        Box::new(UnresolvedPlaceholderRule),
        Box::new(LabelConsistencyRule),
    ]
}

struct AcyclicRule;

impl WorkflowLintRule for AcyclicRule {
    fn validate(&self, workflow: &GenericWorkflow) -> Vec<LintResult> {
        if workflow.is_acyclic() {
            return Vec::new();
        }
        vec![LintResult::new(
            "GWF-LINT-001",
            LintSeverity::Error,
            format!("workflow '{}' contains a dependency cycle", workflow.name()),
            Some(workflow.name().to_string()),
            Some("check cluster definitions for tasks that feed each other".to_string()),
        )]
    }
}

/// Files named in a command line must be attached to the job.
struct FileReferenceRule;

impl WorkflowLintRule for FileReferenceRule {
    fn validate(&self, workflow: &GenericWorkflow) -> Vec<LintResult> {
        let mut out = Vec::new();
        for job in workflow.all_jobs() {
            let Some(arguments) = job.arguments.as_deref() else {
                continue;
            };
            let attached: HashSet<&str> = workflow
                .get_job_inputs(&job.name)
                .into_iter()
                .chain(workflow.get_job_outputs(&job.name))
                .map(|file| file.name())
                .collect();

            let mut referenced: Vec<String> = file_marker()
                .captures_iter(arguments)
                .map(|caps| caps[1].to_string())
                .collect();
            referenced.extend(
                field_names(arguments)
                    .into_iter()
                    .filter(|name| workflow.get_file(name).is_some()),
            );

            for name in referenced {
                if !attached.contains(name.as_str()) {
                    out.push(LintResult::new(
                        "GWF-LINT-002",
                        LintSeverity::Error,
                        format!(
                            "job '{}' references file '{}' that is neither an input nor an output",
                            job.name, name
                        ),
                        Some(job.name.clone()),
                        Some("attach the file to the job before building its command".to_string()),
                    ));
                }
            }
        }
        out
    }
}

struct UnresolvedPlaceholderRule;

impl WorkflowLintRule for UnresolvedPlaceholderRule {
    fn validate(&self, workflow: &GenericWorkflow) -> Vec<LintResult> {
        let mut out = Vec::new();
        for job in workflow.all_jobs() {
            let Some(arguments) = job.arguments.as_deref() else {
                continue;
            };
            for name in field_names(arguments) {
                if job.cmdvals.contains_key(&name) || workflow.get_file(&name).is_some() {
                    continue;
                }
                out.push(LintResult::new(
                    "GWF-LINT-003",
                    LintSeverity::Error,
                    format!("job '{}' has no value for placeholder {{{}}}", job.name, name),
                    Some(job.name.clone()),
                    Some(format!("define '{}' in the configuration", name)),
                ));
            }
        }
        out
    }
}

/// Jobs sharing a label should agree on their universal attributes.
struct LabelConsistencyRule;

impl WorkflowLintRule for LabelConsistencyRule {
    fn validate(&self, workflow: &GenericWorkflow) -> Vec<LintResult> {
        let mut by_label: BTreeMap<&str, Vec<&GenericWorkflowJob>> = BTreeMap::new();
        for job in workflow.jobs() {
            by_label.entry(job.label.as_str()).or_default().push(job);
        }

        let mut out = Vec::new();
        for (label, jobs) in by_label {
            let Some((first, rest)) = jobs.split_first() else {
                continue;
            };
            for attr in JobAttribute::of_class(MergeClass::Universal)
                .filter(|attr| *attr != JobAttribute::Arguments)
            {
                let expected = first.get(attr);
                if let Some(other) = rest.iter().find(|job| job.get(attr) != expected) {
                    out.push(LintResult::new(
                        "GWF-LINT-004",
                        LintSeverity::Warning,
                        format!(
                            "jobs labelled '{}' disagree on {}: '{}' has {}, '{}' has {}",
                            label,
                            attr,
                            first.name,
                            describe(expected.as_ref()),
                            other.name,
                            describe(other.get(attr).as_ref())
                        ),
                        Some(label.to_string()),
                        None,
                    ));
                }
            }
        }
        out
    }
}

fn describe(value: Option<&AttrValue>) -> String {
    value.map_or_else(|| "no value".to_string(), |v| format!("'{}'", v))
}

/// Names of `{name}` fields; text that does not parse as a template has none.
fn field_names(text: &str) -> Vec<String> {
    formatter::parse_template(text)
        .map(|segments| {
            segments
                .into_iter()
                .filter_map(|segment| match segment {
                    Segment::Field { name, .. } => Some(name.to_string()),
                    Segment::Literal(_) => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
