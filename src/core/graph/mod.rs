#![allow(clippy::result_large_err)]

//! Abstract computation graph consumed by the workflow assembler.
//!
//! Execution units ("work nodes") carry a task label and a data id, and are
//! connected through the artifacts they read and write. Where the graph comes
//! from is not this module's concern; [`InMemoryGraph`] reads a JSON document.

pub mod clustering;
pub mod memory;

pub use clustering::{cluster_units, dimension_clustering, single_unit_clustering, Cluster, ClusteredGraph};
pub use memory::InMemoryGraph;

use crate::core::config::formatter::value_to_string;
use crate::core::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reference to one data artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRef {
    pub name: String,
    #[serde(default)]
    pub data_id: BTreeMap<String, Value>,
}

impl ArtifactRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_id: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data_id.insert(key.to_string(), value.into());
        self
    }

    /// Stable identity: `name[k1=v1,k2=v2]` with keys sorted, or just `name`.
    pub fn address(&self) -> String {
        if self.data_id.is_empty() {
            return self.name.clone();
        }
        let params: Vec<String> = self
            .data_id
            .iter()
            .map(|(k, v)| format!("{}={}", k, value_to_string(v)))
            .collect();
        format!("{}[{}]", self.name, params.join(","))
    }
}

/// One execution unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkNode {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub data_id: BTreeMap<String, Value>,
    #[serde(default)]
    pub inputs: Vec<ArtifactRef>,
    #[serde(default)]
    pub outputs: Vec<ArtifactRef>,
}

impl WorkNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data_id: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_data_id(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data_id.insert(key.to_string(), value.into());
        self
    }

    pub fn reads(mut self, artifact: ArtifactRef) -> Self {
        self.inputs.push(artifact);
        self
    }

    pub fn writes(mut self, artifact: ArtifactRef) -> Self {
        self.outputs.push(artifact);
        self
    }
}

/// Read access to a computation graph.
pub trait ComputationGraph {
    fn graph_id(&self) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Units in graph order.
    fn units(&self) -> Vec<&WorkNode>;

    /// Distinct task labels in pipeline order.
    fn task_labels(&self) -> Vec<String>;

    /// A unit standing in for every unit of `label`, used by init jobs.
    fn representative_unit(&self, label: &str) -> Option<&WorkNode> {
        self.units().into_iter().find(|unit| unit.label == label)
    }

    fn unit(&self, id: &str) -> Option<&WorkNode>;

    /// Serialized sub-graph containing only `ids`.
    fn subset(&self, ids: &[String]) -> Result<Vec<u8>, AppError>;
}

/// Producer to consumer pairs between units, derived from artifact addresses.
pub fn unit_edges(graph: &dyn ComputationGraph) -> Vec<(String, String)> {
    let mut producers: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for unit in graph.units() {
        for output in &unit.outputs {
            producers.entry(output.address()).or_default().push(&unit.id);
        }
    }
    let mut edges = Vec::new();
    for unit in graph.units() {
        for input in &unit.inputs {
            for producer in producers.get(&input.address()).into_iter().flatten() {
                let edge = (producer.to_string(), unit.id.clone());
                if *producer != unit.id && !edges.contains(&edge) {
                    edges.push(edge);
                }
            }
        }
    }
    edges
}
