#![allow(clippy::result_large_err)]

use super::{ComputationGraph, WorkNode};
use crate::core::error::{codes, AppError};
use crate::core::types::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDocument {
    graph_id: String,
    /// Pipeline order of task labels; defaults to first appearance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tasks: Vec<String>,
    units: Vec<WorkNode>,
}

/// Computation graph held entirely in memory, read from and sliced to JSON.
#[derive(Debug, Clone)]
pub struct InMemoryGraph {
    graph_id: String,
    tasks: Vec<String>,
    units: Vec<WorkNode>,
    index: HashMap<String, usize>,
}

impl InMemoryGraph {
    pub fn new(graph_id: impl Into<String>, units: Vec<WorkNode>) -> Result<Self, AppError> {
        Self::with_tasks(graph_id, Vec::new(), units)
    }

    pub fn with_tasks(
        graph_id: impl Into<String>,
        tasks: Vec<String>,
        units: Vec<WorkNode>,
    ) -> Result<Self, AppError> {
        let mut index = HashMap::with_capacity(units.len());
        for (position, unit) in units.iter().enumerate() {
            if index.insert(unit.id.clone(), position).is_some() {
                return Err(AppError::configuration(
                    codes::INVALID_SOURCE,
                    format!("duplicate unit id '{}' in computation graph", unit.id),
                )
                .with_detail("unit", unit.id.clone()));
            }
        }
        let mut tasks = tasks;
        for unit in &units {
            if !tasks.contains(&unit.label) {
                tasks.push(unit.label.clone());
            }
        }
        Ok(Self {
            graph_id: graph_id.into(),
            tasks,
            units,
            index,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self, AppError> {
        let document: GraphDocument = serde_json::from_str(text).map_err(|e| {
            AppError::configuration(
                codes::INVALID_SOURCE,
                format!("Failed to parse computation graph: {}", e),
            )
        })?;
        Self::with_tasks(document.graph_id, document.tasks, document.units)
    }

    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read computation graph {}: {}", path.display(), e),
            )
            .with_detail("path", path.display().to_string())
        })?;
        Self::from_json_str(&text).map_err(|e| e.with_detail("path", path.display().to_string()))
    }
}

impl ComputationGraph for InMemoryGraph {
    fn graph_id(&self) -> &str {
        &self.graph_id
    }

    fn len(&self) -> usize {
        self.units.len()
    }

    fn units(&self) -> Vec<&WorkNode> {
        self.units.iter().collect()
    }

    fn task_labels(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|label| self.units.iter().any(|unit| &unit.label == *label))
            .cloned()
            .collect()
    }

    fn unit(&self, id: &str) -> Option<&WorkNode> {
        self.index.get(id).map(|&position| &self.units[position])
    }

    fn subset(&self, ids: &[String]) -> Result<Vec<u8>, AppError> {
        for id in ids {
            if !self.index.contains_key(id) {
                return Err(AppError::assembly(
                    codes::GRAPH_STRUCTURE,
                    format!("unit '{}' is not in graph '{}'", id, self.graph_id),
                )
                .with_detail("unit", id.clone()));
            }
        }
        let document = GraphDocument {
            graph_id: self.graph_id.clone(),
            tasks: Vec::new(),
            units: self
                .units
                .iter()
                .filter(|unit| ids.contains(&unit.id))
                .cloned()
                .collect(),
        };
        Ok(serde_json::to_vec_pretty(&document)?)
    }
}
