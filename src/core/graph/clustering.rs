#![allow(clippy::result_large_err)]

use super::{unit_edges, ComputationGraph, WorkNode};
use crate::core::config::formatter::{self, Segment};
use crate::core::config::{ConfigStore, SearchRequest};
use crate::core::error::{codes, AppError};
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value;
use std::collections::HashMap;

/// A group of units that becomes one job.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub name: String,
    pub label: String,
    pub unit_ids: Vec<String>,
    /// Dimension values shared by every unit of the cluster.
    pub tags: IndexMap<String, String>,
}

impl Cluster {
    fn new(name: String, label: String) -> Self {
        Self {
            name,
            label,
            unit_ids: Vec::new(),
            tags: IndexMap::new(),
        }
    }
}

/// Clusters plus the dependencies between them, known to be acyclic.
#[derive(Debug, Clone, Default)]
pub struct ClusteredGraph {
    clusters: IndexMap<String, Cluster>,
    edges: Vec<(String, String)>,
}

impl ClusteredGraph {
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn get(&self, name: &str) -> Option<&Cluster> {
        self.clusters.get(name)
    }

    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    fn finish(
        clusters: IndexMap<String, Cluster>,
        owner: &HashMap<String, String>,
        graph: &dyn ComputationGraph,
    ) -> Result<Self, AppError> {
        let mut dag: DiGraph<&str, ()> = DiGraph::new();
        let nodes: HashMap<&str, NodeIndex> = clusters
            .keys()
            .map(|name| (name.as_str(), dag.add_node(name.as_str())))
            .collect();

        let mut edges = Vec::new();
        for (producer, consumer) in unit_edges(graph) {
            let (Some(from), Some(to)) = (owner.get(&producer), owner.get(&consumer)) else {
                continue;
            };
            if from == to {
                continue;
            }
            let edge = (from.clone(), to.clone());
            if !edges.contains(&edge) {
                dag.update_edge(nodes[from.as_str()], nodes[to.as_str()], ());
                edges.push(edge);
            }
        }

        if let Err(cycle) = toposort(&dag, None) {
            let name = dag[cycle.node_id()];
            return Err(AppError::assembly(
                codes::GRAPH_STRUCTURE,
                format!("cluster graph has a cycle through '{}'", name),
            )
            .with_detail("cluster", name));
        }
        Ok(Self { clusters, edges })
    }
}

/// One cluster per unit, named `<label>_<id>`.
pub fn single_unit_clustering(graph: &dyn ComputationGraph) -> Result<ClusteredGraph, AppError> {
    let mut clusters = IndexMap::new();
    let mut owner = HashMap::new();
    for unit in graph.units() {
        let name = format!("{}_{}", unit.label, unit.id);
        let mut cluster = Cluster::new(name.clone(), unit.label.clone());
        cluster.unit_ids.push(unit.id.clone());
        cluster.tags = unit
            .data_id
            .iter()
            .map(|(k, v)| (k.clone(), formatter::value_to_string(v)))
            .collect();
        owner.insert(unit.id.clone(), name.clone());
        clusters.insert(name, cluster);
    }
    ClusteredGraph::finish(clusters, &owner, graph)
}

#[derive(Debug)]
struct ClusterDefinition {
    label: String,
    tasks: Vec<String>,
    dimensions: Vec<String>,
    template: Option<String>,
}

/// Group units whose task label is listed under a `cluster.<label>` entry
/// and whose values for that entry's `dimensions` agree. Units of unlisted
/// tasks keep a cluster of their own.
pub fn dimension_clustering(
    config: &ConfigStore,
    graph: &dyn ComputationGraph,
) -> Result<ClusteredGraph, AppError> {
    let definitions = cluster_definitions(config)?;
    let mut by_task: HashMap<&str, &ClusterDefinition> = HashMap::new();
    for definition in &definitions {
        for task in &definition.tasks {
            if let Some(previous) = by_task.insert(task.as_str(), definition) {
                return Err(AppError::configuration(
                    codes::INVALID_SOURCE,
                    format!(
                        "task '{}' is listed in clusters '{}' and '{}'",
                        task, previous.label, definition.label
                    ),
                )
                .with_detail("task", task.clone()));
            }
        }
    }

    let mut clusters: IndexMap<String, Cluster> = IndexMap::new();
    let mut owner = HashMap::new();
    for unit in graph.units() {
        let (name, label, tags) = match by_task.get(unit.label.as_str()) {
            Some(definition) => {
                let tags = dimension_values(definition, unit)?;
                let suffix = cluster_suffix(definition, &tags, unit)?;
                (format!("{}_{}", definition.label, suffix), definition.label.clone(), tags)
            }
            None => {
                let tags = unit
                    .data_id
                    .iter()
                    .map(|(k, v)| (k.clone(), formatter::value_to_string(v)))
                    .collect();
                (format!("{}_{}", unit.label, unit.id), unit.label.clone(), tags)
            }
        };
        let cluster = clusters.entry(name.clone()).or_insert_with(|| {
            let mut cluster = Cluster::new(name.clone(), label);
            cluster.tags = tags;
            cluster
        });
        cluster.unit_ids.push(unit.id.clone());
        owner.insert(unit.id.clone(), name);
    }
    ClusteredGraph::finish(clusters, &owner, graph)
}

/// Dimension clustering when the `cluster` section defines any clusters,
/// one unit per cluster otherwise.
pub fn cluster_units(
    config: &ConfigStore,
    graph: &dyn ComputationGraph,
) -> Result<ClusteredGraph, AppError> {
    if cluster_definitions(config)?.is_empty() {
        single_unit_clustering(graph)
    } else {
        dimension_clustering(config, graph)
    }
}

fn cluster_definitions(config: &ConfigStore) -> Result<Vec<ClusterDefinition>, AppError> {
    let Some(section) = config.section("cluster") else {
        return Ok(Vec::new());
    };
    let mut definitions = Vec::new();
    for (label, entry) in section {
        let Some(entry) = entry.as_object() else {
            continue;
        };
        let Some(tasks) = entry.get("tasks") else {
            continue;
        };
        let tasks = string_list(tasks);
        // The cluster's own template wins over one set for the whole run.
        let template_request = SearchRequest::new()
            .with_curval("curr_cluster", label.as_str())
            .replace_vars(false)
            .expand_env_vars(false);
        if tasks.is_empty() {
            return Err(AppError::configuration(
                codes::MISSING_REQUIRED,
                format!("cluster '{}' lists no tasks", label),
            )
            .with_detail("key", format!(".cluster.{}.tasks", label)));
        }
        definitions.push(ClusterDefinition {
            label: label.clone(),
            tasks,
            dimensions: entry.get("dimensions").map(string_list).unwrap_or_default(),
            template: config.search_str("clusterTemplate", &template_request)?,
        });
    }
    Ok(definitions)
}

/// Accepts a list or a comma separated string.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(formatter::value_to_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        other => formatter::value_to_string(other)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

fn dimension_values(
    definition: &ClusterDefinition,
    unit: &WorkNode,
) -> Result<IndexMap<String, String>, AppError> {
    let mut tags = IndexMap::new();
    for dimension in &definition.dimensions {
        let Some(value) = unit.data_id.get(dimension) else {
            return Err(AppError::configuration(
                codes::MISSING_REQUIRED,
                format!(
                    "unit '{}' ({}) has no value for cluster dimension '{}'",
                    unit.id, unit.label, dimension
                ),
            )
            .with_detail("cluster", definition.label.clone())
            .with_detail("unit", unit.id.clone()));
        };
        tags.insert(dimension.clone(), formatter::value_to_string(value));
    }
    Ok(tags)
}

fn cluster_suffix(
    definition: &ClusterDefinition,
    tags: &IndexMap<String, String>,
    unit: &WorkNode,
) -> Result<String, AppError> {
    let Some(template) = &definition.template else {
        if tags.is_empty() {
            return Ok("all".to_string());
        }
        return Ok(tags.values().cloned().collect::<Vec<_>>().join("_"));
    };
    let bad_template = |reason: String| {
        AppError::configuration(
            codes::MALFORMED_TEMPLATE,
            format!("cluster template for '{}': {}", definition.label, reason),
        )
        .with_detail("key", format!(".cluster.{}.clusterTemplate", definition.label))
    };
    let segments = formatter::parse_template(template).map_err(|e| bad_template(e.to_string()))?;
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Field { name, spec, .. } => {
                let value = unit
                    .data_id
                    .get(name)
                    .ok_or_else(|| bad_template(format!("unit '{}' has no '{}'", unit.id, name)))?;
                let rendered =
                    formatter::format_value(value, spec).map_err(|e| bad_template(e.to_string()))?;
                out.push_str(&rendered);
            }
        }
    }
    Ok(out)
}
