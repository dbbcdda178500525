use crate::error::GraphError;
use crate::file::GenericWorkflowFile;
use crate::job::GenericWorkflowJob;
use indexmap::IndexMap;
use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;

/// DAG of jobs plus the files they read and write.
///
/// Job-to-job ordering lives in a petgraph graph. Job-to-file edges are kept
/// in side tables keyed by job name so that a final job living outside the
/// graph can still declare inputs.
#[derive(Debug, Clone, Default)]
pub struct GenericWorkflow {
    name: String,
    graph: DiGraph<String, ()>,
    node_map: IndexMap<String, NodeIndex>,
    jobs: IndexMap<String, GenericWorkflowJob>,
    files: IndexMap<String, GenericWorkflowFile>,
    job_inputs: IndexMap<String, Vec<String>>,
    job_outputs: IndexMap<String, Vec<String>>,
    final_job: Option<GenericWorkflowJob>,
    run_attrs: IndexMap<String, String>,
}

impl GenericWorkflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of jobs in the graph (the unconditional final job is not counted).
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn add_job(&mut self, job: GenericWorkflowJob) -> Result<(), GraphError> {
        if self.jobs.contains_key(&job.name) {
            return Err(GraphError::DuplicateJob(job.name));
        }
        let index = self.graph.add_node(job.name.clone());
        self.node_map.insert(job.name.clone(), index);
        self.jobs.insert(job.name.clone(), job);
        Ok(())
    }

    pub fn get_job(&self, name: &str) -> Option<&GenericWorkflowJob> {
        self.jobs.get(name)
    }

    pub fn get_job_mut(&mut self, name: &str) -> Option<&mut GenericWorkflowJob> {
        self.jobs.get_mut(name)
    }

    /// Jobs in insertion order.
    pub fn jobs(&self) -> impl Iterator<Item = &GenericWorkflowJob> {
        self.jobs.values()
    }

    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    /// Add `parent -> child` edges for every pair, refusing edges that close a cycle.
    pub fn add_job_relationships<P, C>(&mut self, parents: P, children: C) -> Result<(), GraphError>
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let children: Vec<String> = children
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .collect();
        for parent in parents {
            let parent = parent.as_ref();
            let from = self.index_of(parent)?;
            for child in &children {
                let to = self.index_of(child)?;
                if from == to || has_path_connecting(&self.graph, to, from, None) {
                    return Err(GraphError::Cycle {
                        parent: parent.to_string(),
                        child: child.clone(),
                    });
                }
                self.graph.update_edge(from, to, ());
            }
        }
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<NodeIndex, GraphError> {
        self.node_map
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownJob(name.to_string()))
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(index) = self.node_map.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self
            .graph
            .neighbors_directed(*index, direction)
            .map(|n| self.graph[n].as_str())
            .collect();
        names.sort_by_key(|n| self.node_map.get_index_of(*n));
        names
    }

    pub fn predecessors(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    pub fn successors(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Jobs with no incoming edges, in insertion order.
    pub fn sources(&self) -> Vec<String> {
        self.endpoints(Direction::Incoming)
    }

    /// Jobs with no outgoing edges, in insertion order.
    pub fn sinks(&self) -> Vec<String> {
        self.endpoints(Direction::Outgoing)
    }

    fn endpoints(&self, direction: Direction) -> Vec<String> {
        self.node_map
            .iter()
            .filter(|(_, index)| {
                self.graph
                    .neighbors_directed(**index, direction)
                    .next()
                    .is_none()
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// All `(parent, child)` edges.
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges: Vec<(String, String)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].clone(), self.graph[b].clone()))
            .collect();
        edges.sort();
        edges
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// Register a file. The first registration of a name wins.
    pub fn add_file(&mut self, file: GenericWorkflowFile) {
        self.files.entry(file.name().to_string()).or_insert(file);
    }

    pub fn get_file(&self, name: &str) -> Option<&GenericWorkflowFile> {
        self.files.get(name)
    }

    pub fn files(&self) -> impl Iterator<Item = &GenericWorkflowFile> {
        self.files.values()
    }

    pub fn add_job_inputs<I>(&mut self, job_name: &str, files: I)
    where
        I: IntoIterator<Item = GenericWorkflowFile>,
    {
        Self::attach(&mut self.files, &mut self.job_inputs, job_name, files);
    }

    pub fn add_job_outputs<I>(&mut self, job_name: &str, files: I)
    where
        I: IntoIterator<Item = GenericWorkflowFile>,
    {
        Self::attach(&mut self.files, &mut self.job_outputs, job_name, files);
    }

    fn attach<I>(
        registry: &mut IndexMap<String, GenericWorkflowFile>,
        table: &mut IndexMap<String, Vec<String>>,
        job_name: &str,
        files: I,
    ) where
        I: IntoIterator<Item = GenericWorkflowFile>,
    {
        let entry = table.entry(job_name.to_string()).or_default();
        for file in files {
            let name = file.name().to_string();
            registry.entry(name.clone()).or_insert(file);
            if !entry.contains(&name) {
                entry.push(name);
            }
        }
    }

    pub fn get_job_inputs(&self, job_name: &str) -> Vec<&GenericWorkflowFile> {
        self.lookup_files(&self.job_inputs, job_name)
    }

    pub fn get_job_outputs(&self, job_name: &str) -> Vec<&GenericWorkflowFile> {
        self.lookup_files(&self.job_outputs, job_name)
    }

    fn lookup_files<'a>(
        &'a self,
        table: &'a IndexMap<String, Vec<String>>,
        job_name: &str,
    ) -> Vec<&'a GenericWorkflowFile> {
        table
            .get(job_name)
            .map(|names| names.iter().filter_map(|n| self.files.get(n)).collect())
            .unwrap_or_default()
    }

    /// Set the job that runs regardless of upstream outcome.
    pub fn add_final(&mut self, job: GenericWorkflowJob) {
        self.final_job = Some(job);
    }

    pub fn get_final(&self) -> Option<&GenericWorkflowJob> {
        self.final_job.as_ref()
    }

    /// Jobs in the graph followed by the unconditional final job, if any.
    pub fn all_jobs(&self) -> impl Iterator<Item = &GenericWorkflowJob> {
        self.jobs.values().chain(self.final_job.iter())
    }

    pub fn add_run_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.run_attrs.insert(key.into(), value.into());
    }

    pub fn run_attrs(&self) -> &IndexMap<String, String> {
        &self.run_attrs
    }

    /// Merge `source` in front of this workflow: every sink of `source`
    /// becomes a parent of every current source job.
    pub fn add_workflow_source(&mut self, source: GenericWorkflow) -> Result<(), GraphError> {
        let current_sources = self.sources();
        let source_sinks = source.sinks();
        let source_edges = source.edges();

        for file in source.files.into_values() {
            self.add_file(file);
        }
        for job in source.jobs.into_values() {
            self.add_job(job)?;
        }
        for (job, names) in source.job_inputs {
            let files: Vec<GenericWorkflowFile> =
                names.iter().filter_map(|n| self.files.get(n).cloned()).collect();
            self.add_job_inputs(&job, files);
        }
        for (job, names) in source.job_outputs {
            let files: Vec<GenericWorkflowFile> =
                names.iter().filter_map(|n| self.files.get(n).cloned()).collect();
            self.add_job_outputs(&job, files);
        }
        for (parent, child) in source_edges {
            self.add_job_relationships([parent], [child])?;
        }
        self.add_job_relationships(&source_sinks, &current_sources)?;
        Ok(())
    }

    /// Serializable view of the whole workflow.
    pub fn snapshot(&self) -> WorkflowSnapshot<'_> {
        WorkflowSnapshot {
            name: &self.name,
            jobs: self.jobs.values().collect(),
            edges: self.edges(),
            files: self.files.values().collect(),
            job_inputs: &self.job_inputs,
            job_outputs: &self.job_outputs,
            final_job: self.final_job.as_ref(),
            run_attrs: &self.run_attrs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WorkflowSnapshot<'a> {
    pub name: &'a str,
    pub jobs: Vec<&'a GenericWorkflowJob>,
    pub edges: Vec<(String, String)>,
    pub files: Vec<&'a GenericWorkflowFile>,
    pub job_inputs: &'a IndexMap<String, Vec<String>>,
    pub job_outputs: &'a IndexMap<String, Vec<String>>,
    pub final_job: Option<&'a GenericWorkflowJob>,
    pub run_attrs: &'a IndexMap<String, String>,
}
