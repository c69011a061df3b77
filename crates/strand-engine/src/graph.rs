//! Workflow graph: validated view over steps and edges with a deterministic
//! execution order.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use strand_core::error::{Result, StrandError};
use strand_core::workflow::{EdgeDefinition, StepDefinition, WorkflowDefinition};

/// Read-only graph built once per run.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: HashMap<String, StepDefinition>,
    children: HashMap<String, Vec<String>>,
    parents: HashMap<String, Vec<String>>,
    edges: HashMap<(String, String), EdgeDefinition>,
    back_edges: Vec<EdgeDefinition>,
    order: Vec<String>,
}

impl Graph {
    /// Validate a workflow and compute its topological order.
    ///
    /// Fails on duplicate step ids, edges naming unknown steps, and cycles
    /// among non-loop edges. Ties in the order break by ascending id.
    pub fn build(workflow: &WorkflowDefinition) -> Result<Self> {
        let mut nodes = HashMap::with_capacity(workflow.nodes.len());
        for step in &workflow.nodes {
            if nodes.insert(step.id.clone(), step.clone()).is_some() {
                return Err(StrandError::DuplicateStep(step.id.clone()));
            }
        }

        let mut children: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut parents: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut edges = HashMap::new();
        let mut back_edges = Vec::new();

        for edge in &workflow.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !nodes.contains_key(endpoint) {
                    return Err(StrandError::UnknownStep(endpoint.clone()));
                }
            }
            edges.insert((edge.from.clone(), edge.to.clone()), edge.clone());
            if edge.is_back_edge() {
                back_edges.push(edge.clone());
                continue;
            }
            children
                .entry(edge.from.clone())
                .or_default()
                .insert(edge.to.clone());
            parents
                .entry(edge.to.clone())
                .or_default()
                .insert(edge.from.clone());
        }

        let order = topological_order(&nodes, &children, &parents)?;
        back_edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));

        debug!(
            workflow = %workflow.name,
            steps = order.len(),
            loops = back_edges.len(),
            "Built workflow graph"
        );

        Ok(Self {
            nodes,
            children: into_sorted_lists(children),
            parents: into_sorted_lists(parents),
            edges,
            back_edges,
            order,
        })
    }

    /// Step ids in execution order.
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    pub fn node(&self, id: &str) -> Option<&StepDefinition> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct successors over non-loop edges, sorted.
    pub fn children(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct predecessors over non-loop edges, sorted.
    pub fn parents(&self, id: &str) -> &[String] {
        self.parents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Steps without non-loop parents, in execution order.
    pub fn roots(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| self.parents(id).is_empty())
            .map(String::as_str)
            .collect()
    }

    /// Look up the edge `from -> to` (loop or not).
    pub fn edge(&self, from: &str, to: &str) -> Option<&EdgeDefinition> {
        self.edges.get(&(from.to_string(), to.to_string()))
    }

    /// Loop edges, sorted by `(from, to)`.
    pub fn back_edges(&self) -> &[EdgeDefinition] {
        &self.back_edges
    }

    /// Steps re-executed by a loop edge: every step on a forward path from
    /// the edge's `to` to its `from`, endpoints included, in execution order.
    /// Empty when `to` cannot reach `from`.
    pub fn loop_body(&self, edge: &EdgeDefinition) -> Vec<String> {
        let descendants = self.reachable(&edge.to, |id| self.children(id));
        let ancestors = self.reachable(&edge.from, |id| self.parents(id));
        self.order
            .iter()
            .filter(|id| descendants.contains(id.as_str()) && ancestors.contains(id.as_str()))
            .cloned()
            .collect()
    }

    /// `start` plus every step reachable from it via `next`.
    fn reachable<'a, F>(&'a self, start: &'a str, next: F) -> HashSet<&'a str>
    where
        F: Fn(&str) -> &'a [String],
    {
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if seen.insert(id) {
                stack.extend(next(id).iter().map(String::as_str));
            }
        }
        seen
    }
}

/// Kahn's algorithm; the ready set is kept ordered so the smallest id pops first.
fn topological_order(
    nodes: &HashMap<String, StepDefinition>,
    children: &HashMap<String, BTreeSet<String>>,
    parents: &HashMap<String, BTreeSet<String>>,
) -> Result<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = nodes
        .keys()
        .map(|id| (id.as_str(), parents.get(id).map_or(0, BTreeSet::len)))
        .collect();

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = ready.pop_first() {
        order.push(id.to_string());
        for child in children.get(id).into_iter().flatten() {
            if let Some(d) = in_degree.get_mut(child.as_str()) {
                *d -= 1;
                if *d == 0 {
                    ready.insert(child.as_str());
                }
            }
        }
    }

    if order.len() < nodes.len() {
        return Err(StrandError::CycleDetected);
    }
    Ok(order)
}

fn into_sorted_lists(map: HashMap<String, BTreeSet<String>>) -> HashMap<String, Vec<String>> {
    map.into_iter()
        .map(|(k, v)| (k, v.into_iter().collect()))
        .collect()
}
