use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrandError};

/// Kind of a workflow step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Intake,
    Reasoner,
    Tool,
    Aggregator,
    Delegate,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Reasoner => "reasoner",
            Self::Tool => "tool",
            Self::Aggregator => "aggregator",
            Self::Delegate => "delegate",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed unit of work. Immutable during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Author-supplied, kind-specific settings.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl StepDefinition {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            config: serde_json::Map::new(),
        }
    }

    /// Set a config entry.
    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// Bounded loop descriptor carried by a back-edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopSpec {
    #[serde(rename = "maxIterations", alias = "max_iterations")]
    pub max_iterations: usize,
    #[serde(rename = "exitWhen", alias = "exit_when", default)]
    pub exit_when: String,
}

/// Directed edge between two steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
    #[serde(rename = "loop", default, skip_serializing_if = "Option::is_none")]
    pub loop_spec: Option<LoopSpec>,
}

impl EdgeDefinition {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            loop_spec: None,
        }
    }

    /// Create a back-edge re-entering `to` until `exit_when` holds.
    pub fn looping(
        from: impl Into<String>,
        to: impl Into<String>,
        max_iterations: usize,
        exit_when: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            loop_spec: Some(LoopSpec {
                max_iterations,
                exit_when: exit_when.into(),
            }),
        }
    }

    pub fn is_back_edge(&self) -> bool {
        self.loop_spec.is_some()
    }
}

/// A workflow as authored: steps plus edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub nodes: Vec<StepDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn step(mut self, step: StepDefinition) -> Self {
        self.nodes.push(step);
        self
    }

    pub fn edge(mut self, edge: EdgeDefinition) -> Self {
        self.edges.push(edge);
        self
    }

    /// Load a workflow from a `.json` or `.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StrandError::ConfigNotFound(path.display().to_string()))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| StrandError::Config(e.to_string()))
            }
            _ => Ok(serde_json::from_str(&content)?),
        }
    }
}
