//! Static checks run before a workflow is executed.

use std::fmt;

use strand_core::error::Result;
use strand_core::workflow::{StepKind, WorkflowDefinition};
use strand_llm::registry::split_model_id;
use strand_llm::ProviderRegistry;
use strand_tools::ToolRegistry;

use crate::graph::Graph;

/// A problem that would make a step fail at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub step_id: Option<String>,
    pub message: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step_id {
            Some(id) => write!(f, "{}: {}", id, self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    /// Execution order of the steps.
    pub order: Vec<String>,
    /// Intake steps, each of which needs an input value.
    pub intake_steps: Vec<String>,
    pub problems: Vec<Problem>,
}

impl Report {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

fn config_str<'a>(config: &'a serde_json::Map<String, serde_json::Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| config.get(*k).and_then(|v| v.as_str()))
        .filter(|s| !s.trim().is_empty())
}

/// Build the graph (graph errors are returned as `Err`) and check each
/// step against the registries.
pub fn validate(
    workflow: &WorkflowDefinition,
    providers: &ProviderRegistry,
    tools: &ToolRegistry,
) -> Result<Report> {
    let graph = Graph::build(workflow)?;
    let mut problems = Vec::new();
    let mut problem = |step_id: Option<&str>, message: String| {
        problems.push(Problem {
            step_id: step_id.map(str::to_string),
            message,
        })
    };

    let mut intake_steps = Vec::new();
    for id in graph.topological_order() {
        let Some(step) = graph.node(id) else { continue };
        match step.kind {
            StepKind::Intake => intake_steps.push(id.clone()),
            StepKind::Aggregator => {}
            StepKind::Reasoner => match config_str(&step.config, &["model"]) {
                None => problem(Some(id), "missing required config: model".into()),
                Some(model) => match split_model_id(model) {
                    Err(e) => problem(Some(id), e.to_string()),
                    Ok((provider, _)) if !providers.contains(provider) => {
                        problem(Some(id), format!("unknown provider: {}", provider))
                    }
                    Ok(_) => {}
                },
            },
            StepKind::Tool => match config_str(&step.config, &["tool"]) {
                None => problem(Some(id), "missing required config: tool".into()),
                Some(name) if tools.get(name).is_none() => {
                    problem(Some(id), format!("tool not found: {}", name))
                }
                Some(_) => {}
            },
            StepKind::Delegate => {
                if config_str(&step.config, &["endpoint_url", "endpointUrl"]).is_none() {
                    problem(Some(id), "missing required config: endpoint_url".into());
                }
            }
        }
    }

    for edge in graph.back_edges() {
        if graph.loop_body(edge).is_empty() {
            problem(
                None,
                format!(
                    "loop edge {} -> {} does not close a cycle and will never repeat",
                    edge.from, edge.to
                ),
            );
        }
        if edge.loop_spec.as_ref().is_some_and(|s| s.max_iterations == 0) {
            problem(
                None,
                format!("loop edge {} -> {} has maxIterations 0; treated as 1", edge.from, edge.to),
            );
        }
    }

    Ok(Report {
        order: graph.topological_order().to_vec(),
        intake_steps,
        problems,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_core::workflow::{EdgeDefinition, StepDefinition};
    use strand_core::StrandError;
    use strand_llm::OpenAiProvider;

    fn registries() -> (ProviderRegistry, ToolRegistry) {
        let mut providers = ProviderRegistry::new();
        providers.register(OpenAiProvider::new("openai", "http://localhost:9/v1"));
        (providers, ToolRegistry::with_builtins())
    }

    #[test]
    fn clean_workflow() {
        let (providers, tools) = registries();
        let wf = WorkflowDefinition::new("ok")
            .step(StepDefinition::new("topic", StepKind::Intake))
            .step(StepDefinition::new("draft", StepKind::Reasoner).with("model", json!("openai/gpt-4o")))
            .step(StepDefinition::new("clock", StepKind::Tool).with("tool", json!("current_time")))
            .edge(EdgeDefinition::new("topic", "draft"))
            .edge(EdgeDefinition::looping("draft", "draft", 3, "draft contains \"DONE\""));
        let report = validate(&wf, &providers, &tools).unwrap();
        assert!(report.is_ok(), "{:?}", report.problems);
        assert_eq!(report.order, vec!["clock", "topic", "draft"]);
        assert_eq!(report.intake_steps, vec!["topic"]);
    }

    #[test]
    fn reports_step_problems() {
        let (providers, tools) = registries();
        let wf = WorkflowDefinition::new("bad")
            .step(StepDefinition::new("a", StepKind::Reasoner).with("model", json!("anthropic/claude")))
            .step(StepDefinition::new("b", StepKind::Reasoner).with("model", json!("gpt-4o")))
            .step(StepDefinition::new("c", StepKind::Delegate))
            .step(StepDefinition::new("d", StepKind::Tool).with("tool", json!("shell")))
            .edge(EdgeDefinition::looping("a", "b", 2, ""));
        let report = validate(&wf, &providers, &tools).unwrap();
        let messages: Vec<String> = report.problems.iter().map(ToString::to_string).collect();
        assert_eq!(messages.len(), 5, "{messages:?}");
        assert!(messages.contains(&"a: unknown provider: anthropic".to_string()));
        assert!(messages.iter().any(|m| m.starts_with("b: invalid model id")));
        assert!(messages.contains(&"c: missing required config: endpoint_url".to_string()));
        assert!(messages.contains(&"d: tool not found: shell".to_string()));
        assert!(messages.iter().any(|m| m.contains("does not close a cycle")));
    }

    #[test]
    fn graph_errors_are_fatal() {
        let (providers, tools) = registries();
        let wf = WorkflowDefinition::new("cyclic")
            .step(StepDefinition::new("a", StepKind::Aggregator))
            .step(StepDefinition::new("b", StepKind::Aggregator))
            .edge(EdgeDefinition::new("a", "b"))
            .edge(EdgeDefinition::new("b", "a"));
        assert!(matches!(
            validate(&wf, &providers, &tools),
            Err(StrandError::CycleDetected)
        ));
    }
}
