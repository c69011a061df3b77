//! Step executors: one per step kind, dispatched by [`StepExecutors`].
//!
//! Each executor turns a step definition plus a shared borrow of the run
//! state into a value or an error. Progress is reported through the
//! [`StepContext`] emitter; the runner owns every state write.

pub mod aggregator;
pub mod delegate;
pub mod intake;
pub mod reasoner;
pub mod tool;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use strand_a2a::DelegationClient;
use strand_core::config::EngineConfig;
use strand_core::error::{Result, StrandError};
use strand_core::traits::ToolContext;
use strand_core::types::SessionId;
use strand_core::workflow::{StepDefinition, StepKind};
use strand_llm::ProviderRegistry;
use strand_tools::ToolRegistry;

use crate::events::EventEmitter;
use crate::state::RunState;

/// Per-invocation context handed to an executor.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub session_id: SessionId,
    pub step_id: String,
    pub events: EventEmitter,
    pub cancel: CancellationToken,
}

impl StepContext {
    pub fn tool_context(&self) -> ToolContext {
        ToolContext::new(self.session_id.clone(), self.step_id.clone())
    }
}

/// Dispatch table over the five step kinds, holding the shared registries.
#[derive(Clone)]
pub struct StepExecutors {
    providers: Arc<RwLock<ProviderRegistry>>,
    tools: Arc<RwLock<ToolRegistry>>,
    delegation: Arc<DelegationClient>,
    limits: EngineConfig,
}

impl StepExecutors {
    pub fn new(
        providers: Arc<RwLock<ProviderRegistry>>,
        tools: Arc<RwLock<ToolRegistry>>,
        delegation: Arc<DelegationClient>,
    ) -> Self {
        Self {
            providers,
            tools,
            delegation,
            limits: EngineConfig::default(),
        }
    }

    pub fn with_limits(mut self, limits: EngineConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn providers(&self) -> &Arc<RwLock<ProviderRegistry>> {
        &self.providers
    }

    pub fn tools(&self) -> &Arc<RwLock<ToolRegistry>> {
        &self.tools
    }

    /// Run one step against the current state.
    pub async fn execute(
        &self,
        step: &StepDefinition,
        state: &RunState,
        ctx: &StepContext,
    ) -> Result<serde_json::Value> {
        match step.kind {
            StepKind::Intake => intake::execute(step, state),
            StepKind::Aggregator => aggregator::execute(step, state),
            StepKind::Tool => tool::execute(step, state, &self.tools, ctx).await,
            StepKind::Reasoner => {
                reasoner::execute(step, state, &self.providers, &self.tools, &self.limits, ctx)
                    .await
            }
            StepKind::Delegate => delegate::execute(step, state, &self.delegation, ctx).await,
        }
    }
}

/// Deserialize a step's config map into its typed form.
pub(crate) fn parse_config<T: DeserializeOwned>(step: &StepDefinition) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(step.config.clone()))
        .map_err(|e| StrandError::InvalidConfig(format!("{} step: {}", step.kind, e)))
}

/// Require a non-empty string setting.
pub(crate) fn required(value: Option<String>, key: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| StrandError::MissingConfig { key: key.to_string() })
}

/// Interpret text handed to a tool: a JSON object or array passes through
/// structurally, anything else is a plain string.
pub(crate) fn tool_input(raw: &str) -> serde_json::Value {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            return value;
        }
    }
    serde_json::Value::String(raw.to_string())
}
