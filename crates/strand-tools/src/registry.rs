use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use strand_core::error::{Result, StrandError};
use strand_core::traits::{Tool, ToolContext};
use strand_core::types::ToolDefinition;

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Upper bound applied to every tool's own timeout.
    timeout_cap_secs: Option<u64>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout_cap_secs: None,
        }
    }

    /// Cap every tool's timeout at `secs`.
    pub fn with_timeout_cap(mut self, secs: u64) -> Self {
        self.timeout_cap_secs = Some(secs);
        self
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Description and parameter schema of one tool.
    pub fn describe(&self, name: &str) -> Result<ToolDefinition> {
        let tool = self
            .get(name)
            .ok_or_else(|| StrandError::ToolNotFound(name.to_string()))?;
        Ok(ToolDefinition {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
        })
    }

    /// Definitions for the named tools, in the given order.
    pub fn definitions_for(&self, names: &[String]) -> Result<Vec<ToolDefinition>> {
        names.iter().map(|n| self.describe(n)).collect()
    }

    fn effective_timeout(&self, tool: &dyn Tool) -> u64 {
        match self.timeout_cap_secs {
            Some(cap) => tool.timeout_secs().min(cap),
            None => tool.timeout_secs(),
        }
    }

    /// Resolve a tool and its effective timeout. The result runs without
    /// borrowing the registry.
    pub fn prepare(&self, name: &str) -> Result<PreparedTool> {
        let tool = self
            .get(name)
            .ok_or_else(|| StrandError::ToolNotFound(name.to_string()))?;
        let timeout_secs = self.effective_timeout(tool.as_ref());
        Ok(PreparedTool { tool, timeout_secs })
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<String> {
        self.prepare(name)?.execute(input, ctx).await
    }

    /// Create a registry with all built-in tools registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::builtin::http::HttpRequestTool);
        registry.register(crate::builtin::time::CurrentTimeTool);
        registry
    }
}

/// A registered tool bound to its effective timeout.
#[derive(Clone)]
pub struct PreparedTool {
    tool: Arc<dyn Tool>,
    timeout_secs: u64,
}

impl PreparedTool {
    pub fn name(&self) -> &str {
        self.tool.name()
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub async fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> Result<String> {
        debug!(tool = %self.name(), step_id = %ctx.step_id, timeout_secs = self.timeout_secs, "Executing tool");

        match tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            self.tool.execute(input, ctx),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StrandError::ToolTimeout {
                tool: self.name().to_string(),
                timeout_secs: self.timeout_secs,
            }),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
