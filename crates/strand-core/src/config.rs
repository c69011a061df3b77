use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrandError};

/// Top-level strand configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model providers keyed by the name used in `provider/model` ids.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub delegate: DelegateConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Wire protocol. Only `openai` (any OpenAI-compatible backend) is supported.
    #[serde(default = "default_provider_kind")]
    pub kind: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

fn default_provider_kind() -> String { "openai".to_string() }

/// Step execution defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Reasoner turn budget when the step does not set `max_turns`.
    #[serde(default = "default_max_turns")]
    pub default_max_turns: usize,
    /// Minimum turn budget for a reasoner that has tools.
    #[serde(default = "default_tool_turns_floor")]
    pub tool_turns_floor: usize,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_turns: default_max_turns(),
            tool_turns_floor: default_tool_turns_floor(),
            tool_timeout_secs: default_tool_timeout(),
        }
    }
}

fn default_max_turns() -> usize { 1 }
fn default_tool_turns_floor() -> usize { 10 }
fn default_tool_timeout() -> u64 { 30 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateConfig {
    #[serde(default = "default_delegate_timeout")]
    pub timeout_secs: u64,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_delegate_timeout(),
        }
    }
}

fn default_delegate_timeout() -> u64 { 120 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// How long a finished run's event buffer stays available for replay.
    #[serde(default = "default_publisher_ttl")]
    pub ttl_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_publisher_ttl(),
        }
    }
}

fn default_publisher_ttl() -> u64 { 600 }

/// Whole-run retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }
fn default_backoff_factor() -> f64 { 2.0 }

/// Concurrent run limits. Zero falls back to the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_global_max")]
    pub global_max: usize,
    #[serde(default = "default_per_workflow")]
    pub per_workflow: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            global_max: default_global_max(),
            per_workflow: default_per_workflow(),
        }
    }
}

impl AdmissionConfig {
    pub fn effective_global_max(&self) -> usize {
        if self.global_max == 0 { default_global_max() } else { self.global_max }
    }

    pub fn effective_per_workflow(&self) -> usize {
        if self.per_workflow == 0 { default_per_workflow() } else { self.per_workflow }
    }
}

fn default_global_max() -> usize { 10 }
fn default_per_workflow() -> usize { 3 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StrandError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| StrandError::Config(e.to_string()))
    }

    /// Load `path` if given; otherwise `strand.toml` when present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let fallback = Path::new("strand.toml");
                if fallback.exists() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Expand `${ENV_VAR}` patterns in a string. Unset variables are kept verbatim.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' || chars.peek() != Some(&'{') {
            result.push(c);
            continue;
        }
        chars.next();
        let name: String = chars.by_ref().take_while(|&c| c != '}').collect();
        match std::env::var(&name) {
            Ok(val) => result.push_str(&val),
            Err(_) => {
                result.push_str("${");
                result.push_str(&name);
                result.push('}');
            }
        }
    }
    result
}
