use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrandError {
    // Graph validation errors
    #[error("duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("edge references unknown step: {0}")]
    UnknownStep(String),

    #[error("cycle detected in workflow graph (excluding loop edges)")]
    CycleDetected,

    // Step errors
    #[error("step {step_id}: {source}")]
    Step {
        step_id: String,
        #[source]
        source: Box<StrandError>,
    },

    #[error("missing required config: {key}")]
    MissingConfig { key: String },

    #[error("invalid step config: {0}")]
    InvalidConfig(String),

    #[error("missing input (expected state key {0})")]
    MissingInput(String),

    #[error("no data to output")]
    NoData,

    #[error("exceeded max turns ({0})")]
    MaxTurnsExceeded(usize),

    #[error("turn {turn}: {source}")]
    Turn {
        turn: usize,
        #[source]
        source: Box<StrandError>,
    },

    #[error("remote agent {0} reported failure")]
    DelegateFailed(String),

    // Model provider errors
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("invalid model id {0:?}: expected format 'provider/model'")]
    InvalidModelId(String),

    #[error("model request failed: {0}")]
    ModelRequest(String),

    // Tool errors
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("tool input validation failed: {0}")]
    ToolValidation(String),

    // Delegation protocol errors
    #[error("a2a error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    // Run control
    #[error("run cancelled")]
    Cancelled,

    #[error("admission refused: {0}")]
    AdmissionClosed(String),

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StrandError {
    /// Wrap this error with the id of the step that produced it.
    pub fn in_step(self, step_id: impl Into<String>) -> Self {
        StrandError::Step {
            step_id: step_id.into(),
            source: Box::new(self),
        }
    }

    /// Wrap this error with the reasoner turn that produced it.
    pub fn in_turn(self, turn: usize) -> Self {
        StrandError::Turn {
            turn,
            source: Box::new(self),
        }
    }

    /// Strip `Step`/`Turn` wrappers and return the originating error.
    pub fn root(&self) -> &StrandError {
        match self {
            StrandError::Step { source, .. } | StrandError::Turn { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, StrandError>;
