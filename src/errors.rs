use diesel::result::Error as DieselError;

/// Errors raised by the task store and checkpoint persistence
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("Diesel error: {0}")]
    Database(#[from] DieselError),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("Serde error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by the approval gate
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// A second wait was registered while one is still pending for the task
    #[error("an approval wait is already registered for task {0}")]
    AlreadyWaiting(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reasons planner output could not be turned into a plan. Always recovered
/// by the plan builder and never surfaced as a task failure.
#[derive(Debug, thiserror::Error)]
pub enum PlanParseError {
    #[error("no JSON object found in planner output")]
    NoJsonObject,
    #[error("invalid plan JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid plan schema: {0}")]
    Schema(String),
    #[error("plan does not match the expected structure")]
    Invalid,
    #[error("duplicate subtask id {0}")]
    DuplicateSubTaskId(u32),
}

/// Errors raised by LLM providers
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{0} environment variable not set")]
    MissingApiKey(String),
    #[error("unknown provider '{0}'")]
    UnknownProvider(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} API error: {body}")]
    Api { provider: String, body: String },
    #[error("no content in {0} response")]
    EmptyResponse(String),
    #[error("LLM did not follow the format after {0} attempts")]
    FormatNotFollowed(usize),
}

/// Errors raised by search tools
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{tool} returned {status}: {body}")]
    Api {
        tool: String,
        status: u16,
        body: String,
    },
    #[error("{tool} returned an unreadable response: {message}")]
    Malformed { tool: String, message: String },
}

/// Errors raised by the plan, research and report collaborators
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    /// The human approval callback failed; interpreted as a cancellation
    #[error("approval callback aborted: {0}")]
    Cancelled(String),
}

/// Errors that end a workflow run
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("no approval decision before the deadline")]
    ApprovalTimeout,
    #[error("task {0} was cancelled")]
    Cancelled(String),
    #[error("collaborator failed: {0}")]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error("workflow execution error: {0}")]
    Execution(String),
}

impl WorkflowError {
    /// Short machine-readable reason recorded on failed tasks
    pub fn reason(&self) -> &'static str {
        match self {
            WorkflowError::ApprovalTimeout => "approval_timeout",
            WorkflowError::Cancelled(_) => "cancelled",
            WorkflowError::Collaborator(_) => "collaborator_error",
            WorkflowError::Store(_) => "store_error",
            WorkflowError::Gate(_) => "gate_error",
            WorkflowError::Execution(_) => "workflow_execution_error",
        }
    }
}

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}
