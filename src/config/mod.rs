mod parser;
use crate::constants::{
    DEFAULT_APPROVAL_POLL_INTERVAL, DEFAULT_APPROVAL_TIMEOUT, DEFAULT_MAX_ITERATIONS,
    DEFAULT_SOURCE,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use parser::*;

/// Top-level application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub workflow: WorkflowConfig,
    /// SQLite file shared by the API, CLI and workers
    pub database_path: String,
    pub event_bridge: BridgeKind,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            workflow: WorkflowConfig::default(),
            database_path: "delver.db".to_string(),
            event_bridge: BridgeKind::Sqlite,
        }
    }
}

/// LLM provider selection
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// "openai", "deepseek", "anthropic" or "openai_compatible"
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    /// Endpoint override for OpenAI-compatible providers
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            base_url: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub tavily_api_key: Option<String>,
    /// Items requested per search call
    pub max_results: usize,
    pub default_source: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            tavily_api_key: None,
            max_results: 5,
            default_source: DEFAULT_SOURCE.to_string(),
        }
    }
}

/// Defaults applied to new tasks and to the engine
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WorkflowConfig {
    pub max_iterations: u32,
    pub auto_approve_plan: bool,
    /// Directory receiving report artifacts
    pub output_dir: String,
    #[serde(with = "humantime_serde_compat")]
    pub approval_timeout: Duration,
    #[serde(with = "humantime_serde_compat")]
    pub approval_poll_interval: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        WorkflowConfig {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            auto_approve_plan: false,
            output_dir: "./outputs".to_string(),
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            approval_poll_interval: DEFAULT_APPROVAL_POLL_INTERVAL,
        }
    }
}

/// Transport used by the event bridge
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BridgeKind {
    None,
    Local,
    Sqlite,
}

impl fmt::Display for BridgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BridgeKind::None => "none",
            BridgeKind::Local => "local",
            BridgeKind::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

impl FromStr for BridgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(BridgeKind::None),
            "local" => Ok(BridgeKind::Local),
            "sqlite" => Ok(BridgeKind::Sqlite),
            other => Err(format!("unknown event bridge '{}'", other)),
        }
    }
}

/// Durations are written in humantime form ("300s", "5m") in YAML
mod humantime_serde_compat {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
