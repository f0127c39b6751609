use super::{AppConfig, BridgeKind};
use crate::constants::{MAX_ALLOWED_ITERATIONS, MAX_APPROVAL_TIMEOUT_SECS};
use crate::errors::ConfigError;
use std::fs;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Loads the application configuration.
///
/// The optional YAML file is read first, then environment variables override
/// individual keys, then the result is validated.
///
/// # Arguments
///
/// * `file_path` - Optional path to a YAML configuration file
///
/// # Errors
///
/// Returns an error if:
/// * The file cannot be read or parsed
/// * An environment variable holds an unparsable value
/// * A value is out of range
pub fn load_app_config(file_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    load_app_config_with(file_path, |key| std::env::var(key).ok())
}

/// `load_app_config` with an explicit environment lookup
pub fn load_app_config_with<F>(file_path: Option<&str>, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match file_path {
        Some(path) => {
            let yaml_str = fs::read_to_string(path)?;
            let config: AppConfig = serde_yaml::from_str(&yaml_str)?;
            info!("Loaded configuration from {}", path);
            config
        }
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate(&config)?;
    Ok(config)
}

/// Overrides configuration keys from environment variables read via `lookup`
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("LLM_PROVIDER") {
        config.llm.provider = v;
    }
    if let Some(v) = get("LLM_MODEL") {
        config.llm.model = v;
    }
    if let Some(v) = get("LLM_TEMPERATURE") {
        config.llm.temperature = parse_value("LLM_TEMPERATURE", &v)?;
    }
    if let Some(v) = get("LLM_BASE_URL") {
        config.llm.base_url = Some(v);
    }
    if let Some(v) = get("TAVILY_API_KEY") {
        config.search.tavily_api_key = Some(v);
    }
    if let Some(v) = get("MAX_ITERATIONS") {
        config.workflow.max_iterations = parse_value("MAX_ITERATIONS", &v)?;
    }
    if let Some(v) = get("AUTO_APPROVE_PLAN") {
        config.workflow.auto_approve_plan = parse_bool("AUTO_APPROVE_PLAN", &v)?;
    }
    if let Some(v) = get("OUTPUT_DIR") {
        config.workflow.output_dir = v;
    }
    if let Some(v) = get("APPROVAL_TIMEOUT") {
        config.workflow.approval_timeout = parse_duration("APPROVAL_TIMEOUT", &v)?;
    }
    if let Some(v) = get("APPROVAL_POLL_INTERVAL") {
        config.workflow.approval_poll_interval = parse_duration("APPROVAL_POLL_INTERVAL", &v)?;
    }
    if let Some(v) = get("DATABASE_PATH") {
        config.database_path = v;
    }
    if let Some(v) = get("EVENT_BRIDGE") {
        config.event_bridge = BridgeKind::from_str(&v).map_err(|message| ConfigError::Invalid {
            key: "EVENT_BRIDGE".to_string(),
            message,
        })?;
    }
    Ok(())
}

/// Checks ranges and formats that serde cannot express
pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    let max = config.workflow.max_iterations;
    if !(1..=MAX_ALLOWED_ITERATIONS).contains(&max) {
        return Err(invalid(
            "max_iterations",
            format!("{} is outside 1..={}", max, MAX_ALLOWED_ITERATIONS),
        ));
    }
    let timeout = config.workflow.approval_timeout;
    if timeout.is_zero() || timeout.as_secs() > MAX_APPROVAL_TIMEOUT_SECS {
        return Err(invalid(
            "approval_timeout",
            format!("must be between 1s and {}s", MAX_APPROVAL_TIMEOUT_SECS),
        ));
    }
    if config.workflow.approval_poll_interval.is_zero() {
        return Err(invalid("approval_poll_interval", "must be greater than zero"));
    }
    if let Some(base_url) = &config.llm.base_url {
        url::Url::parse(base_url).map_err(|e| invalid("base_url", e.to_string()))?;
    }
    Ok(())
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.into(),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, e.to_string()))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid(key, format!("'{}' is not a boolean", other))),
    }
}

fn parse_duration(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim()).map_err(|e| invalid(key, e.to_string()))
}
