//! Troika configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main troika configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reasoning engine configuration
    pub engine: EngineConfig,

    /// Loop pacing and limits
    pub orchestrator: OrchestratorConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Prompt template overrides
    pub prompts: PromptsConfig,

    /// Project being worked on
    pub project: ProjectConfig,

    /// Log level when not overridden on the command line
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        match self.engine.provider.as_str() {
            "anthropic" => {
                if std::env::var(&self.engine.api_key_env).is_err() {
                    return Err(eyre::eyre!(
                        "Engine API key not found. Set the {} environment variable.",
                        self.engine.api_key_env
                    ));
                }
            }
            "command" => {
                if self.engine.command.is_empty() {
                    return Err(eyre::eyre!(
                        "Engine provider is \"command\" but no engine.command is configured"
                    ));
                }
            }
            "mock" => {}
            other => {
                return Err(eyre::eyre!(
                    "Unknown engine provider: {other} (expected anthropic, command, or mock)"
                ));
            }
        }
        if self.orchestrator.max_workers == 0 {
            return Err(eyre::eyre!("orchestrator.max-workers must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .troika.yml
        let local_config = PathBuf::from(".troika.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/troika/troika.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("troika").join("troika.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Reasoning engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Provider name: "anthropic", "command", or "mock"
    pub provider: String,

    /// Model identifier (anthropic provider)
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Subprocess to run (command provider); receives the prompt on stdin
    pub command: Vec<String>,

    /// Retries per engine call on transient failures
    #[serde(rename = "max-retries")]
    pub max_retries: u32,
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
            command: Vec::new(),
            max_retries: 3,
        }
    }
}

/// Loop pacing and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum concurrent workers
    #[serde(rename = "max-workers")]
    pub max_workers: usize,

    /// Seconds to wait between iterations
    #[serde(rename = "wait-time-secs")]
    pub wait_time_secs: u64,

    /// Maximum iterations before the loop stops on its own
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    /// Attempt budget per task before it is finalized as failed
    #[serde(rename = "max-task-attempts")]
    pub max_task_attempts: u32,

    /// Age in seconds after which a claim is considered abandoned
    #[serde(rename = "lock-stale-secs")]
    pub lock_stale_secs: u64,

    /// Maximum tasks handed out per iteration (0 = no cap)
    #[serde(rename = "tasks-per-iteration")]
    pub tasks_per_iteration: usize,
}

impl OrchestratorConfig {
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_secs)
    }

    pub fn lock_stale_threshold(&self) -> Duration {
        Duration::from_secs(self.lock_stale_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            wait_time_secs: 60,
            max_iterations: 100,
            max_task_attempts: statestore::DEFAULT_MAX_ATTEMPTS,
            lock_stale_secs: statestore::DEFAULT_LOCK_STALE_SECS,
            tasks_per_iteration: 0,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// State directory for the run
    #[serde(rename = "state-dir")]
    pub state_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".troika"),
        }
    }
}

/// Prompt template overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Directory holding prompt template files (planner.md, worker.md, judge.md)
    pub dir: Option<PathBuf>,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self { dir: None }
    }
}

/// Project being worked on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Short name shown in logs and prompts
    pub name: String,

    /// The goal the loop is driving toward
    pub goal: String,

    /// Working directory for command-provider workers
    #[serde(rename = "working-dir")]
    pub working_dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "project".to_string(),
            goal: String::new(),
            working_dir: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.engine.provider, "anthropic");
        assert_eq!(config.orchestrator.max_workers, 3);
        assert_eq!(config.orchestrator.max_iterations, 100);
        assert_eq!(config.storage.state_dir, PathBuf::from(".troika"));
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
engine:
  provider: anthropic
  model: claude-opus-4
  api-key-env: MY_API_KEY
  max-tokens: 8192
  timeout-ms: 60000

orchestrator:
  max-workers: 5
  wait-time-secs: 10
  max-iterations: 20

project:
  name: widgets
  goal: "ship the widget service"
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.engine.model, "claude-opus-4");
        assert_eq!(config.engine.api_key_env, "MY_API_KEY");
        assert_eq!(config.orchestrator.max_workers, 5);
        assert_eq!(config.orchestrator.wait_time_secs, 10);
        assert_eq!(config.project.name, "widgets");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
orchestrator:
  max-workers: 1
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.orchestrator.max_workers, 1);

        // Defaults for unspecified
        assert_eq!(config.orchestrator.max_iterations, 100);
        assert_eq!(config.engine.provider, "anthropic");
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let mut config = Config::default();
        config.engine.provider = "command".to_string();
        assert!(config.validate().is_err());

        config.engine.command = vec!["claude".to_string(), "-p".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let mut config = Config::default();
        config.engine.provider = "oracle".to_string();
        assert!(config.validate().is_err());
    }
}
