//! Subprocess-backed engine
//!
//! Runs a configured command per call, writes the prompt to its stdin,
//! and reads the response from stdout. The system prompt is prepended to
//! the input since a subprocess has no separate system channel.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{EngineError, GenerationRequest, GenerationResponse, ReasoningEngine};
use crate::config::EngineConfig;

pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
    timeout: Duration,
}

impl CommandEngine {
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let mut command = config.command.iter();
        let program = command
            .next()
            .cloned()
            .ok_or_else(|| EngineError::InvalidResponse("engine.command is empty".to_string()))?;

        Ok(Self {
            program,
            args: command.cloned().collect(),
            working_dir: PathBuf::from("."),
            timeout: config.timeout(),
        })
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }
}

#[async_trait]
impl ReasoningEngine for CommandEngine {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, EngineError> {
        debug!(program = %self.program, "generate: spawning subprocess");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Process {
                status: "spawn failed".to_string(),
                stderr: e.to_string(),
            })?;

        let input = format!("{}\n\n{}", request.system, request.prompt);
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).await.map_err(|e| EngineError::Process {
                status: "stdin write failed".to_string(),
                stderr: e.to_string(),
            })?;
            // Close stdin so the child sees EOF
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| EngineError::Timeout(self.timeout))?
            .map_err(|e| EngineError::Process {
                status: "wait failed".to_string(),
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(EngineError::Process {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(EngineError::InvalidResponse("Subprocess produced no output".to_string()));
        }

        Ok(GenerationResponse::from_text(text))
    }

    fn name(&self) -> &str {
        "command"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_for(command: &[&str]) -> CommandEngine {
        let config = EngineConfig {
            provider: "command".to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            timeout_ms: 5_000,
            ..Default::default()
        };
        CommandEngine::from_config(&config).unwrap()
    }

    #[test]
    fn test_from_config_rejects_empty_command() {
        let config = EngineConfig {
            provider: "command".to_string(),
            command: Vec::new(),
            ..Default::default()
        };
        assert!(CommandEngine::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_echoes_stdin() {
        let engine = engine_for(&["cat"]);
        let response = engine
            .generate(GenerationRequest::new("system text", "prompt text"))
            .await
            .unwrap();
        assert!(response.text.contains("system text"));
        assert!(response.text.contains("prompt text"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_process_error() {
        let engine = engine_for(&["false"]);
        let err = engine.generate(GenerationRequest::new("s", "p")).await.unwrap_err();
        assert!(matches!(err, EngineError::Process { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_process_error() {
        let engine = engine_for(&["definitely-not-a-real-program-xyz"]);
        let err = engine.generate(GenerationRequest::new("s", "p")).await.unwrap_err();
        assert!(matches!(err, EngineError::Process { .. }));
    }
}
