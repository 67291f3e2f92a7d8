//! Reasoning engines
//!
//! A reasoning engine turns a rendered prompt into text. Three providers
//! are supported: the Anthropic Messages API, an arbitrary subprocess
//! (prompt on stdin, response on stdout), and a scripted mock for tests.

mod anthropic;
mod command;
mod error;
mod mock;

pub use anthropic::AnthropicEngine;
pub use command::CommandEngine;
pub use error::EngineError;
pub use mock::MockEngine;

use async_trait::async_trait;
use eyre::Result;
use std::sync::Arc;

use crate::config::Config;

/// Everything needed for one engine call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System prompt establishing the actor's role
    pub system: String,

    /// The rendered task prompt
    pub prompt: String,

    /// Max tokens for the response
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 16384,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Response from an engine call
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    /// The generated text
    pub text: String,

    /// Token usage, when the provider reports it
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl GenerationResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            input_tokens: 0,
            output_tokens: 0,
        }
    }
}

/// Provider-agnostic interface all actors speak through
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Generate a response for the given request
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, EngineError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Shared handle to a reasoning engine
pub type EngineHandle = Arc<dyn ReasoningEngine>;

/// Build an engine from configuration
pub fn create_engine(config: &Config) -> Result<EngineHandle> {
    match config.engine.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicEngine::from_config(&config.engine)?)),
        "command" => Ok(Arc::new(
            CommandEngine::from_config(&config.engine)?.with_working_dir(&config.project.working_dir),
        )),
        "mock" => Ok(Arc::new(MockEngine::default())),
        other => Err(eyre::eyre!("Unknown engine provider: {other}")),
    }
}
