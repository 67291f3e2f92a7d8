//! Scripted engine for tests
//!
//! Returns queued responses in order, falling back to a canned reply once
//! the script runs out. Records every request it sees.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{EngineError, GenerationRequest, GenerationResponse, ReasoningEngine};

#[derive(Default)]
pub struct MockEngine {
    responses: Mutex<VecDeque<Result<String, EngineError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response to return
    pub fn push_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(text.into()));
    }

    /// Queue an error to return
    pub fn push_error(&self, error: EngineError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ReasoningEngine for MockEngine {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, EngineError> {
        self.requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(GenerationResponse::from_text(text)),
            Some(Err(e)) => Err(e),
            None => Ok(GenerationResponse::from_text("ok")),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
