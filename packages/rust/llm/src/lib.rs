//! Text generation service used to compose answers.
//!
//! The pipeline only needs a single-shot, non-streaming "complete" call.
//! [`GenerationService`] is that contract; [`OpenRouterClient`] implements it
//! over the OpenRouter chat-completions API.

mod openrouter;

use async_trait::async_trait;
use secq_shared::Result;

pub use openrouter::{OpenRouterClient, OpenRouterSettings};

/// Result of one completion call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Raw model output. May be empty.
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    /// Model that actually served the request.
    pub model: String,
    pub latency_ms: u64,
}

/// A text-generation backend.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Whether a credential is configured. Runs refuse to start without one.
    fn has_credential(&self) -> bool;

    /// Send one system + user prompt pair and wait for the full response.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<Completion>;
}
