//! Text generation contract
//!
//! The core treats generation as an opaque prompt-to-text function. Concrete
//! providers live outside this workspace; callers must bound each call with a
//! deadline and surface failures as degraded text, never as a crash.

use async_trait::async_trait;
use thiserror::Error;

/// Generation errors
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    #[error("generation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("generation backend unavailable: {message}")]
    Unavailable { message: String },
}

/// Opaque prompt-to-text contract
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Single blocking completion; no streaming is required by this core
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, GenerationError>;
}
