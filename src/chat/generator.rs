use async_trait::async_trait;

use super::context::ContextMessage;
use super::error::GenerationError;

/// Produces the assistant's reply for one user message.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// `context` holds the prior turns, oldest first, without `user_message`.
    async fn generate(
        &self,
        system_prompt: &str,
        context: &[ContextMessage],
        user_message: &str,
    ) -> Result<String, GenerationError>;
}
