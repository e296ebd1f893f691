pub mod context;
pub mod conversation_state;
pub mod error;
pub mod generator;
pub mod persona;

use std::sync::Arc;

use tracing::{error, info, warn};

use context::ContextMessage;
use conversation_state::{ConversationStore, SessionKey, RETENTION_CEILING};
use error::{ChatError, GenerationError};
use generator::ResponseGenerator;

/// Number of prior turns sent to the model with each message.
pub const CONTEXT_WINDOW_TURNS: usize = 8;

/// Outcome of one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub response: String,
    /// The model call failed and `response` is the fallback notice.
    pub degraded: bool,
}

/// Runs user messages through the model while keeping per-session history.
pub struct ChatService {
    store: Arc<ConversationStore>,
    generator: Arc<dyn ResponseGenerator>,
    system_prompt: String,
}

impl ChatService {
    pub fn new(store: Arc<ConversationStore>, generator: Arc<dyn ResponseGenerator>) -> Self {
        Self {
            store,
            generator,
            system_prompt: persona::SYSTEM_PROMPT.to_string(),
        }
    }

    /// Handle one user message.
    ///
    /// The user turn and the reply are recorded together once the model has
    /// answered. If the call fails the fallback notice is recorded as the
    /// assistant turn, so history keeps alternating and the caller still gets a
    /// reply. If recording fails, history is left as it was.
    pub async fn send(&self, key: &SessionKey, message: &str) -> Result<ChatReply, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::InvalidInput);
        }

        let context = self.store.context_window(key, CONTEXT_WINDOW_TURNS);
        info!(
            "Chat message: session={}, message_len={}, context_turns={}",
            key,
            message.len(),
            context.len()
        );

        let generated = self
            .generator
            .generate(&self.system_prompt, &context, message)
            .await
            .and_then(|reply| {
                if reply.trim().is_empty() {
                    Err(GenerationError::EmptyReply)
                } else {
                    Ok(reply)
                }
            });

        let reply = match generated {
            Ok(response) => ChatReply {
                response,
                degraded: false,
            },
            Err(e) => {
                error!("Agent response error for session {}: {}", key, e);
                ChatReply {
                    response: persona::FALLBACK_REPLY.to_string(),
                    degraded: true,
                }
            }
        };

        let evicted = self
            .store
            .record_exchange(key, message, &reply.response, RETENTION_CEILING)?;
        if evicted > 0 {
            warn!("Session {} hit the retention ceiling, dropped {} turns", key, evicted);
        }

        Ok(reply)
    }

    pub fn clear(&self, key: &SessionKey) -> Result<(), ChatError> {
        self.store.reset(key)?;
        info!("Cleared history for session {}", key);
        Ok(())
    }

    pub fn history(&self, key: &SessionKey) -> Vec<ContextMessage> {
        self.store.history(key)
    }

    pub fn greeting(&self) -> &'static str {
        persona::GREETING
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }
}
