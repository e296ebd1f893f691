use std::io;

use thiserror::Error;

/// Notice shown when the user submits an empty message.
pub const EMPTY_MESSAGE_NOTICE: &str = "Lütfen bir mesaj yazın.";

/// Notice shown for any fault the user cannot correct.
pub const UNEXPECTED_NOTICE: &str = "Üzgünüm, bir hata oluştu. Lütfen tekrar deneyin.";

/// Failure of the upstream model call.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request to model provider failed: {0}")]
    Transport(String),

    #[error("model provider timed out after {0} seconds")]
    Timeout(u64),

    #[error("model provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model provider returned no usable content")]
    EmptyReply,
}

/// Failure of the session persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("session file {path} is not valid JSON: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced by the chat core to its callers.
///
/// Model failures never appear here; they are answered with the fallback
/// notice instead.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Empty or whitespace-only message.
    #[error("message content is empty")]
    InvalidInput,

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        ChatError::Unexpected(err.to_string())
    }
}

impl ChatError {
    /// Text that is safe to show to the user.
    pub fn user_notice(&self) -> &'static str {
        match self {
            ChatError::InvalidInput => EMPTY_MESSAGE_NOTICE,
            ChatError::Unexpected(_) => UNEXPECTED_NOTICE,
        }
    }
}
