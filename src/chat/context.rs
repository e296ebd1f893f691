use serde::{Deserialize, Serialize};

use super::conversation_state::Role;

/// A turn reduced to the shape the model provider consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl ContextMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A message in a chat-completions request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// Lay out the request messages: system prompt, prior turns, then the current
/// user message.
pub fn assemble_prompt<'a>(
    system_prompt: &'a str,
    context: &'a [ContextMessage],
    user_message: &'a str,
) -> Vec<PromptMessage<'a>> {
    let mut messages = Vec::with_capacity(context.len() + 2);
    messages.push(PromptMessage {
        role: "system",
        content: system_prompt,
    });
    messages.extend(context.iter().map(|msg| PromptMessage {
        role: msg.role.as_str(),
        content: &msg.content,
    }));
    messages.push(PromptMessage {
        role: Role::User.as_str(),
        content: user_message,
    });
    messages
}
