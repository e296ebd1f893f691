use std::env;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::chat::context::{ContextMessage, PromptMessage, assemble_prompt};
use crate::chat::error::GenerationError;
use crate::chat::generator::ResponseGenerator;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-5";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection and sampling settings for the chat-completions API.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_tokens: 1000,
            temperature: 0.7,
            presence_penalty: 0.1,
            frequency_penalty: 0.1,
        }
    }

    /// Read `OPENAI_API_KEY` and the optional `OPENAI_MODEL`, `OPENAI_BASE_URL`
    /// and `OPENAI_TIMEOUT_SECS` overrides.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| eyre!("OPENAI_API_KEY environment variable not set"))?;

        let mut config = Self::new(api_key);
        if let Ok(model) = env::var("OPENAI_MODEL") {
            config.model = model;
        }
        if let Ok(base_url) = env::var("OPENAI_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Ok(timeout) = env::var("OPENAI_TIMEOUT_SECS") {
            config.timeout_secs = timeout
                .parse()
                .map_err(|_| eyre!("OPENAI_TIMEOUT_SECS must be a whole number of seconds, got {timeout:?}"))?;
        }
        Ok(config)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<PromptMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct OpenAiClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn classify(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            GenerationError::Timeout(self.config.timeout_secs)
        } else {
            GenerationError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl ResponseGenerator for OpenAiClient {
    async fn generate(
        &self,
        system_prompt: &str,
        context: &[ContextMessage],
        user_message: &str,
    ) -> Result<String, GenerationError> {
        let request_body = ChatCompletionRequest {
            model: &self.config.model,
            messages: assemble_prompt(system_prompt, context, user_message),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            presence_penalty: self.config.presence_penalty,
            frequency_penalty: self.config.frequency_penalty,
        };

        debug!(
            "Sending request to model provider: model={}, messages={}",
            request_body.model,
            request_body.messages.len()
        );

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Model provider request failed with status {}: {}", status, body);
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse =
            response.json().await.map_err(|e| self.classify(e))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(GenerationError::EmptyReply)?;

        debug!("Received reply from model provider ({} bytes)", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::conversation_state::Role;

    #[test]
    fn test_request_body_shape() {
        let config = LlmConfig::new("sk-test");
        let context = vec![ContextMessage::new(Role::User, "Merhaba")];
        let body = ChatCompletionRequest {
            model: &config.model,
            messages: assemble_prompt("sistem", &context, "Nasılsın?"),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            presence_penalty: config.presence_penalty,
            frequency_penalty: config.frequency_penalty,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-5");
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["messages"].as_array().unwrap().len(), 3);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][2]["content"], "Nasılsın?");
    }

    #[test]
    fn test_response_parsing_tolerates_missing_content() {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)
                .unwrap();
        assert!(parsed.choices[0].message.content.is_none());

        let empty: ChatCompletionResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.choices.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_generation_error() {
        let mut config = LlmConfig::new("sk-test");
        config.base_url = "http://127.0.0.1:9".to_string();
        config.timeout_secs = 2;
        let client = OpenAiClient::new(config).unwrap();

        let result = client.generate("sistem", &[], "Merhaba").await;

        assert!(matches!(
            result,
            Err(GenerationError::Transport(_)) | Err(GenerationError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_provider_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and hold them open without ever answering.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                if let Ok((stream, _)) = listener.accept().await {
                    held.push(stream);
                }
            }
        });

        let mut config = LlmConfig::new("sk-test");
        config.base_url = format!("http://{}", addr);
        config.timeout_secs = 1;
        let client = OpenAiClient::new(config).unwrap();

        let result = client.generate("sistem", &[], "Merhaba").await;

        server.abort();
        assert!(matches!(result, Err(GenerationError::Timeout(1))));
    }
}
