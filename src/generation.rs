//! Answer generation through an OpenAI-compatible chat-completions API.
//!
//! Groq and OpenAI share the same request and response shape; only the
//! endpoint and the API key variable differ. One non-streaming request is
//! made per question.

use anyhow::{bail, Result};
use async_trait::async_trait;
use resume_rag_core::generation::Generator;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::http::post_json_with_retry;

const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

pub struct ChatCompletionsGenerator {
    model: String,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
    label: &'static str,
}

impl ChatCompletionsGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let (label, default_url, default_key_env) = match config.provider.as_str() {
            "groq" => ("Groq", GROQ_URL, "GROQ_API_KEY"),
            "openai" => ("OpenAI", OPENAI_URL, "OPENAI_API_KEY"),
            other => bail!("Unknown generation provider: {}", other),
        };

        let key_env = config.api_key_env.as_deref().unwrap_or(default_key_env);
        let api_key = std::env::var(key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            url: config.url.clone().unwrap_or_else(|| default_url.to_string()),
            api_key,
            max_retries: config.max_retries,
            client,
            label,
        })
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = chat_request(&self.model, prompt);
        let json = post_json_with_retry(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            self.label,
        )
        .await?;
        parse_chat_response(&json)
    }
}

fn chat_request(model: &str, prompt: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [
            {"role": "user", "content": prompt},
        ],
        "stream": false,
    })
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "groq" | "openai" => Ok(Arc::new(ChatCompletionsGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_single_user_message() {
        let body = chat_request("llama3-8b-8192", "Question: who?");
        assert_eq!(body["model"], "llama3-8b-8192");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Question: who?");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn parses_first_choice() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Jane Doe"}}]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "Jane Doe");
    }

    #[test]
    fn missing_content_is_error() {
        let json = serde_json::json!({"choices": []});
        assert!(parse_chat_response(&json).is_err());
    }

    #[tokio::test]
    async fn disabled_generator_errors() {
        let generator = create_generator(&GenerationConfig {
            provider: "disabled".into(),
            ..Default::default()
        })
        .unwrap();
        assert!(generator.generate("hi").await.is_err());
    }

    #[test]
    fn missing_key_env_is_reported() {
        let result = ChatCompletionsGenerator::new(&GenerationConfig {
            provider: "groq".into(),
            api_key_env: Some("RRAG_TEST_KEY_THAT_IS_NEVER_SET".into()),
            ..Default::default()
        });
        let err = result.err().unwrap();
        assert!(err.to_string().contains("RRAG_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
