use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use super::{ProviderClient, ProviderSettings, MISTRAL_MODELS};
use crate::error::{ConfigurationError, ProviderError};

const PROVIDER: &str = "mistral";
// Ceiling for generated contract length on this backend.
const MAX_TOKENS: u32 = 10_000;

/// Chat-completion backend for the Mistral platform API.
#[derive(Debug, Clone)]
pub struct MistralClient {
    http: Client,
    url: String,
    api_key: String,
    max_retries: u32,
}

impl MistralClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ConfigurationError> {
        let api_key =
            settings
                .mistral_api_key
                .clone()
                .ok_or(ConfigurationError::MissingApiKey {
                    provider: PROVIDER,
                    env_var: ProviderSettings::MISTRAL_KEY_ENV,
                })?;
        let base = settings
            .mistral_endpoint
            .clone()
            .unwrap_or_else(|| "https://api.mistral.ai".to_string());
        let url = format!("{}/v1/chat/completions", base.trim_end_matches('/'));
        let http = Client::builder()
            .user_agent("solbench/0.3")
            .timeout(Duration::from_secs(settings.timeout_secs.unwrap_or(120)))
            .build()
            .expect("reqwest client with static configuration");
        Ok(Self {
            http,
            url,
            api_key,
            max_retries: settings.max_retries,
        })
    }
}

#[async_trait]
impl ProviderClient for MistralClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn supports(&self, model_id: &str) -> bool {
        MISTRAL_MODELS.contains(&model_id)
    }

    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let payload = ChatRequest {
            model: model_id.to_string(),
            temperature,
            max_tokens: MAX_TOKENS,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
        };

        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(200);
        loop {
            let response = self
                .http
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await;

            let response = match response {
                Ok(resp) => resp,
                Err(source) => {
                    if attempt >= self.max_retries {
                        return Err(ProviderError::Transport {
                            provider: PROVIDER,
                            source,
                        });
                    }
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(5));
                    attempt += 1;
                    continue;
                }
            };

            if !response.status().is_success() {
                if attempt >= self.max_retries {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProviderError::Api {
                        provider: PROVIDER,
                        status,
                        body,
                    });
                }
                sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(5));
                attempt += 1;
                continue;
            }

            let chat: ChatResponse =
                response
                    .json()
                    .await
                    .map_err(|source| ProviderError::Decode {
                        provider: PROVIDER,
                        source,
                    })?;
            return chat
                .choices
                .into_iter()
                .find_map(|choice| choice.message.content)
                .ok_or(ProviderError::MissingContent { provider: PROVIDER });
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn settings(url: String) -> ProviderSettings {
        ProviderSettings {
            mistral_api_key: Some("test-key".into()),
            mistral_endpoint: Some(url),
            timeout_secs: Some(5),
            max_retries: 0,
            ..ProviderSettings::default()
        }
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn generate_returns_message_content() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"choices":[{"message":{"content":"pragma solidity 0.8.19; contract B {}"}}]}"#);
        });

        let client = MistralClient::new(&settings(server.base_url())).unwrap();
        let text = client
            .generate("mistral-medium", "translate", 0.5)
            .await
            .unwrap();
        assert!(text.contains("contract B"));
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn retries_before_surfacing_api_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(500);
        });

        let mut settings = settings(server.base_url());
        settings.max_retries = 1;
        let client = MistralClient::new(&settings).unwrap();
        let err = client.generate("mistral-tiny", "x", 0.0).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 500, .. }));
        mock.assert_hits(2);
    }
}
