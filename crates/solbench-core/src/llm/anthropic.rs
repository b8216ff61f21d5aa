use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use super::{ProviderClient, ProviderSettings, ANTHROPIC_MODELS};
use crate::error::{ConfigurationError, ProviderError};

const PROVIDER: &str = "anthropic";
const MAX_TOKENS: u32 = 6_000;

/// Backend for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: Client,
    url: String,
    api_key: String,
    max_retries: u32,
}

impl AnthropicClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ConfigurationError> {
        let api_key =
            settings
                .anthropic_api_key
                .clone()
                .ok_or(ConfigurationError::MissingApiKey {
                    provider: PROVIDER,
                    env_var: ProviderSettings::ANTHROPIC_KEY_ENV,
                })?;
        let base = settings
            .anthropic_endpoint
            .clone()
            .unwrap_or_else(|| "https://api.anthropic.com".to_string());
        let url = format!("{}/v1/messages", base.trim_end_matches('/'));
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
impl ProviderClient for AnthropicClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn supports(&self, model_id: &str) -> bool {
        ANTHROPIC_MODELS.contains(&model_id)
    }

    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let payload = MessagesRequest {
            model: model_id.to_string(),
            temperature,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
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
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
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

            let message: MessagesResponse =
                response
                    .json()
                    .await
                    .map_err(|source| ProviderError::Decode {
                        provider: PROVIDER,
                        source,
                    })?;
            return message
                .content
                .into_iter()
                .find_map(|part| part.text)
                .ok_or(ProviderError::MissingContent { provider: PROVIDER });
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    _type: String,
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn settings(url: String) -> ProviderSettings {
        ProviderSettings {
            anthropic_api_key: Some("test-key".into()),
            anthropic_endpoint: Some(url),
            timeout_secs: Some(5),
            max_retries: 0,
            ..ProviderSettings::default()
        }
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn generate_returns_first_text_block() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .header("x-api-key", "test-key")
                .header("anthropic-version", "2023-06-01");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"content":[{"type":"text","text":"pragma solidity ^0.8.0; contract D {}"}]}"#);
        });

        let client = AnthropicClient::new(&settings(server.base_url())).unwrap();
        let text = client
            .generate("claude-3-haiku-20240307", "translate", 0.0)
            .await
            .unwrap();
        assert!(text.contains("contract D"));
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn retries_then_surfaces_api_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(529);
        });

        let mut settings = settings(server.base_url());
        settings.max_retries = 1;
        let client = AnthropicClient::new(&settings).unwrap();
        let err = client
            .generate("claude-3-haiku-20240307", "x", 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 529, .. }));
        mock.assert_hits(2);
    }
}
