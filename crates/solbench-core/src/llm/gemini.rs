use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use super::{ProviderClient, ProviderSettings, GOOGLE_MODELS};
use crate::error::{ConfigurationError, ProviderError};

const PROVIDER: &str = "gemini";

/// Backend for the Google Generative Language API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    base: String,
    api_key: String,
    max_retries: u32,
}

impl GeminiClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ConfigurationError> {
        let api_key =
            settings
                .google_api_key
                .clone()
                .ok_or(ConfigurationError::MissingApiKey {
                    provider: PROVIDER,
                    env_var: ProviderSettings::GOOGLE_KEY_ENV,
                })?;
        let base = settings
            .google_endpoint
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string())
            .trim_end_matches('/')
            .to_string();
        let http = Client::builder()
            .user_agent("solbench/0.3")
            .timeout(Duration::from_secs(settings.timeout_secs.unwrap_or(120)))
            .build()
            .expect("reqwest client with static configuration");
        Ok(Self {
            http,
            base,
            api_key,
            max_retries: settings.max_retries,
        })
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn supports(&self, model_id: &str) -> bool {
        GOOGLE_MODELS.contains(&model_id)
    }

    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base, model_id);
        let payload = GenerateRequest {
            contents: vec![RequestContent {
                role: "user".into(),
                parts: vec![RequestPart {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig { temperature },
        };

        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(200);
        loop {
            let response = self
                .http
                .post(&url)
                .query(&[("key", &self.api_key)])
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

            let message: GenerateResponse =
                response
                    .json()
                    .await
                    .map_err(|source| ProviderError::Decode {
                        provider: PROVIDER,
                        source,
                    })?;
            return message
                .candidates
                .into_iter()
                .flat_map(|candidate| candidate.content.parts)
                .find_map(|part| part.text)
                .ok_or(ProviderError::MissingContent { provider: PROVIDER });
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn settings(url: String) -> ProviderSettings {
        ProviderSettings {
            google_api_key: Some("test-key".into()),
            google_endpoint: Some(url),
            timeout_secs: Some(5),
            ..ProviderSettings::default()
        }
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn generate_returns_first_text_part() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-pro:generateContent")
                .query_param("key", "test-key");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "candidates": [
                        {
                            "content": {
                                "role": "model",
                                "parts": [{"text": "pragma solidity ^0.8.0;\ncontract C {}"}]
                            }
                        }
                    ]
                }));
        });

        let client = GeminiClient::new(&settings(server.base_url())).unwrap();
        let text = client.generate("gemini-pro", "translate", 0.7).await.unwrap();
        assert!(text.contains("contract C"));
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn empty_candidates_surface_missing_content() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1beta/models/gemini-pro:generateContent");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"candidates": []}));
        });

        let client = GeminiClient::new(&settings(server.base_url())).unwrap();
        let err = client.generate("gemini-pro", "x", 0.0).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingContent { .. }));
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn retries_before_surfacing_api_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-pro:generateContent");
            then.status(503);
        });

        let mut settings = settings(server.base_url());
        settings.max_retries = 1;
        let client = GeminiClient::new(&settings).unwrap();
        let err = client.generate("gemini-pro", "x", 0.0).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 503, .. }));
        mock.assert_hits(2);
    }
}
