mod settings;

pub mod anthropic;
pub mod gemini;
pub mod mistral;
pub mod openai;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ConfigurationError, ProviderError};

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use mistral::MistralClient;
pub use openai::OpenAiClient;
pub use settings::ProviderSettings;

/// Known chat-completion models per backend. Membership in one of these
/// tables decides which backend serves a generation request.
pub const OPENAI_MODELS: &[&str] = &[
    "gpt-4-0125-preview",
    "gpt-4-turbo-preview",
    "gpt-4-turbo",
    "gpt-4-1106-preview",
    "gpt-4-vision-preview",
    "gpt-4",
    "gpt-4-0613",
    "gpt-4-32k",
    "gpt-4-32k-0613",
    "gpt-3.5-turbo-1106",
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-16k",
    "gpt-3.5-turbo-instruct",
    "gpt-3.5-turbo-0613",
    "gpt-3.5-turbo-16k-0613",
    "gpt-3.5-turbo-0301",
];

pub const MISTRAL_MODELS: &[&str] = &["mistral-tiny", "mistral-small", "mistral-medium"];

pub const GOOGLE_MODELS: &[&str] = &["gemini-pro"];

pub const ANTHROPIC_MODELS: &[&str] = &[
    "claude-3-opus-20240229",
    "claude-3-sonnet-20240229",
    "claude-3-haiku-20240307",
];

/// Uniform call contract over heterogeneous LLM backends.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable backend identifier used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Whether this backend claims the given model identifier.
    fn supports(&self, model_id: &str) -> bool;

    /// Run one chat completion. No retries beyond the transport knob;
    /// failures surface to the caller as a typed `ProviderError`.
    async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, ProviderError>;
}

/// Backends in fixed priority order with a default fallback for model
/// identifiers no backend claims.
pub struct ProviderRegistry {
    backends: Vec<Box<dyn ProviderClient>>,
    fallback: usize,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    /// Build a registry from explicit backends. The fallback serves any
    /// model no backend claims.
    pub fn new(backends: Vec<Box<dyn ProviderClient>>, fallback: usize) -> Self {
        debug_assert!(fallback < backends.len());
        Self { backends, fallback }
    }

    /// Instantiate only the backends needed for the requested model set.
    /// A model outside every known table falls back to OpenAI, so its
    /// key is required in that case too. Missing keys fail fast here,
    /// before any generation work begins.
    pub fn from_settings(
        settings: &ProviderSettings,
        models: &[String],
    ) -> Result<Self, ConfigurationError> {
        let mut need_openai = false;
        let mut need_mistral = false;
        let mut need_google = false;
        let mut need_anthropic = false;
        for model in models {
            let model = model.as_str();
            if MISTRAL_MODELS.contains(&model) {
                need_mistral = true;
            } else if GOOGLE_MODELS.contains(&model) {
                need_google = true;
            } else if ANTHROPIC_MODELS.contains(&model) {
                need_anthropic = true;
            } else {
                // Known OpenAI models and unmatched identifiers alike.
                need_openai = true;
            }
        }

        let mut backends: Vec<Box<dyn ProviderClient>> = Vec::new();
        let mut fallback = 0;
        if need_openai {
            fallback = backends.len();
            backends.push(Box::new(OpenAiClient::new(settings)?));
        }
        if need_mistral {
            backends.push(Box::new(MistralClient::new(settings)?));
        }
        if need_google {
            backends.push(Box::new(GeminiClient::new(settings)?));
        }
        if need_anthropic {
            backends.push(Box::new(AnthropicClient::new(settings)?));
        }
        Ok(Self::new(backends, fallback))
    }

    /// Resolve the backend for a model: first `supports` match in
    /// priority order, else the default fallback.
    pub fn resolve(&self, model_id: &str) -> &dyn ProviderClient {
        self.backends
            .iter()
            .find(|backend| backend.supports(model_id))
            .unwrap_or(&self.backends[self.fallback])
            .as_ref()
    }

    /// Dispatch a generation call to the backend claiming `model_id`.
    pub async fn generate(
        &self,
        model_id: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let backend = self.resolve(model_id);
        // Best-effort estimate only; each backend enforces its own ceiling.
        debug!(
            provider = backend.name(),
            model = model_id,
            approx_tokens = prompt.len() / 4,
            "dispatching generation request"
        );
        backend.generate(model_id, prompt, temperature).await
    }
}
