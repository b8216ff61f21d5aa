use std::collections::HashMap;

/// Environment-driven credentials and transport knobs for the provider
/// backends. Keys for providers that are never selected may stay unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSettings {
    pub openai_api_key: Option<String>,
    pub mistral_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    /// Base-URL overrides, used by tests and self-hosted gateways.
    pub openai_endpoint: Option<String>,
    pub mistral_endpoint: Option<String>,
    pub google_endpoint: Option<String>,
    pub anthropic_endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: u32,
}

impl ProviderSettings {
    pub const OPENAI_KEY_ENV: &'static str = "OPENAI_API_KEY";
    pub const MISTRAL_KEY_ENV: &'static str = "MISTRAL_API_KEY";
    pub const GOOGLE_KEY_ENV: &'static str = "GOOGLE_API_KEY";
    pub const ANTHROPIC_KEY_ENV: &'static str = "ANTHROPIC_API_KEY";
    const OPENAI_ENDPOINT_ENV: &'static str = "SOLBENCH_OPENAI_ENDPOINT";
    const MISTRAL_ENDPOINT_ENV: &'static str = "SOLBENCH_MISTRAL_ENDPOINT";
    const GOOGLE_ENDPOINT_ENV: &'static str = "SOLBENCH_GOOGLE_ENDPOINT";
    const ANTHROPIC_ENDPOINT_ENV: &'static str = "SOLBENCH_ANTHROPIC_ENDPOINT";
    const TIMEOUT_ENV: &'static str = "SOLBENCH_TIMEOUT_SECS";
    const RETRIES_ENV: &'static str = "SOLBENCH_MAX_RETRIES";

    /// Load settings from environment variables. Missing keys are not an
    /// error here; a backend rejects construction when its own key is
    /// absent and that backend is actually requested.
    pub fn from_env() -> Self {
        Self::from_map(std::env::vars().collect())
    }

    fn from_map(vars: HashMap<String, String>) -> Self {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            openai_api_key: get(Self::OPENAI_KEY_ENV),
            mistral_api_key: get(Self::MISTRAL_KEY_ENV),
            google_api_key: get(Self::GOOGLE_KEY_ENV),
            anthropic_api_key: get(Self::ANTHROPIC_KEY_ENV),
            openai_endpoint: get(Self::OPENAI_ENDPOINT_ENV),
            mistral_endpoint: get(Self::MISTRAL_ENDPOINT_ENV),
            google_endpoint: get(Self::GOOGLE_ENDPOINT_ENV),
            anthropic_endpoint: get(Self::ANTHROPIC_ENDPOINT_ENV),
            timeout_secs: get(Self::TIMEOUT_ENV).and_then(|v| v.parse().ok()),
            max_retries: get(Self::RETRIES_ENV)
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let settings = ProviderSettings::from_map(HashMap::new());
        assert!(settings.openai_api_key.is_none());
        assert!(settings.anthropic_api_key.is_none());
        assert_eq!(settings.max_retries, 2);
        assert!(settings.timeout_secs.is_none());
    }

    #[test]
    fn blank_values_are_treated_as_unset() {
        let settings = ProviderSettings::from_map(vars(&[
            (ProviderSettings::OPENAI_KEY_ENV, "  "),
            (ProviderSettings::MISTRAL_KEY_ENV, "sk-mistral"),
        ]));
        assert!(settings.openai_api_key.is_none());
        assert_eq!(settings.mistral_api_key.as_deref(), Some("sk-mistral"));
    }

    #[test]
    fn parses_timeout_and_retries() {
        let settings = ProviderSettings::from_map(vars(&[
            ("SOLBENCH_TIMEOUT_SECS", "45"),
            ("SOLBENCH_MAX_RETRIES", "5"),
            ("SOLBENCH_OPENAI_ENDPOINT", "http://127.0.0.1:9999"),
        ]));
        assert_eq!(settings.timeout_secs, Some(45));
        assert_eq!(settings.max_retries, 5);
        assert_eq!(
            settings.openai_endpoint.as_deref(),
            Some("http://127.0.0.1:9999")
        );
    }
}
