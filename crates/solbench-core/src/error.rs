use thiserror::Error;

/// Failures raised while calling a model provider's remote endpoint.
///
/// No retries happen at this level beyond the transport retry knob; the
/// caller decides whether the unit is skipped or the batch aborts.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to reach {provider} endpoint")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider} response missing message content")]
    MissingContent { provider: &'static str },
    #[error("failed to decode {provider} response")]
    Decode {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// The model response carried no parseable contract source.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no `pragma solidity` declaration found in response for `{artifact}`")]
    NoContract { artifact: String },
}

/// Failures at the generation boundary (provider call, extraction, or
/// persistence of either output).
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("failed to read input document `{path}`")]
    Document {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to persist artifact file `{path}`")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while driving the analysis container or its tool pipeline.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },
    #[error("container `{container}` is unreachable: {detail}")]
    ContainerUnavailable { container: String, detail: String },
    #[error("`{command}` failed: {detail}")]
    CommandFailed { command: String, detail: String },
    #[error("tool produced non-empty, non-JSON output: {snippet}")]
    MalformedOutput { snippet: String },
}

/// Failures normalizing tool output into a report.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid {tool} JSON output")]
    InvalidJson {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("persisted report at `{path}` is unreadable")]
    SideCar {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal misconfiguration detected before any work begins.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no parser registered for analysis tool `{0}`")]
    UnknownTool(String),
    #[error("unknown prompt variant `{0}`")]
    UnknownPromptVariant(String),
    #[error("temperature {0} outside supported range 0.0..=2.0")]
    InvalidTemperature(f32),
    #[error("API key for provider `{provider}` must be set via {env_var}")]
    MissingApiKey {
        provider: &'static str,
        env_var: &'static str,
    },
}
