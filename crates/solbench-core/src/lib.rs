pub mod analysis;
pub mod batch;
pub mod error;
pub mod export;
pub mod extract;
pub mod llm;
pub mod metrics;
pub mod prompts;
pub mod store;

pub use analysis::{
    AnalysisReport, AnalysisRunner, ContainerExec, ContainerState, DockerCli, ExecOutput, Finding,
    ParserRegistry, RunnerConfig, Severity, SlitherParser, ToolOutput, ToolParser,
};
pub use batch::{score_existing, BatchConfig, BatchOrchestrator, DEFAULT_TEMPERATURES};
pub use error::{
    AnalysisError, ConfigurationError, ExtractionError, GenerationError, ParseError, ProviderError,
};
pub use export::{ReportRow, ReportTable};
pub use extract::extract_contract;
pub use llm::{ProviderClient, ProviderRegistry, ProviderSettings};
pub use metrics::{score, strip_comments, MetricRecord, ScoreWeights};
pub use store::{ArtifactRecord, ArtifactStore, GenerationRequest};
