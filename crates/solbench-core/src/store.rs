use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{ConfigurationError, GenerationError};
use crate::extract::extract_contract;
use crate::llm::ProviderRegistry;

/// Identifies one generation unit. Immutable once created; all cache
/// paths derive deterministically from it.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    document_id: String,
    model_id: String,
    temperature: f32,
    prompt_variant: String,
}

impl GenerationRequest {
    pub fn new(
        document_id: impl Into<String>,
        model_id: impl Into<String>,
        temperature: f32,
        prompt_variant: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        if !(0.0..=2.0).contains(&temperature) || !temperature.is_finite() {
            return Err(ConfigurationError::InvalidTemperature(temperature));
        }
        Ok(Self {
            document_id: document_id.into(),
            model_id: model_id.into(),
            temperature,
            prompt_variant: prompt_variant.into(),
        })
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn prompt_variant(&self) -> &str {
        &self.prompt_variant
    }

    /// `<document>_t<temperature>`, the stem shared by all artifact files.
    pub fn artifact_id(&self) -> String {
        format!("{}_t{}", self.document_id, format_temperature(self.temperature))
    }
}

// Fixed one-decimal rendering keeps cache paths identical across runs.
fn format_temperature(temperature: f32) -> String {
    format!("{temperature:.1}")
}

/// On-disk locations for one generation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub raw: PathBuf,
    pub source: PathBuf,
    pub report: PathBuf,
}

/// A cached or freshly generated artifact. `cached` records whether the
/// provider was consulted for this call.
#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub request: GenerationRequest,
    pub paths: ArtifactPaths,
    pub source: String,
    pub cached: bool,
}

/// Idempotent on-disk cache keyed by (document, temperature, prompt,
/// model). Layout:
/// `root/<model>/<iteration>/<variant>/<stem>/{raw,sc,vul}/...`.
pub struct ArtifactStore {
    root: PathBuf,
    iteration: String,
    providers: Arc<ProviderRegistry>,
}

impl ArtifactStore {
    pub fn new(
        root: impl Into<PathBuf>,
        iteration: impl Into<String>,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            root: root.into(),
            iteration: iteration.into(),
            providers,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one unit's `raw/`, `sc/` and `vul/` subtrees.
    pub fn unit_dir(&self, request: &GenerationRequest) -> PathBuf {
        self.root
            .join(request.model_id())
            .join(&self.iteration)
            .join(request.prompt_variant())
            .join(request.document_id())
    }

    pub fn paths(&self, request: &GenerationRequest) -> ArtifactPaths {
        let unit = self.unit_dir(request);
        let stem = request.artifact_id();
        ArtifactPaths {
            raw: unit.join("raw").join(format!("{stem}_raw.txt")),
            source: unit.join("sc").join(format!("{stem}.sol")),
            report: unit.join("vul").join(format!("{stem}.sol.json")),
        }
    }

    /// Return the cached artifact, or generate it once.
    ///
    /// Idempotence invariant: for a fixed request, the provider is called
    /// at most once unless `overwrite` is true — generation is billed.
    /// The raw response is persisted unconditionally, even when the later
    /// extraction fails, so failed units can be examined postmortem.
    pub async fn get_or_create(
        &self,
        request: &GenerationRequest,
        prompt: &str,
        overwrite: bool,
    ) -> Result<ArtifactRecord, GenerationError> {
        let paths = self.paths(request);

        if paths.source.exists() && !overwrite {
            info!(
                artifact = %request.artifact_id(),
                model = request.model_id(),
                "contract already generated, reusing cached artifact"
            );
            let source = fs::read_to_string(&paths.source).map_err(|source| {
                GenerationError::Document {
                    path: paths.source.display().to_string(),
                    source,
                }
            })?;
            return Ok(ArtifactRecord {
                request: request.clone(),
                paths,
                source,
                cached: true,
            });
        }

        for dir in ["raw", "sc", "vul"] {
            let dir = self.unit_dir(request).join(dir);
            fs::create_dir_all(&dir).map_err(|source| GenerationError::Persist {
                path: dir.display().to_string(),
                source,
            })?;
        }

        let raw_text = self
            .providers
            .generate(request.model_id(), prompt, request.temperature())
            .await?;

        fs::write(&paths.raw, &raw_text).map_err(|source| GenerationError::Persist {
            path: paths.raw.display().to_string(),
            source,
        })?;
        debug!(path = %paths.raw.display(), "raw response persisted");

        let source = extract_contract(&raw_text, &request.artifact_id())?;
        fs::write(&paths.source, &source).map_err(|source| GenerationError::Persist {
            path: paths.source.display().to_string(),
            source,
        })?;

        Ok(ArtifactRecord {
            request: request.clone(),
            paths,
            source,
            cached: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::llm::ProviderClient;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        response: String,
    }

    #[async_trait]
    impl ProviderClient for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn supports(&self, _model_id: &str) -> bool {
            true
        }

        async fn generate(
            &self,
            _model_id: &str,
            _prompt: &str,
            _temperature: f32,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn store_with(
        root: &Path,
        response: &str,
    ) -> (ArtifactStore, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ProviderRegistry::new(
            vec![Box::new(CountingProvider {
                calls: Arc::clone(&calls),
                response: response.to_string(),
            })],
            0,
        );
        (
            ArtifactStore::new(root, "run1", Arc::new(registry)),
            calls,
        )
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("LeaseAgreement03", "gpt-4", 0.2, "PR1").unwrap()
    }

    #[test]
    fn temperature_outside_range_is_rejected() {
        let err = GenerationRequest::new("doc", "gpt-4", 2.5, "PR1").unwrap_err();
        assert!(matches!(
            err,
            crate::error::ConfigurationError::InvalidTemperature(_)
        ));
    }

    #[test]
    fn paths_follow_cache_layout() {
        let (store, _) = store_with(Path::new("/tmp/out"), "");
        let paths = store.paths(&request());
        assert_eq!(
            paths.source,
            Path::new("/tmp/out/gpt-4/run1/PR1/LeaseAgreement03/sc/LeaseAgreement03_t0.2.sol")
        );
        assert_eq!(
            paths.report,
            Path::new("/tmp/out/gpt-4/run1/PR1/LeaseAgreement03/vul/LeaseAgreement03_t0.2.sol.json")
        );
        assert!(paths.raw.ends_with("raw/LeaseAgreement03_t0.2_raw.txt"));
    }

    #[tokio::test]
    async fn second_call_reuses_cache_without_provider_call() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, calls) = store_with(
            tmp.path(),
            "prose\npragma solidity ^0.8.0;\ncontract Lease { }\nprose",
        );
        let request = request();

        let first = store.get_or_create(&request, "prompt", false).await.unwrap();
        let second = store.get_or_create(&request, "prompt", false).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.paths, second.paths);
        assert_eq!(first.source, second.source);
    }

    #[tokio::test]
    async fn overwrite_regenerates() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, calls) = store_with(
            tmp.path(),
            "pragma solidity ^0.8.0;\ncontract Lease { }",
        );
        let request = request();

        store.get_or_create(&request, "prompt", false).await.unwrap();
        let again = store.get_or_create(&request, "prompt", true).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!again.cached);
    }

    #[tokio::test]
    async fn raw_response_survives_extraction_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let (store, _) = store_with(tmp.path(), "I am unable to produce Solidity for this.");
        let request = request();

        let err = store
            .get_or_create(&request, "prompt", false)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Extraction(_)));

        let paths = store.paths(&request);
        assert!(paths.raw.exists(), "raw response kept for postmortem");
        assert!(!paths.source.exists(), "no silent empty artifact");
    }
}
