use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::analysis::{AnalysisReport, AnalysisRunner, ContainerExec, ParserRegistry};
use crate::error::ConfigurationError;
use crate::export::{ReportRow, ReportTable};
use crate::llm::ProviderRegistry;
use crate::metrics::{score, ScoreWeights};
use crate::prompts;
use crate::store::{ArtifactStore, GenerationRequest};

/// Standard sampling grid for temperature-sensitivity comparisons.
pub const DEFAULT_TEMPERATURES: [f32; 5] = [0.0, 0.2, 0.5, 0.7, 1.0];

/// Everything the orchestrator needs, passed in explicitly instead of
/// read from ambient process state.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub documents_dir: PathBuf,
    pub output_root: PathBuf,
    pub models: Vec<String>,
    pub temperatures: Vec<f32>,
    pub prompt_variants: Vec<String>,
    /// Label for this evaluation round; one directory layer in the cache.
    pub iteration: String,
    pub overwrite: bool,
    pub tool: String,
}

impl BatchConfig {
    /// Fail fast on unknown tool or prompt-variant identifiers, before
    /// any provider or container work begins.
    fn validate(&self, parsers: &ParserRegistry) -> Result<(), ConfigurationError> {
        parsers.get(&self.tool)?;
        for variant in &self.prompt_variants {
            prompts::variant(variant)?;
        }
        for temperature in &self.temperatures {
            if !(0.0..=2.0).contains(temperature) {
                return Err(ConfigurationError::InvalidTemperature(*temperature));
            }
        }
        Ok(())
    }
}

/// Drives the full Cartesian product {documents x temperatures x
/// (model, prompt variant)}: generation (cached), analysis (cached),
/// scoring, and the per-(model, iteration) CSV export.
///
/// Failure of one unit never aborts the batch; the unit is logged and
/// omitted from the export.
pub struct BatchOrchestrator<E: ContainerExec> {
    config: BatchConfig,
    store: ArtifactStore,
    runner: AnalysisRunner<E>,
    parsers: ParserRegistry,
    weights: ScoreWeights,
}

impl<E: ContainerExec> std::fmt::Debug for BatchOrchestrator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator").finish_non_exhaustive()
    }
}

impl<E: ContainerExec> BatchOrchestrator<E> {
    pub fn new(
        config: BatchConfig,
        providers: Arc<ProviderRegistry>,
        runner: AnalysisRunner<E>,
        parsers: ParserRegistry,
        weights: ScoreWeights,
    ) -> Result<Self, ConfigurationError> {
        config.validate(&parsers)?;
        let store = ArtifactStore::new(
            config.output_root.clone(),
            config.iteration.clone(),
            providers,
        );
        Ok(Self {
            config,
            store,
            runner,
            parsers,
            weights,
        })
    }

    /// Run the whole batch and return the paths of the written exports.
    pub async fn run(&self) -> Result<Vec<PathBuf>> {
        let documents = self.list_documents()?;
        if documents.is_empty() {
            bail!(
                "documents directory `{}` contains no input files",
                self.config.documents_dir.display()
            );
        }

        let mut exports = Vec::new();
        for model in &self.config.models {
            let mut table = ReportTable::new();
            for (stem, path) in &documents {
                let agreement = match fs::read_to_string(path) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(document = %path.display(), error = %err, "skipping unreadable document");
                        continue;
                    }
                };
                for &temperature in &self.config.temperatures {
                    for variant_id in &self.config.prompt_variants {
                        if let Some(row) = self
                            .process_unit(model, stem, &agreement, temperature, variant_id)
                            .await
                        {
                            table.push(row);
                        }
                    }
                }
            }
            if table.is_empty() {
                warn!(model, "no units succeeded, skipping export");
                continue;
            }
            let export = self.export_path(model, &self.config.iteration);
            table
                .write_csv(&export)
                .with_context(|| format!("failed to write export `{}`", export.display()))?;
            info!(model, rows = table.len(), path = %export.display(), "export written");
            exports.push(export);
        }
        Ok(exports)
    }

    /// One unit of the product. `None` means the unit was skipped and
    /// logged; the batch continues.
    async fn process_unit(
        &self,
        model: &str,
        document: &str,
        agreement: &str,
        temperature: f32,
        variant_id: &str,
    ) -> Option<ReportRow> {
        let request = match GenerationRequest::new(document, model, temperature, variant_id) {
            Ok(request) => request,
            Err(err) => {
                warn!(document, model, temperature, error = %err, "invalid generation request");
                return None;
            }
        };
        // Validated at construction time, so this cannot fail here.
        let variant = prompts::variant(variant_id).ok()?;
        let prompt = variant.render(agreement);

        let record = match self
            .store
            .get_or_create(&request, &prompt, self.config.overwrite)
            .await
        {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    artifact = %request.artifact_id(),
                    model,
                    error = %err,
                    "generation failed, skipping downstream analysis"
                );
                return None;
            }
        };

        let report = match self.analyze_unit(&record.paths.report, &record.paths.source, &record.source, &request).await {
            Ok(report) => report,
            Err(err) => {
                warn!(
                    artifact = %request.artifact_id(),
                    error = %err,
                    "analysis failed, unit omitted from metrics"
                );
                return None;
            }
        };

        let record = score(&record.source, &report, &self.weights);
        Some(ReportRow {
            prompt_variant: variant_id.to_string(),
            document: document.to_string(),
            model: model.to_string(),
            temperature,
            record,
        })
    }

    /// Cache-or-compute for the analysis side-car, mirroring the
    /// artifact cache: an existing report is reused unless overwrite is
    /// requested.
    async fn analyze_unit(
        &self,
        report_path: &Path,
        source_path: &Path,
        source: &str,
        request: &GenerationRequest,
    ) -> Result<AnalysisReport> {
        if report_path.exists() && !self.config.overwrite {
            info!(artifact = %request.artifact_id(), "reusing persisted analysis report");
            return Ok(AnalysisReport::load(report_path)?);
        }

        let rel = source_path
            .strip_prefix(self.store.root())
            .with_context(|| {
                format!(
                    "artifact `{}` lies outside the mounted root",
                    source_path.display()
                )
            })?;
        let output = self.runner.analyze(rel, source).await?;
        let parser = self.parsers.get(&self.config.tool)?;
        let report = parser.parse(&request.artifact_id(), &output)?;
        report
            .save(report_path)
            .with_context(|| format!("failed to persist report `{}`", report_path.display()))?;
        Ok(report)
    }

    fn export_path(&self, model: &str, iteration: &str) -> PathBuf {
        self.config
            .output_root
            .join(format!("{model}_{iteration}_metrics.csv"))
    }

    fn list_documents(&self) -> Result<Vec<(String, PathBuf)>> {
        let dir = &self.config.documents_dir;
        let entries = fs::read_dir(dir)
            .with_context(|| format!("failed to read documents directory `{}`", dir.display()))?;
        let mut documents = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            documents.push((stem.to_string(), path));
        }
        documents.sort();
        Ok(documents)
    }
}

/// Re-score an already generated tree without touching providers or the
/// container: walk `root/<model>/<iteration>/<variant>/<doc>/sc` and
/// rebuild one export per (model, iteration). Directories that do not
/// match the expected shape are logged and skipped.
pub fn score_existing(output_root: &Path, weights: &ScoreWeights) -> Result<Vec<PathBuf>> {
    let mut tables: BTreeMap<(String, String), ReportTable> = BTreeMap::new();

    for entry in WalkDir::new(output_root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|e| e.to_str()) != Some("sol")
        {
            continue;
        }
        let rel = match entry.path().strip_prefix(output_root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let parts: Vec<String> = rel
            .iter()
            .map(|part| part.to_string_lossy().into_owned())
            .collect();
        // <model>/<iteration>/<variant>/<document>/sc/<stem>.sol
        if parts.len() != 6 || parts[4] != "sc" {
            warn!(path = %rel.display(), "unexpected artifact location, skipping");
            continue;
        }
        let (model, iteration, variant, document) = (&parts[0], &parts[1], &parts[2], &parts[3]);
        let stem = match entry.path().file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_string(),
            None => continue,
        };
        let Some(temperature) = parse_temperature(&stem) else {
            warn!(artifact = %stem, "artifact name lacks temperature suffix, skipping");
            continue;
        };

        let report_path = entry
            .path()
            .parent()
            .and_then(Path::parent)
            .map(|unit| unit.join("vul").join(format!("{stem}.sol.json")));
        let Some(report_path) = report_path.filter(|p| p.exists()) else {
            warn!(artifact = %stem, "no persisted analysis report, skipping");
            continue;
        };
        let report = match AnalysisReport::load(&report_path) {
            Ok(report) => report,
            Err(err) => {
                warn!(artifact = %stem, error = %err, "unreadable report, unit dropped");
                continue;
            }
        };
        let source = match fs::read_to_string(entry.path()) {
            Ok(source) => source,
            Err(err) => {
                warn!(artifact = %stem, error = %err, "unreadable artifact, unit dropped");
                continue;
            }
        };

        let row = ReportRow {
            prompt_variant: variant.clone(),
            document: document.clone(),
            model: model.clone(),
            temperature,
            record: score(&source, &report, weights),
        };
        tables
            .entry((model.clone(), iteration.clone()))
            .or_default()
            .push(row);
    }

    let mut exports = Vec::new();
    for ((model, iteration), table) in tables {
        let export = output_root.join(format!("{model}_{iteration}_metrics.csv"));
        table
            .write_csv(&export)
            .with_context(|| format!("failed to write export `{}`", export.display()))?;
        info!(model, iteration, rows = table.len(), "export rebuilt");
        exports.push(export);
    }
    Ok(exports)
}

/// Parse the `_t<temperature>` suffix of an artifact stem.
fn parse_temperature(stem: &str) -> Option<f32> {
    let (_, temperature) = stem.rsplit_once("_t")?;
    temperature.parse().ok()
}
