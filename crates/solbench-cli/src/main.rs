use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use solbench_core::{
    prompts, score_existing, AnalysisRunner, BatchConfig, BatchOrchestrator, DockerCli,
    ParserRegistry, ProviderRegistry, ProviderSettings, RunnerConfig, ScoreWeights,
    DEFAULT_TEMPERATURES,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "solbench",
    author,
    version,
    about = "Legal-agreement to Solidity generation benchmark"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate contracts, analyze them, and export metric tables
    Run(RunArgs),
    /// Rebuild metric exports from an already generated output tree
    Score(ScoreArgs),
    /// List the model identifiers each provider backend claims
    ListModels {
        /// Emit the tables as JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory of legal-agreement text files, one document per file
    #[arg(long, value_name = "DIR")]
    documents: PathBuf,

    /// Root of the artifact cache and metric exports
    #[arg(long, value_name = "DIR", default_value = "./output")]
    output: PathBuf,

    /// Model identifiers to evaluate
    #[arg(long, value_name = "MODEL", value_delimiter = ',', required = true)]
    models: Vec<String>,

    /// Sampling temperatures; defaults to the standard grid
    #[arg(long, value_name = "T", value_delimiter = ',')]
    temperatures: Vec<f32>,

    /// Prompt variant identifiers; defaults to every shipped variant
    #[arg(long, value_name = "ID", value_delimiter = ',')]
    variants: Vec<String>,

    /// Label for this evaluation round, one directory layer in the cache
    #[arg(long, default_value = "run1")]
    iteration: String,

    /// Regenerate and re-analyze even when cached artifacts exist
    #[arg(long)]
    overwrite: bool,

    /// Static-analysis tool to run inside the container
    #[arg(long, default_value = "slither")]
    tool: String,

    /// Name of the long-lived analysis container
    #[arg(long, default_value = "solbench-slither")]
    container: String,

    /// Image the container is created from on first use
    #[arg(long, default_value = "trailofbits/eth-security-toolbox")]
    image: String,

    /// Per-container-command timeout in seconds
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// Root of a previously generated output tree
    #[arg(long, value_name = "DIR", default_value = "./output")]
    output: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await?,
        Commands::Score(args) => rescore(&args)?,
        Commands::ListModels { json } => list_models(json)?,
    }
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let settings = ProviderSettings::from_env();
    let providers = Arc::new(
        ProviderRegistry::from_settings(&settings, &args.models)
            .context("provider configuration incomplete")?,
    );
    let runner = AnalysisRunner::new(
        DockerCli::new(args.timeout_secs),
        RunnerConfig::new(&args.container, &args.image, &args.output),
    );

    let temperatures = if args.temperatures.is_empty() {
        DEFAULT_TEMPERATURES.to_vec()
    } else {
        args.temperatures
    };
    let prompt_variants = if args.variants.is_empty() {
        prompts::all_variants()
            .iter()
            .map(|variant| variant.id.to_string())
            .collect()
    } else {
        args.variants
    };

    let config = BatchConfig {
        documents_dir: args.documents,
        output_root: args.output,
        models: args.models,
        temperatures,
        prompt_variants,
        iteration: args.iteration,
        overwrite: args.overwrite,
        tool: args.tool,
    };
    let orchestrator = BatchOrchestrator::new(
        config,
        providers,
        runner,
        ParserRegistry::with_defaults(),
        ScoreWeights::default(),
    )?;

    let exports = orchestrator.run().await?;
    for export in &exports {
        println!("{}", export.display());
    }
    Ok(())
}

fn rescore(args: &ScoreArgs) -> Result<()> {
    let exports = score_existing(&args.output, &ScoreWeights::default())?;
    if exports.is_empty() {
        println!("no scoreable artifacts under {}", args.output.display());
        return Ok(());
    }
    for export in &exports {
        println!("{}", export.display());
    }
    Ok(())
}

fn list_models(json: bool) -> Result<()> {
    use solbench_core::llm::{ANTHROPIC_MODELS, GOOGLE_MODELS, MISTRAL_MODELS, OPENAI_MODELS};

    let tables: [(&str, &[&str]); 4] = [
        ("openai", OPENAI_MODELS),
        ("mistral", MISTRAL_MODELS),
        ("google", GOOGLE_MODELS),
        ("anthropic", ANTHROPIC_MODELS),
    ];
    if json {
        let map: std::collections::BTreeMap<&str, &[&str]> = tables.into_iter().collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    for (provider, models) in tables {
        println!("{provider}:");
        for model in models {
            println!("  - {model}");
        }
    }
    Ok(())
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}
