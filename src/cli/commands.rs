//! CLI command definitions for itemforge.
//!
//! `itemforge run` treats every subdirectory of `--input` as one strategy.
//! Files inside hold one candidate per line (`id<TAB>feature=value,...`).
//! Candidates are merged across strategies, scored with a linear model and
//! written as JSON lines.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::filter::{AfterFilterPolicy, FilterChain};
use crate::generator::{CancellationFlag, GenerationReport, GeneratorConfig, ItemGenerator};
use crate::item::{Candidate, Item, MergeRule};
use crate::metrics::{export_metrics, init_metrics};
use crate::scoring::{parse_weight, LinearScorer};
use crate::sources::DirLineSource;
use crate::strategy::LineFileStrategy;

/// Candidate generation, deduplication, scoring and filtering.
#[derive(Parser)]
#[command(name = "itemforge")]
#[command(about = "Generate, merge, score and filter candidate items")]
#[command(version)]
#[command(
    long_about = "itemforge runs candidate generation strategies, merges duplicate candidates, scores them in batches and keeps the ones that pass the configured filters.\n\nExample usage:\n  itemforge run --input ./candidates --weight ctr=2.0 --weight recency=0.5 --top-k 100"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run one generation call over a directory of strategies.
    Run(RunArgs),
}

/// Arguments for `itemforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory whose subdirectories are the strategies.
    #[arg(short, long)]
    pub input: PathBuf,

    /// YAML generator configuration. Defaults come from ITEMFORGE_* variables.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Feature weight of the linear scorer, as name=value. Repeatable.
    #[arg(short, long = "weight", value_parser = parse_weight)]
    pub weights: Vec<(String, f64)>,

    /// Constant added to every score.
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    pub bias: f64,

    /// Items per scorer call (overrides the configuration).
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Drop scored items below this score before they are kept.
    #[arg(long, allow_hyphen_values = true)]
    pub min_score: Option<f64>,

    /// Keep only the K best-scoring items.
    #[arg(short = 'k', long, conflicts_with = "after_filter")]
    pub top_k: Option<usize>,

    /// After-filter policy: top_k=N, top_fraction=F, min_score=S, quantile=Q or above_mean.
    #[arg(long)]
    pub after_filter: Option<AfterFilterPolicy>,

    /// Merge rule for features reported by several strategies.
    #[arg(long, value_enum, default_value_t = MergeRule::Max)]
    pub merge_rule: MergeRule,

    /// Feature every candidate must carry to be modeled. Repeatable.
    #[arg(long = "require")]
    pub required: Vec<String>,

    /// Only read files whose name matches this regex.
    #[arg(long)]
    pub accept: Option<String>,

    /// Run strategies concurrently.
    #[arg(long)]
    pub concurrent: bool,

    /// Output file for JSON lines (default: stdout).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the generation report as JSON to stderr.
    #[arg(long)]
    pub report: bool,

    /// Print Prometheus metrics to stderr when done.
    #[arg(long)]
    pub metrics: bool,
}

/// Parse command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => {
            run_generate_command(args).await?;
        }
    }
    Ok(())
}

async fn run_generate_command(args: RunArgs) -> anyhow::Result<()> {
    if args.metrics {
        init_metrics().map_err(|e| anyhow::anyhow!("Failed to initialize metrics: {}", e))?;
    }

    let cancellation = CancellationFlag::new();
    let on_interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next stage boundary");
            on_interrupt.cancel();
        }
    });

    let (items, report) = generate_items(&args, cancellation).await?;
    write_items(&items, args.output.as_deref())?;

    if args.report {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| anyhow::anyhow!("Failed to serialize report: {}", e))?;
        eprintln!("{}", json);
    }

    if args.metrics {
        eprint!("{}", export_metrics());
    }

    Ok(())
}

/// Builds the generator described by `args` and runs one call.
async fn generate_items(
    args: &RunArgs,
    cancellation: CancellationFlag,
) -> anyhow::Result<(Vec<Candidate>, GenerationReport)> {
    let config = build_config(args)?;
    let strategies = discover_strategies(args)?;
    if strategies.is_empty() {
        anyhow::bail!(
            "No strategy directories found under {}",
            args.input.display()
        );
    }

    let scorer = args
        .weights
        .iter()
        .fold(LinearScorer::new().with_bias(args.bias), |scorer, (name, weight)| {
            scorer.with_weight(name.clone(), *weight)
        });

    let mut filters = FilterChain::<Candidate>::new();
    if let Some(min) = args.min_score {
        filters =
            filters.with_inner_filter(move |c: &Candidate| c.score().is_some_and(|s| s >= min));
    }

    let mut generator = ItemGenerator::new(scorer)
        .with_filters(filters)
        .with_config(config)
        .with_cancellation(cancellation);
    for strategy in strategies {
        generator = generator.with_strategy(strategy);
    }

    info!(
        input = %args.input.display(),
        strategies = ?generator.strategy_names(),
        batch_size = generator.config().batch_size,
        "Starting generation"
    );

    let mut items = Vec::new();
    let report = generator.generate(&mut items).await?;
    Ok((items, report))
}

fn build_config(args: &RunArgs) -> anyhow::Result<GeneratorConfig> {
    let mut config = match &args.config {
        Some(path) => GeneratorConfig::from_yaml_file(path)?,
        None => GeneratorConfig::from_env()?,
    };

    if let Some(size) = args.batch_size {
        config.batch_size = size;
    }
    if args.concurrent {
        config.concurrent_strategies = true;
    }
    if let Some(k) = args.top_k {
        config.after_filter = Some(AfterFilterPolicy::TopK { k });
    }
    if let Some(policy) = &args.after_filter {
        config.after_filter = Some(policy.clone());
    }

    config.validate()?;
    Ok(config)
}

/// One strategy per subdirectory of the input, in name order.
fn discover_strategies(args: &RunArgs) -> anyhow::Result<Vec<LineFileStrategy>> {
    let mut strategies = Vec::new();
    for entry in WalkDir::new(&args.input)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let mut source = DirLineSource::new(entry.path());
        if let Some(pattern) = &args.accept {
            source = source.accept(pattern)?;
        }

        let mut strategy =
            LineFileStrategy::new(name, source).with_merge_rule(args.merge_rule);
        for feature in &args.required {
            strategy = strategy.with_required_feature(feature.clone());
        }
        strategies.push(strategy);
    }
    Ok(strategies)
}

fn write_items(items: &[Candidate], output: Option<&Path>) -> anyhow::Result<()> {
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(writer);

    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writeln!(writer)?;
    }
    writer.flush()?;

    if let Some(path) = output {
        info!(path = %path.display(), items = items.len(), "Wrote items");
    }
    Ok(())
}
