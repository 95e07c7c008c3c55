//! `skin-search` command-line entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use skin_search::context::RunContext;
use skin_search::data::ManifestDataset;
use skin_search::extractor::GridPoolExtractor;
use skin_search::metrics::MonitoredMetric;
use skin_search::settings::SearchConfig;
use skin_search::{Study, report, search};

#[derive(Parser)]
#[command(
    name = "skin-search",
    version,
    about = "Hyperparameter search for a binary skin-lesion classifier"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run trials and write the reports
    Run(RunArgs),
    /// Regenerate the reports of a stored study without training
    Report(ReportArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// JSON search configuration; flags below override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Ledger connection string, e.g. sqlite:///db.sqlite3
    #[arg(long)]
    storage: Option<String>,
    #[arg(long)]
    study_name: Option<String>,
    #[arg(short = 'n', long)]
    n_trials: Option<usize>,
    /// Epoch budget per trial
    #[arg(long)]
    epochs: Option<u64>,
    /// val_accuracy or val_auc
    #[arg(long)]
    metric: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
    /// Directory with the image files
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    train_csv: Option<PathBuf>,
    #[arg(long)]
    validation_csv: Option<PathBuf>,
    #[arg(long)]
    test_csv: Option<PathBuf>,
    /// Parent of the numbered run directories
    #[arg(long)]
    output_root: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ReportArgs {
    #[arg(long, default_value = "sqlite:///db.sqlite3")]
    storage: String,
    #[arg(long, default_value = "Skin_Problem")]
    study_name: String,
    #[arg(long, default_value = "outputs/search")]
    output_root: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skin_search=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Report(args) => cmd_report(&args),
    }
}

fn load_config(args: RunArgs) -> anyhow::Result<SearchConfig> {
    let mut config = match &args.config {
        Some(path) => SearchConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SearchConfig::default(),
    };

    if let Some(storage) = args.storage {
        config.storage = storage;
    }
    if let Some(name) = args.study_name {
        config.study_name = name;
    }
    if let Some(n) = args.n_trials {
        config.n_trials = n;
    }
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(metric) = args.metric {
        config.metric = metric.parse::<MonitoredMetric>()?;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(dir) = args.data_dir {
        config.data.image_dir = dir;
    }
    if let Some(path) = args.train_csv {
        config.data.train_csv = path;
    }
    if let Some(path) = args.validation_csv {
        config.data.validation_csv = path;
    }
    if let Some(path) = args.test_csv {
        config.data.test_csv = path;
    }
    if let Some(root) = args.output_root {
        config.output_root = root;
    }

    config.validate().context("invalid search configuration")?;
    Ok(config)
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let context = RunContext::create(&config.output_root).with_context(|| {
        format!(
            "failed to create a run directory under {}",
            config.output_root.display()
        )
    })?;
    config
        .save(&context.config_path())
        .context("failed to copy the search configuration")?;

    let (height, width) = (config.data.image_height, config.data.image_width);
    let data = ManifestDataset::open(&config.data.manifest_splits(), config.seed)
        .context("failed to read the image manifests")?
        .with_image_size(height, width);
    let (h, w) = (height as usize, width as usize);
    let extractor = GridPoolExtractor::new(h, w, 8.min(h), 6.min(w));

    let study = search::open_study(&config)
        .with_context(|| format!("failed to open study '{}'", config.study_name))?;
    let summary = search::run_search(
        &study,
        &config,
        Arc::new(extractor),
        Arc::new(data),
        &context,
    )
    .context("search aborted")?;
    tracing::info!(
        completed = summary.completed,
        pruned = summary.pruned,
        failed = summary.failed,
        run = %context.dir().display(),
        "search finished"
    );

    report::write_reports(&study, &context).context("failed to write reports")?;
    if let Ok(best) = study.best_trial() {
        print!("{}", report::format_best_trial(&best));
    }
    Ok(())
}

fn cmd_report(args: &ReportArgs) -> anyhow::Result<()> {
    let storage = skin_search::storage::open(&args.storage)
        .with_context(|| format!("failed to open ledger {}", args.storage))?;
    let study = Study::builder()
        .name(&args.study_name)
        .shared_storage(storage)
        .load()
        .with_context(|| format!("failed to load study '{}'", args.study_name))?;
    let context = RunContext::create(&args.output_root)?;

    report::write_reports(&study, &context).context("failed to write reports")?;
    tracing::info!(
        study = %args.study_name,
        run = %context.dir().display(),
        "reports written"
    );
    Ok(())
}
