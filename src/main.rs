//! preftune CLI - preference labeling + DPO-style fine-tuning pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use preftune::{
    dataset, Config, DirStageStore, ModelLoader, PipelineOutcome, PipelineRunner,
};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "preftune")]
#[command(version)]
#[command(about = "Preference labeling and DPO-style fine-tuning with stage caching")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "preftune.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the preference-collection + training pipeline
    Run {
        /// Path to the input dataset CSV (overrides config)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Base model identifier (overrides config)
        #[arg(short, long)]
        base_model: Option<String>,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# preftune configuration
# All fields are optional; defaults shown.

[data]
dataset = "data/dataset.csv"

[debug]
dir = "debug"

[models]
dir = "models"

[model]
base_id = "gpt2-tiny"
cache_dir = "models/base"

[training]
learning_rate = 1e-5
max_seq_len = 256
"#;
    println!("{example}");
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
            Ok(())
        }

        Commands::Validate => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            info!("Configuration is valid");
            info!("  Dataset:     {}", config.data.dataset.display());
            info!("  Debug dir:   {}", config.debug.dir.display());
            info!("  Models dir:  {}", config.models.dir.display());
            info!("  Base model:  {}", config.model.base_id);
            info!("  Learn rate:  {}", config.training.learning_rate);
            Ok(())
        }

        Commands::Run {
            dataset: dataset_override,
            base_model,
        } => {
            let mut config = Config::load_or_default(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
            if let Some(path) = dataset_override {
                config.data.dataset = path;
            }
            if let Some(id) = base_model {
                config.model.base_id = id;
            }

            if let Some(parent) = config.data.dataset.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create data dir {parent:?}"))?;
            }

            info!("Reading dataset...");
            let rows = dataset::read_raw_dataset(&config.data.dataset)?;
            info!(rows = rows.len(), "Dataset loaded");

            let store = DirStageStore::new(&config.debug.dir)?;
            let loader = ModelLoader::new(&config.model.cache_dir);
            let runner = PipelineRunner::new(&store, &config.models.dir);

            let (outcome, summary) = runner.run(&rows, || {
                loader.load(&config.model.base_id, config.training.learning_rate)
            })?;

            println!("\n=== Pipeline Complete ===");
            println!("Rows:        {}", summary.rows_read);
            println!("Accepted:    {}", summary.accepted);
            println!("Rejected:    {}", summary.rejected);
            println!("Acceptance:  {:.1}%", summary.acceptance_rate * 100.0);
            println!("Steps:       {}", summary.steps);
            println!("Mean loss:   {:.4}", summary.mean_loss);
            println!("Runtime:     {:.1}s", summary.runtime_secs);
            match outcome {
                PipelineOutcome::Trained(checkpoint) => {
                    println!("Checkpoint:  {}", checkpoint.dir.display());
                }
                PipelineOutcome::AlreadySatisfied { artifact } => {
                    println!("Checkpoint:  already satisfied ({artifact})");
                }
            }

            Ok(())
        }
    }
}
