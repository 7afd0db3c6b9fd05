use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "contaflow")]
#[command(
    author,
    version,
    about = "Classify bank transactions against a chart of accounts"
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the chart of accounts (and curated examples) into a database
    Migrate {
        /// Chart of accounts CSV
        #[arg(long)]
        chart: PathBuf,

        /// Curated training examples CSV
        #[arg(long)]
        training: Option<PathBuf>,

        /// SQLite database path
        #[arg(long)]
        db: PathBuf,
    },

    /// Train the text model and write its artifact
    Train {
        /// Read chart and examples from this database
        #[arg(long, conflicts_with_all = ["chart", "training"])]
        db: Option<PathBuf>,

        /// Chart of accounts CSV
        #[arg(long, required_unless_present = "db")]
        chart: Option<PathBuf>,

        /// Curated training examples CSV
        #[arg(long)]
        training: Option<PathBuf>,

        /// Model artifact to write
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Classify a transactions CSV
    Classify(ClassifyArgs),
}

#[derive(Args, Debug, Default)]
pub struct ClassifyArgs {
    /// TOML run configuration; flags below override its values
    #[arg(short, long, env = "CONTAFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Transactions CSV
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Classified CSV to write
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Trained model artifact
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Chart of accounts CSV
    #[arg(long, conflicts_with = "knowledge_db")]
    pub knowledge_csv: Option<PathBuf>,

    /// Database holding the chart of accounts
    #[arg(long)]
    pub knowledge_db: Option<PathBuf>,

    /// Database receiving the classification history
    #[arg(long)]
    pub history_db: Option<PathBuf>,

    /// Model confidence below which rows are flagged for review
    #[arg(long)]
    pub review_threshold: Option<f64>,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "contaflow=debug,contaflow_classify=debug,contaflow_storage=debug"
    } else {
        "contaflow=info,contaflow_classify=info,contaflow_storage=warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Migrate { chart, training, db } => {
            commands::migrate(&chart, training.as_deref(), &db).await?;
        }
        Commands::Train {
            db,
            chart,
            training,
            output,
        } => {
            let source = match (db, chart) {
                (Some(db), _) => commands::TrainingSource::Database(db),
                (None, Some(chart)) => commands::TrainingSource::Csv { chart, training },
                (None, None) => anyhow::bail!("either --db or --chart is required"),
            };
            commands::train(&source, &output).await?;
        }
        Commands::Classify(args) => {
            let config = commands::resolve_config(&args)?;
            commands::classify(&config).await?;
        }
    }

    Ok(())
}
