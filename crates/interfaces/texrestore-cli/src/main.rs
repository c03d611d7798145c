use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use texrestore_cli::{commands, EngineArgs};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about = "Find and restore texture backups")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List backups relevant to the textures in use
    Detect {
        #[command(flatten)]
        engine: EngineArgs,
        /// Texture inventory JSON
        #[arg(short, long)]
        inventory: Utf8PathBuf,
    },
    /// List backup sessions, newest first
    Sessions {
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Score every session against the textures in use
    Score {
        #[command(flatten)]
        engine: EngineArgs,
        #[arg(short, long)]
        inventory: Utf8PathBuf,
    },
    /// Restore the best matching backup
    Restore {
        #[command(flatten)]
        engine: EngineArgs,
        #[arg(short, long)]
        inventory: Utf8PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Detect { engine, inventory } => {
            commands::cmd_detect(engine, inventory).await?;
        }
        Commands::Sessions { engine } => {
            commands::cmd_sessions(engine).await?;
        }
        Commands::Score { engine, inventory } => {
            commands::cmd_score(engine, inventory).await?;
        }
        Commands::Restore { engine, inventory } => {
            commands::cmd_restore(engine, inventory).await?;
        }
    }

    Ok(())
}
