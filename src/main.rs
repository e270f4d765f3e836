mod colors;
mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "winsetup")]
#[command(author, version, about = "Provision a fresh Windows installation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to WINSETUP_CONFIG or the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install applications from the catalog
    Install {
        /// Application names or package ids
        apps: Vec<String>,

        /// Install every catalog application
        #[arg(long, conflicts_with = "apps")]
        all: bool,

        /// Install several applications at once (2-4, based on the machine)
        #[arg(long)]
        parallel: bool,

        /// Retry failed installs this many times
        #[arg(long)]
        retries: Option<u32>,

        /// Skip the package manager and use direct downloads only
        #[arg(long)]
        direct_only: bool,
    },

    /// Report which applications are installed
    Check {
        /// Application names (all when empty)
        apps: Vec<String>,
    },

    /// List catalog applications
    List,

    /// Disable unneeded services
    Services {
        /// Show what would change without changing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove pre-installed bloatware packages
    Debloat {
        /// Show what would change without changing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply registry tweaks
    Tweaks {
        /// Show what would change without changing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Create or run provisioning profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },

    /// Generate shell completion scripts
    Completions {
        /// Target shell
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Write a profile selecting the whole catalog
    Init {
        /// Profile file to create
        file: PathBuf,
    },
    /// Run a profile
    Run {
        /// Profile file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    colors::init_colors();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Cancelling after the current step...", "!".yellow());
            on_interrupt.cancel();
        }
    });

    // Completions need no configuration, so the session is loaded per command
    let session = || commands::Session::load(cli.config.as_deref());

    match cli.command {
        Commands::Install {
            apps,
            all,
            parallel,
            retries,
            direct_only,
        } => {
            let options = commands::InstallOptions {
                parallel,
                retries,
                direct_only,
            };
            commands::install(&session()?, &apps, all, options, &cancel).await?;
        }
        Commands::Check { apps } => {
            commands::check(&session()?, &apps, &cancel).await?;
        }
        Commands::List => {
            commands::list(&session()?)?;
        }
        Commands::Services { dry_run } => {
            commands::services(&session()?, dry_run, &cancel).await?;
        }
        Commands::Debloat { dry_run } => {
            commands::debloat(&session()?, dry_run, &cancel).await?;
        }
        Commands::Tweaks { dry_run } => {
            commands::tweaks(&session()?, dry_run, &cancel).await?;
        }
        Commands::Profile { command } => match command {
            ProfileCommand::Init { file } => commands::profile::init(&session()?, &file)?,
            ProfileCommand::Run { file } => commands::profile::run(&session()?, &file, &cancel).await?,
        },
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "winsetup", &mut std::io::stdout());
        }
    }

    Ok(())
}
