//! Waypoint CLI
//!
//! Main entry point for the waypoint command-line tool.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use waypoint_agents::email::InMemoryMailbox;
use waypoint_cli::config::{project_config_path, user_config_path, LoggingSection};
use waypoint_cli::{commands, logging, ConfigLoader, Session};

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Waypoint - interruptible email and content agents", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Extra configuration file, applied over the user and project files
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Triage an email and review the assistant's actions
    Email {
        /// JSON file with author, to, subject, email_thread and id
        #[arg(short, long)]
        input: PathBuf,
        /// Thread to run or resume (defaults to the email id)
        #[arg(short, long)]
        thread: Option<String>,
    },

    /// Chat with the content manager
    Content {
        /// User whose memories are read and updated
        #[arg(short, long)]
        user: String,
        /// Thread to continue
        #[arg(short, long)]
        thread: Option<String>,
    },

    /// Show the latest checkpoint of a thread
    State {
        #[arg(short, long)]
        thread: String,
    },

    /// Delete a thread and its pending interrupts
    Cancel {
        #[arg(short, long)]
        thread: String,
    },

    /// Write the default configuration file
    Init {
        /// Write ./.waypoint/waypoint.toml instead of the user-level file
        #[arg(long)]
        project: bool,
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { project, force } = cli.command {
        logging::init_logging(&LoggingSection::default().level);
        let path = if project {
            project_config_path()
        } else {
            user_config_path().context("Could not determine home directory")?
        };
        if commands::init(&path, force)? {
            println!("Wrote {}", path.display());
        } else {
            println!("{} already exists (use --force to overwrite)", path.display());
        }
        return Ok(());
    }

    let mut loader = ConfigLoader::new();
    if let Some(path) = cli.config {
        loader = loader.with_explicit(path);
    }
    let config = loader.load()?;
    logging::init_logging(&config.logging.level);
    let session = Session::open(config).await?;

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();

    match cli.command {
        Commands::Email { input: path, thread } => {
            let email = commands::read_email(&path)?;
            let thread_id = thread
                .or_else(|| email.id.clone())
                .unwrap_or_else(commands::new_thread_id);
            commands::run_email(
                &session,
                session.runtime()?,
                InMemoryMailbox::new(),
                email,
                &thread_id,
                &mut input,
                &mut output,
            )
            .await?;
        }
        Commands::Content { user, thread } => {
            commands::run_content(&session, session.runtime()?, &user, thread, &mut input, &mut output)
                .await?;
        }
        Commands::State { thread } => {
            commands::show_state(&session, &thread, &mut output).await?;
        }
        Commands::Cancel { thread } => {
            commands::cancel(&session, &thread, &mut output).await?;
        }
        Commands::Init { .. } => {}
    }

    Ok(())
}
