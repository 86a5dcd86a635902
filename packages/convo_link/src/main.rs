use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::prelude::*;

use convo_link::{ClientConfig, ConvoPaths};

mod cli;

#[derive(Parser)]
#[command(name = "convo")]
#[command(about = "Follow and drive a remote coding agent's conversation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.convo)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the access token used to authenticate
    Login(LoginArgs),

    /// Forget the stored access token
    Logout,

    /// List sessions, marking the ones a live agent is driving
    Sessions(ListArgs),

    /// List remote agents
    Agents(ListArgs),

    /// Follow a session, sending stdin lines as input
    Watch(WatchArgs),
}

#[derive(Parser)]
struct LoginArgs {
    /// Access token issued by the server
    #[arg(long)]
    token: String,
}

#[derive(Parser)]
struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct WatchArgs {
    /// Session id (default: the first session a live agent is driving)
    session: Option<String>,

    /// Only show stored history, do not attach
    #[arg(long, requires = "session")]
    history_only: bool,

    /// Start a new session instead of attaching
    #[arg(long, conflicts_with_all = ["session", "history_only"])]
    start: bool,

    /// Agent to start the new session on
    #[arg(long, requires = "start")]
    agent: Option<String>,
}

fn init_logging(debug: bool) {
    let default_directive = if debug {
        "convo=debug,convo_link=debug,convo_wire=debug,info"
    } else {
        "convo=info,convo_link=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let paths = ConvoPaths::new(cli.data_dir).context("Failed to prepare data directory")?;
    let config = ClientConfig::load(&paths.data_dir).context("Failed to load configuration")?;
    debug!("Server: {}", config.server_url);

    match cli.command {
        Commands::Login(args) => cli::login_command(&paths, &args.token),
        Commands::Logout => cli::logout_command(&paths),
        Commands::Sessions(args) => cli::sessions_command(&paths, config, args.json).await,
        Commands::Agents(args) => cli::agents_command(&paths, config, args.json).await,
        Commands::Watch(args) => {
            let target = if args.start {
                cli::watch::Target::Start { agent: args.agent }
            } else {
                match args.session {
                    Some(session_id) if args.history_only => {
                        cli::watch::Target::HistoryOnly { session_id }
                    }
                    Some(session_id) => cli::watch::Target::Attach { session_id },
                    None => cli::watch::Target::FirstLive,
                }
            };
            cli::watch::watch_command(&paths, config, target).await
        }
    }
}
