mod chat;
mod cli;
mod openai_client;
mod server;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eyre::Result;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::chat::ChatService;
use crate::chat::conversation_state::ConversationStore;
use crate::cli::chat::ChatContext;
use crate::openai_client::{LlmConfig, OpenAiClient};
use crate::server::ServerConfig;

/// One year.
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Persist sessions as JSON files in this directory
    #[arg(long, global = true)]
    session_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the chat API over HTTP (default)
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(short, long, default_value_t = 5000)]
        port: u16,

        /// Serve static assets from this directory for unknown paths
        #[arg(long)]
        static_dir: Option<PathBuf>,

        /// Forget sessions idle for this many hours
        #[arg(
            long,
            default_value_t = 24,
            value_parser = clap::value_parser!(i64).range(1..=MAX_SESSION_TTL_HOURS)
        )]
        session_ttl_hours: i64,
    },
    /// Chat in the terminal
    Chat {
        /// Send a single message and exit
        #[arg(short, long)]
        input: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting KumTanesi");

    let store = match &cli.session_dir {
        Some(dir) => ConversationStore::persistent(dir)?,
        None => ConversationStore::in_memory(),
    };
    let generator = OpenAiClient::new(LlmConfig::from_env()?)?;
    let chat = Arc::new(ChatService::new(Arc::new(store), Arc::new(generator)));

    match cli.command {
        Some(Commands::Chat { input }) => {
            let mut chat_context = ChatContext::new(Box::new(io::stdout()), input, true, chat);
            chat_context.run().await
        }
        Some(Commands::Serve {
            host,
            port,
            static_dir,
            session_ttl_hours,
        }) => {
            let config = ServerConfig {
                host,
                port,
                static_dir,
                session_ttl: chrono::Duration::hours(session_ttl_hours),
            };
            server::serve(config, chat).await?;
            Ok(ExitCode::SUCCESS)
        }
        None => {
            server::serve(ServerConfig::default(), chat).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
