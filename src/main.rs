mod cli;
mod server;
mod tools;

use anyhow::Result;
use chronicle::catalog::types::Level;
use chronicle::config::ChronicleConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chronicle", version, about = "Bounded, topically diverse article histories over MCP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio unless --http or server.transport = "http")
    Serve {
        /// Serve Streamable HTTP on server.host:server.port instead of stdio
        #[arg(long)]
        http: bool,
    },
    /// Import articles with precomputed embeddings from a JSON-lines file
    Import {
        file: PathBuf,
    },
    /// Subscribe a user to a topic (creates both if missing)
    Subscribe {
        user: String,
        topic: String,
        #[arg(long, default_value = "intermediate")]
        level: Level,
        /// Display name for the user
        #[arg(long)]
        name: Option<String>,
        /// Comma-separated topic keywords
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,
    },
    /// Remove a subscription
    Unsubscribe {
        user: String,
        topic: String,
    },
    /// Build the first history for a user and topic
    Populate {
        user: String,
        topic: String,
        /// RFC 3339 timestamp or YYYY-MM-DD; articles published before it are considered
        cutoff: String,
    },
    /// Merge articles published since the watermark into a history
    Merge {
        user: String,
        topic: String,
        /// RFC 3339 timestamp or YYYY-MM-DD; upper bound of the new-article window
        as_of: String,
    },
    /// Show the retained articles of a history
    Show {
        user: String,
        topic: String,
        /// Also print this many recent operations from the audit log
        #[arg(long, default_value_t = 0)]
        log: usize,
    },
    /// Summarize every populated history
    Stats,
    /// Run database diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = ChronicleConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { http } => {
            if http || config.server.transport == "http" {
                server::serve_http(config).await?;
            } else {
                server::serve_stdio(config).await?;
            }
        }
        Command::Import { file } => cli::import::import(&config, &file)?,
        Command::Subscribe {
            user,
            topic,
            level,
            name,
            keywords,
        } => cli::subscribe::subscribe(&config, &user, &topic, level, name.as_deref(), &keywords)?,
        Command::Unsubscribe { user, topic } => cli::subscribe::unsubscribe(&config, &user, &topic)?,
        Command::Populate { user, topic, cutoff } => {
            cli::history::populate(&config, &user, &topic, &cutoff)?
        }
        Command::Merge { user, topic, as_of } => cli::history::merge(&config, &user, &topic, &as_of)?,
        Command::Show { user, topic, log } => cli::history::show(&config, &user, &topic, log)?,
        Command::Stats => cli::stats::stats(&config)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
