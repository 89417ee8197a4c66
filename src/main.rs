//! hall-chat: terminal client for the hall admin assistant
//!
//! Talks to the admin backend's chat API, streaming replies over SSE.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use hall_chat::config::{self, ChatSettings, Config, Overrides};
use hall_chat::context::LogNotifier;
use hall_chat::Session;

mod repl;

#[derive(Parser)]
#[command(name = "hall-chat")]
#[command(about = "Chat with the hall admin assistant")]
#[command(version)]
struct Args {
    /// REST API base url
    #[arg(long, env = "HALL_CHAT_BASE_URL")]
    base_url: Option<String>,

    /// Bearer token for the admin API
    #[arg(long, env = "HALL_CHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Active hall id
    #[arg(long, env = "HALL_CHAT_HALL_ID")]
    hall: Option<i64>,

    /// Minimum milliseconds between partial renders of a streamed reply
    #[arg(long)]
    throttle_ms: Option<u64>,

    /// Automatic retries for transient send failures
    #[arg(long)]
    send_retries: Option<u32>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a single question and print the reply
    Ask {
        /// Question text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// List recent conversations for the active hall
    Conversations,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from ~/.hall-chat/.env or current dir)
    let env_path = Some(config::config_dir().join(".env")).filter(|p| p.exists());
    if let Some(path) = env_path {
        let _ = dotenvy::from_path(&path);
    } else {
        let _ = dotenvy::dotenv();
    }

    // Logs go to stderr so they never interleave with streamed text
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // CLI args > env vars (handled by clap) > config file > defaults
    let settings = ChatSettings::resolve(
        Overrides {
            base_url: args.base_url,
            api_token: args.token,
            hall_id: args.hall,
            throttle_ms: args.throttle_ms,
            send_retries: args.send_retries,
        },
        Config::load(),
    )
    .context("invalid configuration")?;

    let mut session = Session::new(settings, Arc::new(LogNotifier));

    match args.command {
        Some(Command::Ask { text }) => {
            let question = text.join(" ");
            let controller = session.controller_mut();
            controller
                .connect()
                .await
                .map_err(|e| anyhow::anyhow!(e.to_user_string()))?;
            repl::send(controller, &question).await?;
            session.logout();
        }
        Some(Command::Conversations) => {
            let controller = session.controller_mut();
            controller
                .connect()
                .await
                .map_err(|e| anyhow::anyhow!(e.to_user_string()))?;
            repl::print_conversations(&controller.store().conversations());
        }
        None => {
            print_banner(&session);
            repl::Repl::new(session)?.run().await?;
        }
    }

    Ok(())
}

fn print_banner(session: &Session) {
    use repl::colors;

    let settings = session.settings();
    println!();
    println!(
        "{}",
        colors::banner_accent(&format!("  hall-chat {}", env!("CARGO_PKG_VERSION")))
    );
    println!("{}", colors::separator(50));
    println!("{}", colors::banner_line("Server", settings.base_url.as_str()));
    println!(
        "{}",
        colors::banner_line(
            "Hall",
            &settings
                .hall_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "(none)".into())
        )
    );
    println!(
        "{}",
        colors::banner_line(
            "Auth",
            if settings.api_token.is_some() {
                "token"
            } else {
                "none"
            }
        )
    );
    println!("{}", colors::separator(50));
    println!();
}
