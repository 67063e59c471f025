#![forbid(unsafe_code)]

//! `truelens`: misinformation verification chat client.
//!
//! Bootstraps configuration, the local chat database, and the streaming
//! agent connection, then runs either a one-shot verification (`--query`)
//! or an interactive prompt loop on stdin.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use truelens::agent::{AgentConnection, FallbackTransport};
use truelens::config::GlobalConfig;
use truelens::identity::{StoredIdentity, UserIdentity};
use truelens::media::{TranscribeClient, UploadClient};
use truelens::models::message::{Message, MessageKind, Sender};
use truelens::persistence::{db, ChatRepo};
use truelens::session::ChatSession;
use truelens::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "truelens", about = "Misinformation verification chat client", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// User id to run as (defaults to the `TRUELENS_USER_ID` env var).
    #[arg(long)]
    user: Option<String>,

    /// Resume a previously saved chat by id.
    #[arg(long)]
    chat: Option<String>,

    /// Run one verification for this query and exit.
    #[arg(long)]
    query: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("truelens client bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = GlobalConfig::load_from_path(&args.config)?;
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let database = db::connect(&config.db_file).await?;
    let repo = ChatRepo::new(database);
    info!("database connected");

    // ── Resolve identity ────────────────────────────────
    let uid = args
        .user
        .or_else(|| std::env::var("TRUELENS_USER_ID").ok())
        .unwrap_or_else(|| "local".to_owned());
    let who = UserIdentity {
        uid,
        display_name: None,
        email: None,
        photo_url: None,
    };
    let identity = match StoredIdentity::load(who.clone()).await {
        Ok(stored) => stored,
        Err(err) => {
            warn!(%err, "no session token found; continuing anonymously");
            StoredIdentity::with_token(who, String::new())
        }
    };
    let identity = Arc::new(identity);

    // ── Connect to the agent ────────────────────────────
    let (connection, runtime) = AgentConnection::connect(&config);
    if let Err(err) = connection.wait_until_open(Duration::from_secs(5)).await {
        warn!(%err, "agent socket not ready; verifications will use the HTTP fallback");
    }

    // Mirror the self-trimming thinking feed to stderr. The feed drops
    // lines on its own TTL, so this only shows what the agent is doing
    // right now; the full log history still arrives merged into the final
    // verification payload.
    let feed = connection.thinking_feed();
    let printer = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(200));
        let mut shown: Option<String> = None;
        loop {
            tick.tick().await;
            match feed.snapshot().await.last() {
                Some(line) if shown.as_deref() != Some(line.text.as_str()) => {
                    eprintln!("  · {}", line.text);
                    shown = Some(line.text.clone());
                }
                Some(_) => {}
                None => shown = None,
            }
        }
    });

    let http = reqwest::Client::new();
    let fallback = FallbackTransport::new(http.clone(), config.endpoints.verify_http_url.clone());
    let upload = config
        .endpoints
        .upload_url
        .clone()
        .map(|url| UploadClient::new(http.clone(), url));
    let transcribe = config
        .endpoints
        .transcribe_base_url
        .clone()
        .map(|url| TranscribeClient::new(http, url));

    let mut session = ChatSession::new(connection, fallback, upload, transcribe, repo, identity);
    if let Some(chat_id) = &args.chat {
        session.resume(chat_id).await?;
    }

    // ── Drive the conversation ──────────────────────────
    if let Some(query) = args.query {
        print_exchange(session.send_text(&query).await?);
    } else {
        interactive_loop(&mut session).await?;
    }

    if let Some(chat_id) = session.chat_id() {
        info!(chat_id, "conversation saved");
    }

    session.close().await;
    printer.abort();
    runtime.join().await;
    info!("truelens shut down");

    Ok(())
}

/// Read queries from stdin until EOF or an empty line.
async fn interactive_loop(session: &mut ChatSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("> ");
        let Some(line) = lines
            .next_line()
            .await
            .map_err(|err| AppError::Io(err.to_string()))?
        else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            break;
        }
        print_exchange(session.send_text(query).await?);
    }

    Ok(())
}

/// Print the bot half of one exchange.
fn print_exchange(appended: &[Message]) {
    for message in appended {
        if message.sender == Sender::Bot {
            if message.kind == Some(MessageKind::Verified) {
                println!("\n{}", message.content);
            } else {
                println!("{}", message.content);
            }
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
