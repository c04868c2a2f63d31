// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use tasksyncd::cli::DaemonClient;
use tasksyncd::config::DaemonConfig;
use tasksyncd::{auth, ipc, AppContext};

#[derive(Parser)]
#[command(
    name = "tasksyncd",
    about = "Collaborative task daemon — real-time task/notification sync",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON-RPC WebSocket server port
    #[arg(long, env = "TASKSYNCD_PORT")]
    port: Option<u16>,

    /// Data directory for config, tokens, and the SQLite database
    #[arg(long, env = "TASKSYNCD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TASKSYNCD_LOG")]
    log: Option<String>,

    /// Bind address for the WebSocket server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "TASKSYNCD_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "TASKSYNCD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon server (default when no subcommand given).
    ///
    /// Runs tasksyncd in the foreground.
    ///
    /// Examples:
    ///   tasksyncd serve
    ///   tasksyncd
    Serve,
    /// Query a running daemon and print its health.
    ///
    /// Examples:
    ///   tasksyncd status
    ///   tasksyncd status --json
    Status {
        /// Print the raw JSON status document.
        #[arg(long)]
        json: bool,
    },
    /// Manage user access tokens.
    ///
    /// Tokens live in {data_dir}/user_tokens (mode 0600) and are picked up
    /// by the daemon without a restart.
    ///
    /// Examples:
    ///   tasksyncd token add u-alice
    ///   tasksyncd token list
    Token {
        #[command(subcommand)]
        cmd: TokenCmd,
    },
}

#[derive(Subcommand)]
enum TokenCmd {
    /// Mint a new token for a user id and print it once.
    Add {
        /// Stable user identifier the token resolves to.
        user_id: String,
    },
    /// List known users and token prefixes (never full tokens).
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Logging setup ────────────────────────────────────────────────────────
    // Init once — must happen before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();
    let log_format =
        std::env::var("TASKSYNCD_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    match args.command {
        Some(Command::Status { json }) => {
            let config = DaemonConfig::new(
                args.port,
                args.data_dir,
                Some("error".to_string()),
                args.bind_address,
            );
            let exit_code = run_status(&config, json).await;
            std::process::exit(exit_code);
        }
        Some(Command::Token { cmd }) => {
            let config = DaemonConfig::new(
                None,
                args.data_dir,
                Some("error".to_string()),
                None,
            );
            match cmd {
                TokenCmd::Add { user_id } => {
                    let token = auth::mint_token(&config.data_dir, &user_id)?;
                    println!("{token}");
                }
                TokenCmd::List => {
                    for (user, prefix) in auth::list_tokens(&config.data_dir)? {
                        println!("{user}\t{prefix}");
                    }
                }
            }
        }
        None | Some(Command::Serve) => {
            run_server(args.port, args.data_dir, args.log, args.bind_address).await?;
        }
    }

    Ok(())
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators like Loki/Elasticsearch).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("tasksyncd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}

// ── tasksyncd status ──────────────────────────────────────────────────────────

async fn run_status(config: &DaemonConfig, json: bool) -> i32 {
    let client = DaemonClient::new(config.port);
    match client.call_once("daemon.status", serde_json::json!({})).await {
        Ok(result) => {
            let version = result["version"].as_str().unwrap_or("?");
            let connections = result["connections"].as_u64().unwrap_or(0);
            let uptime_str = format_uptime(result["uptime"].as_u64().unwrap_or(0));

            if json {
                println!("{}", serde_json::to_string(&result).unwrap_or_default());
            } else {
                println!(
                    "tasksyncd {version} — Running ({connections} connections, uptime {uptime_str})"
                );
            }
            0
        }
        Err(_) => {
            if json {
                println!(r#"{{"status":"not_running"}}"#);
            } else {
                println!("tasksyncd: not running");
            }
            1
        }
    }
}

/// Format uptime seconds as "2h 14m" or "45m 3s".
fn format_uptime(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

// ── tasksyncd serve ───────────────────────────────────────────────────────────

async fn run_server(
    port: Option<u16>,
    data_dir: Option<std::path::PathBuf>,
    log: Option<String>,
    bind_address: Option<String>,
) -> Result<()> {
    let config = DaemonConfig::new(port, data_dir, log, bind_address);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        data_dir = %config.data_dir.display(),
        "starting tasksyncd"
    );

    let ctx = Arc::new(AppContext::new(config).await?);
    ipc::run(ctx).await
}
