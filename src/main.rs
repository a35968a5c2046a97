mod calc;
mod db;
mod enrollment;
mod error;
mod grading;
mod ipc;
mod shape;
mod submission;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Grade and enrollment sidecar. Speaks newline-delimited JSON on stdin/stdout.
#[derive(Debug, Parser)]
#[command(name = "lmsd", version)]
struct Cli {
    /// Workspace directory to open at start-up.
    #[arg(long)]
    workspace: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_env("LMSD_LOG")
        .unwrap_or_else(|_| "lmsd=info".into());

    // stdout carries the protocol; logs go to stderr only.
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(io::stderr),
                )
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(false),
                )
                .init();
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };

    if let Some(path) = cli.workspace {
        match db::open_db(&path) {
            Ok(conn) => {
                tracing::info!(workspace = %path.display(), "workspace opened");
                state.workspace = Some(path);
                state.db = Some(conn);
            }
            Err(e) => {
                tracing::error!(workspace = %path.display(), error = ?e, "workspace open failed");
                std::process::exit(1);
            }
        }
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "lmsd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request line");
                // No id to echo back.
                ipc::err("", "bad_json", e.to_string(), None)
            }
        };

        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    tracing::info!("stdin closed, exiting");
}
