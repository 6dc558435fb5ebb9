// crates/server/src/main.rs
//! Scanwatch binary.
//!
//! `scanwatch serve` (the default) runs the HTTP surface. `scan`, `refresh`
//! and `history` talk to the scan backend directly and show progress in the
//! terminal.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scanwatch_core::notifier::notice_text;
use scanwatch_core::{
    Config, HttpBackend, JobOutcome, JobPhase, JobRequest, JobTracker, ReportClient, SubjectKey,
    DEFAULT_REFRESH_DAYS,
};
use scanwatch_server::{create_app, init_metrics, AppState};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "scanwatch", version, about = "Security scan dashboard backend")]
struct Cli {
    /// TOML config file.
    #[arg(long, global = true, env = "SCANWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Scan backend base URL (overrides config and environment).
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "SCANWATCH_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long, short)]
        port: Option<u16>,
    },
    /// Scan one subject and wait for the result.
    Scan { subject: String },
    /// Re-ingest advisories for the last N days and wait for the result.
    Refresh {
        #[arg(long, default_value_t = DEFAULT_REFRESH_DAYS)]
        days: u32,
    },
    /// List past scans of a subject, or delete one.
    History {
        subject: String,
        /// Scan id to delete.
        #[arg(long)]
        delete: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    });

    // The terminal commands keep logs quiet so the spinner stays readable.
    let default_filter = match command {
        Command::Serve { .. } => "warn,scanwatch_core=info,scanwatch_server=info",
        _ => "warn",
    };
    init_tracing(default_filter, cli.log_json)?;

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(url) = cli.backend_url {
        config.backend.base_url = url;
        config.validate()?;
    }

    match command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Command::Scan { subject } => {
            let subject = SubjectKey::new(&subject)?;
            run_job(config, JobRequest::scan(subject)).await
        }
        Command::Refresh { days } => run_job(config, JobRequest::refresh(days)).await,
        Command::History { subject, delete } => history(config, &subject, delete.as_deref()).await,
    }
}

fn init_tracing(default_filter: &str, json: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))
}

async fn serve(config: Config) -> Result<()> {
    let startup_start = Instant::now();
    init_metrics();

    eprintln!("\n\u{1f6e1}  scanwatch v{}\n", env!("CARGO_PKG_VERSION"));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.server.host, config.server.port))?;
    let backend = config.backend.base_url.clone();

    let state = AppState::new(config)?;
    let app = create_app(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Prime the finding cache; a down backend only delays it until the first job.
    let findings = state.findings.clone();
    tokio::spawn(async move {
        if let Err(e) = findings.reload().await {
            tracing::warn!(error = %e, "Initial finding load failed");
        }
    });

    eprintln!(
        "  \u{2713} Ready in {}ms \u{2192} http://{}  (backend {})\n",
        startup_start.elapsed().as_millis(),
        addr,
        backend
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.tracker.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Drive one job to a terminal state with a spinner.
async fn run_job(config: Config, request: JobRequest) -> Result<()> {
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let tracker = JobTracker::new(backend, config.tracker.clone());
    let subject = request.subject();

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} {msg} [{elapsed}]")
            .context("spinner template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut rx = tracker.subscribe_all();
    let spinner = pb.clone();
    let ticker = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let Some((text, _)) = notice_text(&event.job) {
                let suffix = if event.job.checks > 0 {
                    format!(" ({} checks)", event.job.checks)
                } else {
                    String::new()
                };
                spinner.set_message(format!("{text}{suffix}"));
            }
        }
    });

    tracker.start(request);
    let job = tokio::select! {
        job = tracker.wait_for_terminal(&subject) => job,
        _ = tokio::signal::ctrl_c() => {
            tracker.cancel(&subject);
            tracker.get_state(&subject)
        }
    };
    ticker.abort();
    pb.finish_and_clear();

    let text = notice_text(&job).map(|(t, _)| t).unwrap_or_default();
    match (&job.phase, &job.outcome) {
        (JobPhase::Done, Some(JobOutcome::Done { payload })) => {
            eprintln!("  \u{2713} {text}");
            if !payload.is_null() {
                println!("{}", serde_json::to_string_pretty(payload)?);
            }
            Ok(())
        }
        _ => {
            eprintln!("  \u{2717} {text}");
            anyhow::bail!("{} did not complete", subject)
        }
    }
}

async fn history(config: Config, subject: &str, delete: Option<&str>) -> Result<()> {
    let backend = HttpBackend::new(&config.backend)?;

    if let Some(id) = delete {
        backend.delete_scan(id).await?;
        eprintln!("  \u{2713} Deleted scan {id}");
        return Ok(());
    }

    let subject = SubjectKey::new(subject)?;
    let mut scans = backend.list_scans(&subject).await?;
    if scans.is_empty() {
        eprintln!("  No scans for {subject}");
        return Ok(());
    }
    scans.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    println!("{:<26} {:<22} {:>8}", "ID", "SCANNED (UTC)", "FINDINGS");
    for scan in scans {
        let when = chrono::DateTime::from_timestamp(scan.timestamp, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| scan.timestamp.to_string());
        println!("{:<26} {:<22} {:>8}", scan.id, when, scan.findings_count);
    }
    Ok(())
}
