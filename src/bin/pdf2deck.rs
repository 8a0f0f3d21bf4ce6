//! Server binary for pdf2deck.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ServiceConfig`, initialises tracing, and runs the axum
//! server with graceful shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use pdf2deck::{router, AppState, ServiceConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run with AI analysis enabled
  GEMINI_API_KEY=... pdf2deck

  # Custom port and work directories
  pdf2deck --port 9000 --work-dir /var/lib/pdf2deck/work --output-dir /var/lib/pdf2deck/out

  # JSON-mode only (no API key needed; uploads must carry their artifact)
  pdf2deck

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY           Google Gemini API key (enables normal mode)
  GEMINI_MODEL             Model id (default: gemini-3-flash-preview)
  GEMINI_PAGE_DELAY_MS     Delay between page analyses (default: 500)
  CONVERTER_PRECISION_CMD  Precision converter executable
  CONVERTER_SAFEGUARD_CMD  Safeguard converter executable
  PDFIUM_LIB_PATH          Path to an existing libpdfium
  CORS_ORIGINS             Comma-separated allowed origins (default: any)

SETUP:
  1. Install a pdfium library (or set PDFIUM_LIB_PATH).
  2. Point CONVERTER_*_CMD at your PPTX converter executables.
  3. export GEMINI_API_KEY=... and run pdf2deck.
"#;

/// PDF → PPTX conversion web service.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2deck",
    version,
    about = "Convert PDF decks to editable PowerPoint via Vision LLMs",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Bind address.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port.
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Per-job working directory root.
    #[arg(long, env = "WORK_DIR", default_value = "temp_processing")]
    work_dir: PathBuf,

    /// Finished PPTX directory.
    #[arg(long, env = "OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Static frontend directory.
    #[arg(long, env = "STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2DECK_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let default_filter = if cli.verbose {
        "pdf2deck=debug,tower_http=debug"
    } else {
        "pdf2deck=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    // ── Configuration ────────────────────────────────────────────────────
    // Environment first, then CLI flags override the serving-related fields
    // (clap already resolved flag-vs-env precedence for those).
    let mut config = ServiceConfig::from_env().context("Invalid configuration")?;
    config.host = cli.host;
    config.port = cli.port;
    config.work_dir = cli.work_dir;
    config.output_dir = cli.output_dir;
    config.static_dir = cli.static_dir;

    tracing::info!(
        host = %config.host,
        port = config.port,
        ai_configured = config.gemini_api_key.is_some(),
        model = %config.gemini_model,
        "Loaded service configuration"
    );

    // ── Work directories ─────────────────────────────────────────────────
    for dir in [&config.work_dir, &config.output_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    // ── Serve ────────────────────────────────────────────────────────────
    let addr = SocketAddr::new(
        config.host.parse().context("Invalid HOST address")?,
        config.port,
    );
    let app = router(AppState::new(config));

    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server shuts
/// down cleanly whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
