// src/main.rs
// MOC host entrypoint: load configuration, bring up the MCP Service and
// the upstream LLM provider, then serve the HTTP surface until a shutdown
// signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use moc_host::config::AppConfig;
use moc_host::llm::provider::OpenAIProvider;
use moc_host::mcp::McpService;
use moc_host::state::AppState;

/// Command-line overrides layered on top of the environment. Every flag
/// also has an env var fallback (`MCP_SERVERS_CONFIG`, `HOST`/`PORT`,
/// `LOG_DIR`); flags win when both are given.
#[derive(Debug, Parser)]
#[command(name = "moc-host", version)]
struct Cli {
    /// Path to the MCP server descriptor document.
    #[arg(long, env = "MCP_SERVERS_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP bind address, e.g. 0.0.0.0:8080.
    #[arg(long)]
    bind: Option<String>,

    /// Directory for log output (currently logs still go to stderr; this
    /// records the intended destination for future file-based sinks).
    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(descriptor_path) = cli.config {
        config.mcp.descriptor_path = descriptor_path;
    }
    if let Some(bind) = cli.bind {
        match parse_bind_address(&bind) {
            Ok((host, port)) => {
                config.server.host = host;
                config.server.port = port;
            }
            Err(e) => {
                error!("invalid --bind value '{bind}': {e}");
                std::process::exit(2);
            }
        }
    }
    if let Some(log_dir) = cli.log_dir {
        config.server.log_dir = Some(log_dir);
    }

    if let Err(e) = config.validate() {
        error!("invalid configuration: {e}");
        std::process::exit(2);
    }
    let config = Arc::new(config);

    info!("starting moc-host");

    let llm = match OpenAIProvider::new(config.llm.api_key.clone(), config.llm.model) {
        Ok(provider) => Arc::new(provider.with_timeout(std::time::Duration::from_secs(
            config.llm.request_timeout_secs,
        ))),
        Err(e) => {
            error!("failed to construct LLM provider: {e}");
            std::process::exit(2);
        }
    };

    let mcp = Arc::new(
        McpService::new().with_tool_call_timeout(std::time::Duration::from_secs(config.llm.tool_call_timeout_secs)),
    );
    let descriptors = match McpService::load_descriptors(&config.mcp.descriptor_path).await {
        Ok(descriptors) => descriptors,
        Err(e) => {
            warn!(
                "could not read MCP server descriptors from {}: {e}; starting with no servers",
                config.mcp.descriptor_path.display()
            );
            Vec::new()
        }
    };
    mcp.start(descriptors).await;
    info!("{} MCP server(s) connected", mcp.server_count().await);

    let state = AppState::new(mcp.clone(), llm, config.clone());
    state.mark_ready();

    let router = moc_host::api::http::create_router(state);

    let bind_address = config.server.bind_address();
    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {bind_address}: {e}");
            std::process::exit(3);
        }
    };
    info!("listening on {bind_address}");

    let shutdown_mcp = mcp.clone();
    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_mcp))
        .await;

    if let Err(e) = result {
        error!("server error: {e}");
        std::process::exit(1);
    }
}

fn parse_bind_address(raw: &str) -> Result<(String, u16), String> {
    let (host, port) = raw.rsplit_once(':').ok_or("expected host:port")?;
    let port: u16 = port.parse().map_err(|_| "port must be a number".to_string())?;
    Ok((host.to_string(), port))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

async fn shutdown_signal(mcp: Arc<McpService>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, closing MCP servers");
    mcp.shutdown().await;
}
