use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use musick_server::{api, backend, transport, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,musick_server=debug")),
        )
        .init();

    info!("Starting musick relay v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Wire the backend and shared state
    // -----------------------------------------------------------------------
    let backend = backend::connect(&config)?;
    let listen_addr = config.listen_addr;
    let http_addr = config.http_addr;
    let state = AppState::new(config, backend);

    // Idle rate limit buckets are purged in the background
    tokio::spawn(state.rate_limiter.clone().run_purge_loop());

    // -----------------------------------------------------------------------
    // 4. Run the command listener and the status API until shutdown
    // -----------------------------------------------------------------------
    let listener = TcpListener::bind(listen_addr).await?;

    tokio::select! {
        result = transport::serve(listener, state.clone()) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Command listener failed");
                return Err(e.into());
            }
        }
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
