#![forbid(unsafe_code)]

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use regcheck_check::{Checker, LlmGateway};
use regcheck_server::{build_router, AppState, Config};

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            _ => {
                warn!("could not register signal handlers, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_json);

    let settings = config.gateway_settings();
    if !settings.is_configured() {
        warn!(
            provider = %settings.provider,
            "model provider is not fully configured; check requests will fail upstream"
        );
    }
    let prices = config.load_price_table()?;
    let gateway = LlmGateway::new(settings)?;
    let checker = Checker::new(Arc::new(gateway), config.check_options(), prices);

    let app = build_router(AppState::new(checker), config.max_body_bytes);
    let listener = TcpListener::bind(config.bind).await?;
    info!(
        bind = %config.bind,
        provider = %config.provider,
        model = %config.model,
        max_concurrent_calls = config.max_concurrent_calls,
        "regcheck-server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await?;
    info!("regcheck-server stopped");
    Ok(())
}
