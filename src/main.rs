use std::sync::Arc;

use anyhow::Context;
use axum::http::Method;
use socketioxide::SocketIo;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use callrelay::{
    accounts::AccountStore,
    broker::Broker,
    config::Config,
    handlers::{
        http::{self, HttpState},
        socket::on_connect,
    },
    identity::JwtAuthority,
    registry::PresenceRegistry,
};

// ── main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("reading configuration")?;
    if config.uses_default_secret() {
        warn!("[cfg] JWT_SECRET not set, tokens are signed with the built-in default");
    }

    // ── Core ──────────────────────────────────────────────────────────────────
    let tokens = Arc::new(JwtAuthority::new(&config.jwt_secret, config.token_ttl_secs));
    let registry = Arc::new(PresenceRegistry::new(tokens.clone(), config.require_credential));
    let broker = Broker::new(registry);

    // ── Socket.IO ─────────────────────────────────────────────────────────────
    let (sio_layer, io) = SocketIo::builder()
        .with_state(broker.clone())
        .build_layer();

    io.ns("/", on_connect);

    // ── HTTP ──────────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = http::router(HttpState { accounts: Arc::new(AccountStore::new()), tokens })
        .layer(sio_layer)
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("Server listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    broker.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("[-] Ctrl-C received, draining"),
        Err(e) => {
            warn!("[-] Could not listen for Ctrl-C, running until killed: {e}");
            std::future::pending::<()>().await
        }
    }
}
