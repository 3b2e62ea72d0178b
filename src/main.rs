use anyhow::Result;
use payreq::{
    config::Config,
    handlers::{router, AppState},
    services::*,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting payreq v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    let store = Store::open(&config.database_url).await?;

    let tokens = match &config.access_token_key {
        Some(key) => TokenCipher::from_hex(key)?,
        None => {
            let (cipher, _) = TokenCipher::generate();
            tracing::warn!("ACCESS_TOKEN_KEY not set; issued links stop working on restart");
            cipher
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.mail_relay_url {
        Some(url) => Arc::new(HttpNotifier::new(url.clone())),
        None => {
            tracing::warn!("MAIL_RELAY_URL not set; notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    let mut payments = PaymentService::new(
        store.clone(),
        tokens,
        notifier,
        config.public_base_url.clone(),
    )
    .with_paging(Paging {
        default_page_size: config.default_page_size,
        max_page_size: config.max_page_size,
    });
    if let Some(url) = &config.quote_service_url {
        payments = payments.with_quotes(Arc::new(QuoteService::new(
            url.clone(),
            config.quote_cache_ttl,
        )));
    }

    let app = router(AppState::new(store, payments));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl+c: {}", e);
    }
    tracing::info!("Shutting down gracefully...");
}
