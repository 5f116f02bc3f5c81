use anyhow::Context;
use rovo_stream::app::router;
use rovo_stream::config::AppConfig;
use rovo_stream::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load config")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if config.debug { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let check = |v: &Option<String>| if v.is_some() { "SET" } else { "MISSING" };
    info!("Environment check:");
    info!("  AI_GATEWAY_URL: {}", check(&config.gateway.url));
    info!("  AI_GATEWAY_USE_CASE_ID: {}", check(&config.gateway.use_case_id));
    info!("  AI_GATEWAY_CLOUD_ID: {}", check(&config.gateway.cloud_id));
    info!("  ASAP_KID: {}", check(&config.asap.kid));
    info!("  ASAP_PRIVATE_KEY: {}", check(&config.asap.private_key));

    let addr = format!("0.0.0.0:{}", config.port);
    let app = router(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Relay listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
