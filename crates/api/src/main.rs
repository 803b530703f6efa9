use std::net::SocketAddr;

use anyhow::Context;

use reftrack_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    reftrack_observability::init(reftrack_observability::LogFormat::from_env());

    let config = ApiConfig::from_env()?;
    let app = reftrack_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server terminated")?;

    Ok(())
}
