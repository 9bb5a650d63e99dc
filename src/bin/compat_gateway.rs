//! Hearth Ollama-compatible HTTP gateway
//!
//! Serves the dumb-pipe NDJSON surface (spec §6 ambient addition) for
//! clients written against Ollama's API, driving the same agent loop as
//! the native gateway.

use std::sync::Arc;

use hearth::config::load_config;
use hearth::http::compat;
use hearth::runtime::Runtime;
use hearth::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("hearth=info".parse().unwrap()),
        )
        .init();

    let config = load_config()?;
    let addr = format!("{}:{}", config.gateway.bind, config.gateway.compat_port);

    let runtime = Arc::new(Runtime::bootstrap(config).await?);
    let app = compat::router(runtime);

    tracing::info!("compat gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
