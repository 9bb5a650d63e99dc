//! Hearth native HTTP gateway
//!
//! Serves the OpenAI-ish chat-completions surface and introspection
//! endpoints (spec §6 "External interfaces") over the configured bind
//! address and port.

use std::sync::Arc;

use hearth::config::load_config;
use hearth::http::native;
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
    let addr = format!("{}:{}", config.gateway.bind, config.gateway.port);

    let runtime = Arc::new(Runtime::bootstrap(config).await?);
    let app = native::router(runtime);

    tracing::info!("native gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
