use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use corpora_backend::core::config::{AppPaths, Settings};
use corpora_backend::logging;
use corpora_backend::server::router::router;
use corpora_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = AppPaths::from_env();
    logging::init(&paths);

    let settings = Settings::load(&paths)?;
    let bind_addr = settings.bind_addr.clone();

    let state = AppState::initialize(settings, &paths).await?;

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
