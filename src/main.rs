use anyhow::Result;
use math_explainer::config::Config;
use math_explainer::{init, server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::load_default().await?;

    init::ensure_directories(&cfg).await?;
    let missing = init::check_tools(&cfg).await;
    if !missing.is_empty() {
        tracing::warn!("Missing tools: {}; requests may fail", missing.join(", "));
    }

    server::serve(cfg).await
}
