use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use compli_tracker::{api, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("compli_tracker=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        "Starting compli-tracker (data dir {})",
        config.data_dir.display()
    );

    api::serve(config).await
}
