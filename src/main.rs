use anyhow::{Context, Result};
use tracing::info;
use tx_native::{BackgroundSync, Config, Params};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when the variables come from the environment)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tx_native=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    let native = tx_native::init(&config);

    info!("Fetching translations from {}", config.cds_host);
    native.fetch_translations(None).await?;

    let strings: Vec<String> = std::env::args().skip(1).collect();
    if !strings.is_empty() {
        let target = std::env::var("TRANSIFEX_TARGET_LANGUAGE")
            .unwrap_or_else(|_| native.source_language());
        for string in &strings {
            println!(
                "{}",
                native.translate(string, Some(&target), &[], None, &Params::new())
            );
        }
        return Ok(());
    }

    let sync = BackgroundSync::new(&native, config.sync_interval);
    sync.start();
    info!("Press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    sync.stop().await;
    Ok(())
}
