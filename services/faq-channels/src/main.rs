//! FAQ Channels - Main entry point.

use anyhow::Result;
use faq_channels::start_server;
use faq_common::config::Config;
use faq_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials usually come from a local .env file
    dotenvy::dotenv().ok();

    let config = Config::load_with_env()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("FAQ Channels v{}", env!("CARGO_PKG_VERSION"));

    start_server(&config).await
}
