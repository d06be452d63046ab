use anyhow::Context;
use wgcloud::{config::Settings, logging::init_logging, network::server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let settings = Settings::load().context("failed to load configuration")?;
    server::run(settings).await
}
