use clap::Parser;
use gator::cli::{Cli, Session};
use gator::config::config_path;
use gator::{Config, FeedRepository, Shutdown};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let repository = FeedRepository::connect(&config.database_url).await?;
    let mut session = Session::new(repository, config, config_path());

    let (shutdown, signal) = Shutdown::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            shutdown.trigger();
        }
    });

    session
        .execute(cli.command, &mut std::io::stdout(), signal)
        .await?;
    Ok(())
}
