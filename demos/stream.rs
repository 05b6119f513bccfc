//! Tail the notification stream from a terminal.
//!
//! ```sh
//! NOTISTREAM_BASE_URL=https://api.example.com \
//! NOTISTREAM_TOKEN=eyJ... \
//! cargo run --example stream
//! ```

use std::sync::Arc;

use anyhow::Context as _;
use notistream::sse::{Client, Config};
use notistream::StaticToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notistream=debug".into()),
        )
        .init();

    let base_url =
        std::env::var("NOTISTREAM_BASE_URL").context("NOTISTREAM_BASE_URL must be set")?;
    let token = std::env::var("NOTISTREAM_TOKEN").context("NOTISTREAM_TOKEN must be set")?;

    let client = Client::new(&base_url, Arc::new(StaticToken::new(token)), Config::default())?;

    let subscription = client.connect_with_errors(
        |notification| {
            tracing::info!(
                id = %notification.id,
                title = %notification.title,
                message = %notification.message,
                category = notification.category.as_deref().unwrap_or("-"),
                "notification"
            );
        },
        |error| {
            tracing::warn!(%error, "stream error");
        },
    );

    tracing::info!("listening for notifications, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    subscription.unsubscribe();
    client.destroy();
    Ok(())
}
