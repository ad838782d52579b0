//! services/api/src/bin/publisher.rs
//!
//! The cron loop: asks the server for one publisher tick every interval until
//! interrupted. A failed tick is logged and the loop carries on.

use api_lib::{config::PublisherLoopConfig, error::ApiError};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn tick_once(http: &reqwest::Client, url: &str, secret: Option<&str>) {
    let mut request = http.get(url);
    if let Some(secret) = secret {
        request = request.query(&[("secret", secret)]);
    }
    match request.send().await {
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_success() {
                info!(status = %status, body = %body, "publisher tick");
            } else {
                warn!(status = %status, body = %body, "publisher tick rejected");
            }
        }
        Err(e) => error!(error = %e, "publisher tick request failed"),
    }
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let config = PublisherLoopConfig::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    if config.cron_secret.is_none() {
        warn!("CRON_SECRET is not set; the server will refuse every tick");
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?;
    let url = format!("{}/publisher-tick", config.backend_url);

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received.");
        }
        shutdown.cancel();
    });

    info!(url = %url, every = ?config.interval, "publisher loop started");
    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick_once(&http, &url, config.cron_secret.as_deref()) => {}
                }
            }
        }
    }
    info!("publisher loop stopped");
    Ok(())
}
