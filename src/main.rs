mod bluetooth;
mod config;
mod hass;
mod manager;
mod metrics;
mod models;
mod utils;

use log::{error, info, warn};
use time::OffsetDateTime;
use tokio::time::{sleep, Duration};

use bluetooth::scanner::{scan_for_ruuvitags, SCAN_DURATION_SECS};
use config::SensorConfig;
use hass::{post_states, HassClient};
use manager::Manager;
use utils::format_datetime;

const POLL_INTERVAL_SECS: u64 = 30;

async fn main_loop(config: SensorConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Starting RuuviTag to Home Assistant bridge, publishing to {}",
        config.hass_host
    );

    let client = HassClient::new(config.hass_host.clone(), config.hass_token.clone());
    let mut manager = Manager::new(config);

    loop {
        let scan_started = OffsetDateTime::now_utc();

        match scan_for_ruuvitags().await {
            Ok(readings) => {
                if readings.is_empty() {
                    warn!("No RuuviTags found during scan at {}", format_datetime(&scan_started));
                }

                let now = OffsetDateTime::now_utc();
                for (tag_id, reading) in readings {
                    let updates = manager.handle_ruuvi_update(&tag_id, reading, now);
                    if updates.is_empty() {
                        continue;
                    }

                    let posted = post_states(&client, &updates).await;
                    info!(
                        "Posted {}/{} states for tag {}",
                        posted,
                        updates.len(),
                        tag_id
                    );
                }
            }
            Err(e) => error!("Scan failed: {}", e),
        }

        // Scanning already took SCAN_DURATION_SECS of the poll interval
        sleep(Duration::from_secs(
            POLL_INTERVAL_SECS.saturating_sub(SCAN_DURATION_SECS),
        ))
        .await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; the global level is raised later if debug is configured
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .filter_module("bluer", log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();
    log::set_max_level(log::LevelFilter::Info);

    // Load configuration
    let config = match SensorConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if config.debug {
        log::set_max_level(log::LevelFilter::Debug);
    }

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    // Run main loop or wait for shutdown signal
    tokio::select! {
        result = main_loop(config) => {
            match result {
                Ok(_) => info!("Program completed successfully"),
                Err(e) => error!("Fatal error: {}", e),
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    Ok(())
}
