use log::{error, info};
use std::env;
use time::OffsetDateTime;

use rust_jeelink_bridge::config::{parse_bool, BridgeConfig};
use rust_jeelink_bridge::jeelink::SerialOpener;
use rust_jeelink_bridge::registry::{DeviceRegistry, LoggingObserver};
use rust_jeelink_bridge::scheduler::ReadScheduler;
use rust_jeelink_bridge::utils::format_datetime;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize logging, debug mode also turns on frame diagnostics
    let debug = env::var("JEELINK_DEBUG")
        .ok()
        .and_then(|value| parse_bool(&value))
        .unwrap_or(false);
    env_logger::Builder::new()
        .filter_level(if debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match BridgeConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "Starting JeeLink bridge on {} at {}",
        config.device,
        format_datetime(&OffsetDateTime::now_utc())
    );
    info!(
        "Read interval {:?}, scan mode {}, throttle {:?}",
        config.interval, config.scan_mode, config.throttle
    );

    let observer = LoggingObserver::new(config.units);
    let registry = DeviceRegistry::new(config.staleness, Box::new(observer));
    let mut scheduler = ReadScheduler::new(
        SerialOpener::new(config.device.clone(), config.baud_rate),
        registry,
        config.admission_policy(),
        config.decode_options(),
        config.schedule_settings(),
    );

    // Handle Ctrl+C gracefully
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        let _ = tx.send(());
    });

    let shutdown = async move {
        // A dropped sender means no signal handler; keep reading until killed
        if rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    match scheduler.run(shutdown).await {
        Ok(_) => info!("Program terminated by user. Exiting gracefully."),
        Err(e) => error!("Fatal error: {}", e),
    }

    Ok(())
}
