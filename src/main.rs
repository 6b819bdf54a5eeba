use color_eyre::{eyre::eyre, Result};
use evdev_bridge::publish::log_publisher::LogPublisher;
use evdev_bridge::publish::mqtt_publisher::MqttPublisher;
use evdev_bridge::{BridgeConfig, EvdevBridge, Publisher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_CONFIG_PATH: &str = "evdev-bridge.toml";

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = BridgeConfig::load(&config_path)?;

    let cancel = CancellationToken::new();
    let (publisher, mqtt_handle) = match &config.mqtt {
        Some(mqtt_config) => {
            let (mqtt, handle) = MqttPublisher::connect(mqtt_config, cancel.child_token());
            let publisher: Arc<dyn Publisher> = Arc::new(mqtt);
            (publisher, Some(handle))
        }
        None => {
            info!("No [mqtt] section, writing messages to stdout");
            let publisher: Arc<dyn Publisher> = Arc::new(LogPublisher::new());
            (publisher, None)
        }
    };

    let bridge = EvdevBridge::start(&config.device, publisher)
        .map_err(|e| eyre!("Error while creating reader loop: {}", e))?;
    bridge.activate();

    // Periodic liveness check
    let mut check_timer = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutdown requested");
                break;
            }
            _ = check_timer.tick() => {
                if !bridge.check_state() {
                    warn!("Reader loop for {} is no longer running", bridge.label());
                    break;
                }
            }
        }
    }

    let failure = bridge.failure();
    bridge.stop().await;
    cancel.cancel();
    if let Some(handle) = mqtt_handle {
        if let Err(e) = handle.await {
            error!("MQTT task failed: {}", e);
        }
    }

    match failure {
        Some(failure) => Err(eyre!("Error in reader loop: {}", failure)),
        None => Ok(()),
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}
