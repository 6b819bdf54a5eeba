use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{Channel, Message, PublishError, Publisher};
use crate::config::MqttConfig;

/// Publishes every message as JSON to `<topic_prefix>/<channel>`.
pub struct MqttPublisher {
    client: AsyncClient,
    topic_prefix: String,
}

impl MqttPublisher {
    /// Creates the client and spawns the task driving its event loop.
    ///
    /// The connection is established in the background; messages published
    /// before it is up are queued by the client.
    pub fn connect(config: &MqttConfig, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        info!(
            "Connecting to MQTT broker {}:{} as {}",
            config.host, config.port, config.client_id
        );

        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            mqtt_options.set_credentials(user.clone(), password.clone());
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, 100);
        let handle = tokio::spawn(drive_event_loop(event_loop, cancel));

        (
            Self {
                client,
                topic_prefix: config.topic_prefix.trim_end_matches('/').to_string(),
            },
            handle,
        )
    }

    fn topic(&self, channel: Channel) -> String {
        format!("{}/{}", self.topic_prefix, channel)
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, channel: Channel, message: &Message) -> Result<(), PublishError> {
        let payload = message.to_json()?;
        self.client
            .try_publish(self.topic(channel), QoS::AtMostOnce, false, payload.into_bytes())
            .map_err(|e| PublishError::Mqtt(e.to_string()))
    }
}

async fn drive_event_loop(mut event_loop: EventLoop, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("MQTT event loop cancelled");
                break;
            }
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => info!("Connected to MQTT broker"),
                Ok(event) => trace!("MQTT event: {:?}", event),
                Err(e) => {
                    warn!("MQTT connection error: {}", e);
                    // rumqttc reconnects on the next poll
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(prefix: &str) -> MqttConfig {
        MqttConfig {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "evdev-bridge-test".to_string(),
            topic_prefix: prefix.to_string(),
            keep_alive_secs: 5,
            user: None,
            password: None,
        }
    }

    #[tokio::test]
    async fn topics_are_prefixed_per_channel() {
        let cancel = CancellationToken::new();
        let (publisher, handle) = MqttPublisher::connect(&config("lg/spacenav/"), cancel.clone());

        assert_eq!(publisher.topic(Channel::Abs), "lg/spacenav/abs");
        assert_eq!(publisher.topic(Channel::Key), "lg/spacenav/key");

        cancel.cancel();
        handle.await.unwrap();
    }
}
