use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use fop::FopHandle;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use shared::protocol::FopEvent;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub mod inbound;
pub mod outbound;

pub use inbound::{parse_topic, DeviceTopic, InboundDecoder};
pub use outbound::{forward_ui_events, DeviceMessage, DevicePublisher, OutboundEncoder};

const REQUEST_CAPACITY: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("unknown device topic '{0}'")]
    UnknownTopic(String),
    #[error("malformed payload '{payload}' on '{topic}'")]
    MalformedPayload { topic: String, payload: String },
    #[error("payload on '{0}' is not utf-8")]
    NotUtf8(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    pub prefix: String,
    pub client_id: String,
    pub reconnect_delay_ms: u64,
    pub keep_alive_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1883,
            prefix: "owlcms".into(),
            client_id: "owlcms-fop".into(),
            reconnect_delay_ms: 5_000,
            keep_alive_secs: 30,
        }
    }
}

impl BridgeConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

struct MqttPublisher {
    client: AsyncClient,
}

#[async_trait]
impl DevicePublisher for MqttPublisher {
    async fn publish(&self, message: DeviceMessage) -> anyhow::Result<()> {
        self.client
            .publish(
                message.topic,
                QoS::AtLeastOnce,
                false,
                message.payload.into_bytes(),
            )
            .await?;
        Ok(())
    }
}

/// Connects the platforms' controllers to the referee and jury hardware.
pub struct MqttBridge {
    config: BridgeConfig,
    platforms: HashMap<String, FopHandle>,
}

impl MqttBridge {
    pub fn new(config: BridgeConfig, platforms: impl IntoIterator<Item = FopHandle>) -> Self {
        let platforms = platforms
            .into_iter()
            .map(|handle| (handle.platform().to_string(), handle))
            .collect();
        Self { config, platforms }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until aborted. Connection errors are retried forever after a
    /// fixed delay.
    async fn run(self) {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let publisher: Arc<dyn DevicePublisher> = Arc::new(MqttPublisher {
            client: client.clone(),
        });
        for (platform, handle) in &self.platforms {
            tokio::spawn(forward_ui_events(
                handle.subscribe(),
                OutboundEncoder::new(self.config.prefix.clone(), platform.clone()),
                publisher.clone(),
            ));
        }

        let mut decoder = InboundDecoder::new(self.config.prefix.clone());
        info!(host = %self.config.host, port = self.config.port, "mqtt bridge started");
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(host = %self.config.host, "mqtt connected");
                    self.on_connected(&client);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Some((platform, event)) =
                        route_inbound(&mut decoder, &publish.topic, &publish.payload)
                    {
                        match self.platforms.get(&platform) {
                            Some(handle) => handle.post(event),
                            None => debug!(%platform, "message for an unmanaged platform"),
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        error = %err,
                        retry_ms = self.config.reconnect_delay_ms,
                        "mqtt connection failed"
                    );
                    tokio::time::sleep(self.config.reconnect_delay()).await;
                }
            }
        }
    }

    /// Subscriptions do not survive a clean-session reconnect, so they are
    /// renewed on every ConnAck. Uses the non-blocking client calls since the
    /// event loop is not being polled meanwhile.
    fn on_connected(&self, client: &AsyncClient) {
        for topic in DeviceTopic::ALL {
            let filter = topic.filter(&self.config.prefix);
            if let Err(err) = client.try_subscribe(filter.clone(), QoS::AtMostOnce) {
                warn!(%filter, error = %err, "mqtt subscribe failed");
            }
        }
        for platform in self.platforms.keys() {
            let encoder = OutboundEncoder::new(self.config.prefix.clone(), platform.clone());
            for message in encoder.startup() {
                if let Err(err) = client.try_publish(
                    message.topic,
                    QoS::AtLeastOnce,
                    false,
                    message.payload.into_bytes(),
                ) {
                    warn!(%platform, error = %err, "startup pulse failed");
                }
            }
        }
    }
}

/// Decodes one device message; malformed input is logged and dropped.
pub fn route_inbound(
    decoder: &mut InboundDecoder,
    topic: &str,
    payload: &[u8],
) -> Option<(String, FopEvent)> {
    let decoded = std::str::from_utf8(payload)
        .map_err(|_| BridgeError::NotUtf8(topic.to_string()))
        .and_then(|text| decoder.decode(topic, text));
    match decoded {
        Ok(routed) => routed,
        Err(err) => {
            error!(error = %err, "dropping device message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::FopEventKind;

    #[test]
    fn route_inbound_drops_bad_messages() {
        let mut decoder = InboundDecoder::new("owlcms");
        assert!(route_inbound(&mut decoder, "owlcms/clock/A", &[0xff, 0xfe]).is_none());
        assert!(route_inbound(&mut decoder, "owlcms/clock/A", b"sideways").is_none());
        assert!(route_inbound(&mut decoder, "other/clock/A", b"start").is_none());

        let (platform, event) =
            route_inbound(&mut decoder, "owlcms/clock/A", b"start").expect("routed");
        assert_eq!(platform, "A");
        assert_eq!(event.kind, FopEventKind::TimeStarted);
    }

    #[test]
    fn default_config_targets_local_broker() {
        let config = BridgeConfig::default();
        assert_eq!(config.port, 1883);
        assert_eq!(config.prefix, "owlcms");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
    }
}
