use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use shared::{domain::Verdict, protocol::UiEvent};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, warn};

/// A message for the devices of one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMessage {
    pub topic: String,
    pub payload: String,
}

/// Transport seam; the live implementation wraps an MQTT client.
#[async_trait]
pub trait DevicePublisher: Send + Sync {
    async fn publish(&self, message: DeviceMessage) -> anyhow::Result<()>;
}

/// Maps output events of one platform onto `<prefix>/fop/...` topics.
#[derive(Debug, Clone)]
pub struct OutboundEncoder {
    prefix: String,
    platform: String,
}

impl OutboundEncoder {
    pub fn new(prefix: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            platform: platform.into(),
        }
    }

    fn message(&self, path: &str, payload: impl Into<String>) -> DeviceMessage {
        DeviceMessage {
            topic: format!("{}/fop/{path}/{}", self.prefix, self.platform),
            payload: payload.into(),
        }
    }

    /// Sent once per connection so devices can reset their displays.
    pub fn startup(&self) -> Vec<DeviceMessage> {
        vec![self.message("startup", "on"), self.message("startup", "off")]
    }

    pub fn encode(&self, event: &UiEvent) -> Vec<DeviceMessage> {
        match event {
            UiEvent::DownSignal { .. } => vec![self.message("down", "on")],
            UiEvent::Decision { verdicts, .. } => verdicts
                .iter()
                .enumerate()
                .filter_map(|(i, verdict)| {
                    verdict.map(|v| self.message("decision", format!("{} {}", i + 1, word(v))))
                })
                .collect(),
            UiEvent::WakeUpRef { referee, on } => vec![self.message(
                "decisionRequest",
                format!("{referee} {}", if *on { "on" } else { "off" }),
            )],
            UiEvent::SummonRef { index } => {
                let target = match index {
                    0 => "all".to_string(),
                    4 => "controller".to_string(),
                    n => n.to_string(),
                };
                vec![self.message("summon", target)]
            }
            UiEvent::JuryUpdate { voted, revealed } => voted
                .iter()
                .enumerate()
                .filter(|(_, voted)| **voted)
                .map(|(i, _)| {
                    let shown = revealed
                        .as_ref()
                        .and_then(|r| r.members.get(i).copied().flatten())
                        .map_or("hidden", word);
                    self.message("juryMemberDecision", format!("{} {shown}", i + 1))
                })
                .collect(),
            UiEvent::DecisionReset { .. } => vec![self.message("resetDecisions", "")],
            _ => Vec::new(),
        }
    }
}

fn word(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Good => "good",
        Verdict::Bad => "bad",
    }
}

/// Republishes one platform's output events until the controller closes the
/// channel. Lagging only loses events; publish failures are logged.
pub async fn forward_ui_events(
    events: broadcast::Receiver<UiEvent>,
    encoder: OutboundEncoder,
    publisher: Arc<dyn DevicePublisher>,
) {
    let mut stream = BroadcastStream::new(events);
    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(event) => event,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(platform = %encoder.platform, skipped, "device forwarder lagged");
                continue;
            }
        };
        for message in encoder.encode(&event) {
            debug!(topic = %message.topic, payload = %message.payload, "publishing");
            if let Err(err) = publisher.publish(message).await {
                warn!(platform = %encoder.platform, error = %err, "device publish failed");
            }
        }
    }
    debug!(platform = %encoder.platform, "device forwarder finished");
}

#[cfg(test)]
#[path = "tests/outbound_tests.rs"]
mod tests;
