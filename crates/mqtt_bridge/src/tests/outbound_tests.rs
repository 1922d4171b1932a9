use std::sync::Mutex;

use shared::{domain::AthleteId, protocol::JuryVerdict};

use super::*;

#[derive(Default)]
struct RecordingPublisher {
    sent: Mutex<Vec<DeviceMessage>>,
}

#[async_trait]
impl DevicePublisher for RecordingPublisher {
    async fn publish(&self, message: DeviceMessage) -> anyhow::Result<()> {
        self.sent.lock().expect("lock").push(message);
        Ok(())
    }
}

fn payloads(messages: &[DeviceMessage]) -> Vec<(&str, &str)> {
    messages
        .iter()
        .map(|m| (m.topic.as_str(), m.payload.as_str()))
        .collect()
}

#[test]
fn decision_is_published_per_referee() {
    let encoder = OutboundEncoder::new("owlcms", "A");
    let messages = encoder.encode(&UiEvent::Decision {
        athlete: Some(AthleteId(1)),
        good_lift: true,
        verdicts: [Some(Verdict::Good), Some(Verdict::Bad), Some(Verdict::Good)],
    });
    assert_eq!(
        payloads(&messages),
        vec![
            ("owlcms/fop/decision/A", "1 good"),
            ("owlcms/fop/decision/A", "2 bad"),
            ("owlcms/fop/decision/A", "3 good"),
        ]
    );
}

#[test]
fn reminders_and_summons() {
    let encoder = OutboundEncoder::new("owlcms", "A");
    assert_eq!(
        payloads(&encoder.encode(&UiEvent::WakeUpRef {
            referee: 2,
            on: true
        })),
        vec![("owlcms/fop/decisionRequest/A", "2 on")]
    );
    assert_eq!(
        payloads(&encoder.encode(&UiEvent::SummonRef { index: 4 })),
        vec![("owlcms/fop/summon/A", "controller")]
    );
    assert_eq!(
        payloads(&encoder.encode(&UiEvent::SummonRef { index: 0 })),
        vec![("owlcms/fop/summon/A", "all")]
    );
}

#[test]
fn jury_votes_stay_hidden_until_revealed() {
    let encoder = OutboundEncoder::new("owlcms", "A");
    let hidden = encoder.encode(&UiEvent::JuryUpdate {
        voted: vec![true, false, true],
        revealed: None,
    });
    assert_eq!(
        payloads(&hidden),
        vec![
            ("owlcms/fop/juryMemberDecision/A", "1 hidden"),
            ("owlcms/fop/juryMemberDecision/A", "3 hidden"),
        ]
    );

    let shown = encoder.encode(&UiEvent::JuryUpdate {
        voted: vec![true, true, true],
        revealed: Some(JuryVerdict {
            members: vec![Some(Verdict::Good), Some(Verdict::Bad), Some(Verdict::Good)],
            good_lift: true,
            unanimous: false,
        }),
    });
    assert_eq!(shown[1].payload, "2 bad");
}

#[test]
fn startup_pulse_and_ignored_events() {
    let encoder = OutboundEncoder::new("gym", "B");
    assert_eq!(
        payloads(&encoder.startup()),
        vec![("gym/fop/startup/B", "on"), ("gym/fop/startup/B", "off")]
    );
    assert!(encoder
        .encode(&UiEvent::GroupDone { group: None })
        .is_empty());
}

#[tokio::test]
async fn forwarder_publishes_until_channel_closes() {
    let (tx, rx) = broadcast::channel(16);
    let publisher = Arc::new(RecordingPublisher::default());
    let task = tokio::spawn(forward_ui_events(
        rx,
        OutboundEncoder::new("owlcms", "A"),
        publisher.clone(),
    ));

    tx.send(UiEvent::DownSignal { athlete: None }).expect("send");
    tx.send(UiEvent::DecisionReset { athlete: None })
        .expect("send");
    drop(tx);
    task.await.expect("forwarder");

    let sent = publisher.sent.lock().expect("lock");
    assert_eq!(
        payloads(&sent),
        vec![
            ("owlcms/fop/down/A", "on"),
            ("owlcms/fop/resetDecisions/A", ""),
        ]
    );
}
