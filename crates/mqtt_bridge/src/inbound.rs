use std::collections::HashMap;

use shared::{
    domain::{BreakType, CountdownType, Verdict},
    protocol::{FopEvent, FopEventKind, Origin},
};
use tracing::debug;

use crate::BridgeError;

/// Device-to-controller topic families. The platform name is always the last
/// topic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceTopic {
    Clock,
    RefereeDecision,
    DownEmitted,
    JuryBreak,
    JuryMemberDecision,
    JuryDecision,
    Summon,
}

impl DeviceTopic {
    pub const ALL: [DeviceTopic; 7] = [
        DeviceTopic::Clock,
        DeviceTopic::RefereeDecision,
        DeviceTopic::DownEmitted,
        DeviceTopic::JuryBreak,
        DeviceTopic::JuryMemberDecision,
        DeviceTopic::JuryDecision,
        DeviceTopic::Summon,
    ];

    pub fn path(self) -> &'static str {
        match self {
            DeviceTopic::Clock => "clock",
            DeviceTopic::RefereeDecision => "refbox/decision",
            DeviceTopic::DownEmitted => "refbox/downEmitted",
            DeviceTopic::JuryBreak => "jurybox/break",
            DeviceTopic::JuryMemberDecision => "jurybox/juryMember/decision",
            DeviceTopic::JuryDecision => "jurybox/decision",
            DeviceTopic::Summon => "jurybox/summon",
        }
    }

    fn device(self) -> &'static str {
        match self {
            DeviceTopic::Clock => "clock",
            DeviceTopic::RefereeDecision | DeviceTopic::DownEmitted => "refbox",
            _ => "jurybox",
        }
    }

    /// Wildcard filter covering every platform.
    pub fn filter(self, prefix: &str) -> String {
        format!("{prefix}/{}/+", self.path())
    }
}

/// Splits `<prefix>/<path>/<platform>` into its topic family and platform.
pub fn parse_topic(prefix: &str, topic: &str) -> Result<(DeviceTopic, String), BridgeError> {
    let unknown = || BridgeError::UnknownTopic(topic.to_string());
    let rest = topic
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(unknown)?;
    let (path, platform) = rest.rsplit_once('/').ok_or_else(unknown)?;
    if platform.is_empty() {
        return Err(unknown());
    }
    let kind = DeviceTopic::ALL
        .into_iter()
        .find(|kind| kind.path() == path)
        .ok_or_else(unknown)?;
    Ok((kind, platform.to_string()))
}

/// Turns device messages into input events. Keeps the newest referee
/// timestamp seen per platform so late retransmissions are ignored.
#[derive(Debug, Default)]
pub struct InboundDecoder {
    prefix: String,
    latest_referee: HashMap<String, [Option<i64>; 3]>,
}

impl InboundDecoder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            latest_referee: HashMap::new(),
        }
    }

    /// `Ok(None)` means the message was valid but superseded.
    pub fn decode(
        &mut self,
        topic: &str,
        payload: &str,
    ) -> Result<Option<(String, FopEvent)>, BridgeError> {
        let (kind, platform) = parse_topic(&self.prefix, topic)?;
        let malformed = || BridgeError::MalformedPayload {
            topic: topic.to_string(),
            payload: payload.to_string(),
        };
        let payload = payload.trim();

        let event = match kind {
            DeviceTopic::Clock => match payload {
                "start" => FopEventKind::TimeStarted,
                "stop" => FopEventKind::TimeStopped,
                "60" => FopEventKind::ForceTime { ms: 60_000 },
                "120" => FopEventKind::ForceTime { ms: 120_000 },
                _ => return Err(malformed()),
            },
            DeviceTopic::RefereeDecision => {
                let mut parts = payload.split_whitespace();
                let referee = parse_index(parts.next(), 3).ok_or_else(malformed)?;
                let verdict = parts.next().and_then(parse_verdict).ok_or_else(malformed)?;
                let at_ms = match parts.next() {
                    Some(raw) => Some(raw.parse::<i64>().map_err(|_| malformed())?),
                    None => None,
                };
                if parts.next().is_some() {
                    return Err(malformed());
                }
                if let Some(at) = at_ms {
                    let latest = self.latest_referee.entry(platform.clone()).or_default();
                    if latest[referee].is_some_and(|seen| at < seen) {
                        debug!(%platform, referee = referee + 1, at, "stale refbox message");
                        return Ok(None);
                    }
                    latest[referee] = Some(at);
                }
                FopEventKind::DecisionUpdate {
                    ref_index: referee,
                    verdict,
                    at_ms,
                }
            }
            DeviceTopic::DownEmitted => FopEventKind::DownSignal,
            DeviceTopic::JuryBreak => match payload {
                "technical" => FopEventKind::BreakStarted {
                    break_type: BreakType::Technical,
                    countdown: CountdownType::Indefinite,
                    remaining_ms: None,
                    target: None,
                },
                "deliberation" => FopEventKind::BreakStarted {
                    break_type: BreakType::Jury,
                    countdown: CountdownType::Indefinite,
                    remaining_ms: None,
                    target: None,
                },
                "stop" => FopEventKind::StartLifting,
                _ => return Err(malformed()),
            },
            DeviceTopic::JuryMemberDecision => {
                let mut parts = payload.split_whitespace();
                let index = parse_index(parts.next(), 5).ok_or_else(malformed)?;
                let verdict = parts.next().and_then(parse_verdict).ok_or_else(malformed)?;
                FopEventKind::JuryMemberDecisionUpdate { index, verdict }
            }
            DeviceTopic::JuryDecision => FopEventKind::JuryDecision {
                verdict: parse_verdict(payload).ok_or_else(malformed)?,
                from_jury_button: true,
            },
            DeviceTopic::Summon => {
                let index = match payload {
                    "all" => 0,
                    "controller" => 4,
                    other => parse_index(Some(other), 3).ok_or_else(malformed)? + 1,
                };
                FopEventKind::SummonReferee { index }
            }
        };

        Ok(Some((
            platform,
            FopEvent::new(event, Origin::Device(kind.device().to_string())),
        )))
    }
}

/// Parses a 1-based device number, at most `max`, into a 0-based index.
fn parse_index(raw: Option<&str>, max: usize) -> Option<usize> {
    let number = raw?.parse::<usize>().ok()?;
    (1..=max).contains(&number).then(|| number - 1)
}

fn parse_verdict(raw: &str) -> Option<Verdict> {
    match raw {
        "good" => Some(Verdict::Good),
        "bad" => Some(Verdict::Bad),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/inbound_tests.rs"]
mod tests;
