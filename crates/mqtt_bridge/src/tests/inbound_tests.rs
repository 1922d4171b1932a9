use super::*;

fn decode(decoder: &mut InboundDecoder, topic: &str, payload: &str) -> FopEvent {
    let (_, event) = decoder
        .decode(topic, payload)
        .expect("valid message")
        .expect("not superseded");
    event
}

#[test]
fn topics_split_into_family_and_platform() {
    assert_eq!(
        parse_topic("owlcms", "owlcms/refbox/decision/Main").expect("topic"),
        (DeviceTopic::RefereeDecision, "Main".to_string())
    );
    assert_eq!(
        parse_topic("owlcms", "owlcms/jurybox/juryMember/decision/B").expect("topic"),
        (DeviceTopic::JuryMemberDecision, "B".to_string())
    );
    assert_eq!(
        parse_topic("gym", "gym/clock/A").expect("topic"),
        (DeviceTopic::Clock, "A".to_string())
    );
    assert!(parse_topic("owlcms", "owlcms/fop/down/A").is_err());
    assert!(parse_topic("owlcms", "owlcms/clock/").is_err());
    assert!(parse_topic("owlcms", "owlcmsx/clock/A").is_err());
}

#[test]
fn filters_use_single_level_wildcard() {
    assert_eq!(DeviceTopic::Summon.filter("owlcms"), "owlcms/jurybox/summon/+");
}

#[test]
fn clock_payloads() {
    let mut decoder = InboundDecoder::new("owlcms");
    assert_eq!(
        decode(&mut decoder, "owlcms/clock/A", "start").kind,
        FopEventKind::TimeStarted
    );
    assert_eq!(
        decode(&mut decoder, "owlcms/clock/A", "stop").kind,
        FopEventKind::TimeStopped
    );
    assert_eq!(
        decode(&mut decoder, "owlcms/clock/A", "120").kind,
        FopEventKind::ForceTime { ms: 120_000 }
    );
    assert!(matches!(
        decoder.decode("owlcms/clock/A", "90"),
        Err(BridgeError::MalformedPayload { .. })
    ));
}

#[test]
fn refbox_decisions_become_zero_based_updates() {
    let mut decoder = InboundDecoder::new("owlcms");
    let event = decode(&mut decoder, "owlcms/refbox/decision/A", "2 bad 1500");
    assert_eq!(
        event.kind,
        FopEventKind::DecisionUpdate {
            ref_index: 1,
            verdict: Verdict::Bad,
            at_ms: Some(1500)
        }
    );
    assert_eq!(event.origin, Origin::Device("refbox".into()));

    let event = decode(&mut decoder, "owlcms/refbox/decision/A", "3 good");
    assert!(matches!(
        event.kind,
        FopEventKind::DecisionUpdate {
            ref_index: 2,
            at_ms: None,
            ..
        }
    ));

    for bad in ["0 good", "4 good", "1 maybe", "1", "1 good soon", "1 good 5 extra"] {
        assert!(
            decoder.decode("owlcms/refbox/decision/A", bad).is_err(),
            "{bad} should be rejected"
        );
    }
}

#[test]
fn older_refbox_timestamps_are_ignored_per_referee_and_platform() {
    let mut decoder = InboundDecoder::new("owlcms");
    decode(&mut decoder, "owlcms/refbox/decision/A", "1 good 2000");

    let stale = decoder
        .decode("owlcms/refbox/decision/A", "1 bad 1000")
        .expect("valid");
    assert!(stale.is_none());

    // other referee and other platform have their own history
    decode(&mut decoder, "owlcms/refbox/decision/A", "2 bad 1000");
    decode(&mut decoder, "owlcms/refbox/decision/B", "1 bad 1000");

    let newer = decode(&mut decoder, "owlcms/refbox/decision/A", "1 bad 2500");
    assert!(matches!(
        newer.kind,
        FopEventKind::DecisionUpdate {
            verdict: Verdict::Bad,
            ..
        }
    ));
}

#[test]
fn jurybox_payloads() {
    let mut decoder = InboundDecoder::new("owlcms");
    assert!(matches!(
        decode(&mut decoder, "owlcms/jurybox/break/A", "deliberation").kind,
        FopEventKind::BreakStarted {
            break_type: BreakType::Jury,
            countdown: CountdownType::Indefinite,
            ..
        }
    ));
    assert!(matches!(
        decode(&mut decoder, "owlcms/jurybox/break/A", "technical").kind,
        FopEventKind::BreakStarted {
            break_type: BreakType::Technical,
            ..
        }
    ));
    assert_eq!(
        decode(&mut decoder, "owlcms/jurybox/break/A", "stop").kind,
        FopEventKind::StartLifting
    );
    assert_eq!(
        decode(&mut decoder, "owlcms/jurybox/juryMember/decision/A", "5 good").kind,
        FopEventKind::JuryMemberDecisionUpdate {
            index: 4,
            verdict: Verdict::Good
        }
    );
    assert!(decoder
        .decode("owlcms/jurybox/juryMember/decision/A", "6 good")
        .is_err());
    assert_eq!(
        decode(&mut decoder, "owlcms/jurybox/decision/A", "bad").kind,
        FopEventKind::JuryDecision {
            verdict: Verdict::Bad,
            from_jury_button: true
        }
    );
}

#[test]
fn summon_targets() {
    let mut decoder = InboundDecoder::new("owlcms");
    let index = |decoder: &mut InboundDecoder, payload: &str| match decode(
        decoder,
        "owlcms/jurybox/summon/A",
        payload,
    )
    .kind
    {
        FopEventKind::SummonReferee { index } => index,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(index(&mut decoder, "all"), 0);
    assert_eq!(index(&mut decoder, "2"), 2);
    assert_eq!(index(&mut decoder, "controller"), 4);
    assert!(decoder.decode("owlcms/jurybox/summon/A", "4").is_err());
}

#[test]
fn down_emitted_ignores_payload() {
    let mut decoder = InboundDecoder::new("owlcms");
    assert_eq!(
        decode(&mut decoder, "owlcms/refbox/downEmitted/A", "").kind,
        FopEventKind::DownSignal
    );
}
