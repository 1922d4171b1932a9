use std::{sync::Arc, time::Duration};

use fop::{spawn_field_of_play, FopConfig, SilentTones};
use shared::{
    domain::{Athlete, AthleteId, FopState, Gender, Group, GroupId, Verdict},
    protocol::{FopEvent, FopEventKind, Origin, UiEvent},
};
use storage::{CompetitionData, MemoryStorage};
use tokio::sync::broadcast;

fn competition() -> MemoryStorage {
    let mut athlete = Athlete {
        id: AthleteId(7),
        first_name: "Mira".into(),
        last_name: "Okafor".into(),
        team: "LAG".into(),
        gender: Gender::F,
        category: "F71".into(),
        age_groups: vec!["SR".into()],
        body_weight: Some(70.2),
        group: Some(GroupId(3)),
        start_number: Some(1),
        lot_number: Some(12),
        snatch: Default::default(),
        clean_jerk: Default::default(),
        previous_lift_time: None,
    };
    athlete.snatch[0].declaration = Some(92);
    athlete.clean_jerk[0].declaration = Some(115);
    MemoryStorage::new(CompetitionData {
        groups: vec![Group {
            id: GroupId(3),
            name: "B".into(),
            platform: Some("Main".into()),
        }],
        athletes: vec![athlete],
        records: Vec::new(),
    })
}

fn event(kind: FopEventKind) -> FopEvent {
    FopEvent::new(kind, Origin::Controller)
}

fn referee(index: usize, verdict: Verdict) -> FopEvent {
    FopEvent::new(
        FopEventKind::DecisionUpdate {
            ref_index: index,
            verdict,
            at_ms: None,
        },
        Origin::Device("refbox".into()),
    )
}

async fn wait_for(
    rx: &mut broadcast::Receiver<UiEvent>,
    pred: impl Fn(&UiEvent) -> bool,
) -> UiEvent {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(err) => panic!("event stream failed: {err}"),
            }
        }
    })
    .await
    .expect("event in time")
}

#[tokio::test(start_paused = true)]
async fn platform_task_runs_a_full_attempt() {
    let (handle, task) = spawn_field_of_play(
        "Main",
        FopConfig::default(),
        Arc::new(competition()),
        Box::new(SilentTones),
    );
    let mut rx = handle.subscribe();

    handle.post(event(FopEventKind::SwitchGroup {
        group: Some(GroupId(3)),
    }));
    handle.post(event(FopEventKind::StartLifting));
    handle.post(event(FopEventKind::TimeStarted));
    handle.post(referee(0, Verdict::Good));
    handle.post(referee(1, Verdict::Bad));
    handle.post(referee(2, Verdict::Good));

    wait_for(&mut rx, |e| matches!(e, UiEvent::DownSignal { .. })).await;
    let decision = wait_for(&mut rx, |e| matches!(e, UiEvent::Decision { .. })).await;
    assert!(matches!(
        decision,
        UiEvent::Decision {
            athlete: Some(AthleteId(7)),
            good_lift: true,
            ..
        }
    ));
    let snapshot = handle.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.state, FopState::DecisionVisible);

    wait_for(&mut rx, |e| matches!(e, UiEvent::DecisionReset { .. })).await;
    let snapshot = handle.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.state, FopState::CurrentAthleteDisplayed);
    assert_eq!(
        snapshot.order.current.expect("current").requested_weight,
        93
    );
    assert_eq!(snapshot.athlete_remaining_ms, 120_000);

    handle.shutdown();
    task.await.expect("platform task");
}

#[tokio::test(start_paused = true)]
async fn snapshot_fails_after_shutdown() {
    let (handle, task) = spawn_field_of_play(
        "Main",
        FopConfig::default(),
        Arc::new(competition()),
        Box::new(SilentTones),
    );
    handle.shutdown();
    task.await.expect("platform task");
    assert!(handle.snapshot().await.is_err());
}
