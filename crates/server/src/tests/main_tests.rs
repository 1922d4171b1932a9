use super::*;
use axum::{body, body::Body, http::Request};
use shared::domain::{Athlete, FopState, Gender, Group, GroupId};
use storage::CompetitionData;
use tower::ServiceExt;

fn competition() -> MemoryStorage {
    let mut athlete = Athlete {
        id: AthleteId(1),
        first_name: "Ana".into(),
        last_name: "Reyes".into(),
        team: "TJX".into(),
        gender: Gender::F,
        category: "F59".into(),
        age_groups: vec!["SR".into()],
        body_weight: Some(58.4),
        group: Some(GroupId(1)),
        start_number: Some(1),
        lot_number: Some(3),
        snatch: Default::default(),
        clean_jerk: Default::default(),
        previous_lift_time: None,
    };
    athlete.snatch[0].declaration = Some(80);
    MemoryStorage::new(CompetitionData {
        groups: vec![
            Group {
                id: GroupId(1),
                name: "A".into(),
                platform: Some("Main".into()),
            },
            Group {
                id: GroupId(2),
                name: "B".into(),
                platform: Some("Warmup".into()),
            },
        ],
        athletes: vec![athlete],
        records: Vec::new(),
    })
}

fn test_app() -> (Router, FopHandle) {
    let (handle, _task) = spawn_field_of_play(
        "Main",
        fop::FopConfig::default(),
        Arc::new(competition()),
        Box::new(SilentTones),
    );
    let mut platforms = BTreeMap::new();
    platforms.insert("Main".to_string(), handle.clone());
    (build_router(Arc::new(AppState { platforms })), handle)
}

fn post_json(uri: &str, value: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(value.to_string()))
        .expect("request")
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (app, _handle) = test_app();
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn lists_platform_names() {
    let (app, _handle) = test_app();
    let request = Request::get("/platforms")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let names: Vec<String> = serde_json::from_slice(&body).expect("json");
    assert_eq!(names, vec!["Main".to_string()]);
}

#[tokio::test]
async fn posted_events_drive_the_platform() {
    let (app, _handle) = test_app();

    let switch = post_json(
        "/platforms/Main/events",
        serde_json::json!({
            "event": { "type": "switch_group", "payload": { "group": 1 } },
            "session": "6f1f7f3e-3a4b-4c4d-9e9f-0a1b2c3d4e5f"
        }),
    );
    let response = app.clone().oneshot(switch).await.expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let start = post_json(
        "/platforms/Main/events",
        serde_json::json!({ "event": { "type": "start_lifting" } }),
    );
    let response = app.clone().oneshot(start).await.expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let request = Request::get("/platforms/Main/state")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let snapshot: FopSnapshot = serde_json::from_slice(&body).expect("json");
    assert_eq!(snapshot.group, Some(GroupId(1)));
    assert_eq!(snapshot.state, FopState::CurrentAthleteDisplayed);
    assert_eq!(
        snapshot.order.current.expect("current athlete").requested_weight,
        80
    );
}

#[tokio::test]
async fn unknown_platform_is_not_found() {
    let (app, _handle) = test_app();
    let request = Request::get("/platforms/Nowhere/state")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let post = post_json(
        "/platforms/Nowhere/events",
        serde_json::json!({ "event": { "type": "time_started" } }),
    );
    let response = app.oneshot(post).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let error: ApiError = serde_json::from_slice(&body).expect("json");
    assert!(matches!(error.code, ErrorCode::NotFound));
}

#[tokio::test]
async fn timer_events_are_rejected() {
    let (app, _handle) = test_app();
    let post = post_json(
        "/platforms/Main/events",
        serde_json::json!({ "event": { "type": "reveal_decision", "payload": { "cycle": 1 } } }),
    );
    let response = app.oneshot(post).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_event_body_is_rejected() {
    let (app, _handle) = test_app();
    let request = Request::post("/platforms/Main/events")
        .header("content-type", "application/json")
        .header("content-length", MAX_EVENT_BYTES + 1)
        .body(Body::from(vec![b' '; MAX_EVENT_BYTES + 1]))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn state_is_unavailable_after_shutdown() {
    let (app, handle) = test_app();
    handle.shutdown();
    // let the platform task observe the shutdown
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let request = Request::get("/platforms/Main/state")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[test]
fn platform_names_come_from_groups_when_unset() {
    let storage = competition();
    let names = platform_names(&Settings::default(), &storage).expect("names");
    assert_eq!(names, vec!["Main".to_string(), "Warmup".to_string()]);

    let settings = Settings {
        platforms: vec!["X".into()],
        ..Settings::default()
    };
    assert_eq!(platform_names(&settings, &storage).expect("names"), vec!["X"]);

    let empty = MemoryStorage::new(CompetitionData::default());
    assert_eq!(
        platform_names(&Settings::default(), &empty).expect("names"),
        vec![DEFAULT_PLATFORM]
    );
}
