mod support;

use std::sync::Arc;

use firewatch::{
    dashboard::{router, DashboardSink, DashboardState, StatusBoard},
    orchestrator::Orchestrator,
    pubsub::NamedPubSub,
    settings::{Settings, REDACTED},
};
use reqwest::StatusCode;
use serde_json::Value;

use support::{fire, settings_for, test_frame, FakeCameras, Rig, TestResult};

async fn dashboard(rig: &Rig, board: Arc<StatusBoard>) -> String {
    let app = router(Arc::new(DashboardState {
        session: rig.session.clone(),
        board,
        pubsub: Arc::new(NamedPubSub::new()),
        client: reqwest::Client::new(),
    }));
    format!("http://{}", support::serve(app).await)
}

#[tokio::test]
async fn start_and_stop_switch_state() -> TestResult {
    let rig = Rig::new(settings_for(&["Front"]), fire(90.0)).await;
    let base = dashboard(&rig, Arc::new(StatusBoard::new())).await;
    let client = reqwest::Client::new();

    let state: Value = client.post(format!("{base}/start")).send().await?.json().await?;
    assert_eq!(state, "Streaming");

    let state: Value = client.post(format!("{base}/stop")).send().await?.json().await?;
    assert_eq!(state, "Idle");

    let health = client.get(format!("{base}/healthcheck")).send().await?.text().await?;
    assert_eq!(health, "healthy");

    Ok(())
}

#[tokio::test]
async fn status_lists_camera_results() -> TestResult {
    let rig = Rig::new(settings_for(&["Front", "Back"]), fire(90.0)).await;
    let board = Arc::new(StatusBoard::new());
    let base = dashboard(&rig, board.clone()).await;

    let cameras = Arc::new(FakeCameras::default().with_frame("Front", test_frame()));
    let sink = DashboardSink::new(board, Arc::new(NamedPubSub::new()));
    let mut orchestrator = Orchestrator::new(rig.session.clone(), cameras, sink);
    orchestrator.tick(&rig.session.active()).await;

    let status: Value = reqwest::get(format!("{base}/status")).await?.json().await?;
    assert_eq!(status["state"], "Idle");
    assert_eq!(status["cameras"]["Front"]["status"], "online");
    assert_eq!(status["cameras"]["Front"]["prediction"]["label"], "Fire");
    assert_eq!(status["cameras"]["Front"]["alert"], "sent");
    assert_eq!(status["cameras"]["Back"]["status"], "offline");

    Ok(())
}

#[tokio::test]
async fn settings_are_shown_redacted_and_validated() -> TestResult {
    let rig = Rig::new(settings_for(&["Front"]), fire(90.0)).await;
    let base = dashboard(&rig, Arc::new(StatusBoard::new())).await;
    let client = reqwest::Client::new();

    let mut settings: Settings = client
        .get(format!("{base}/settings"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(settings.email.app_password, REDACTED);

    settings.frame_delay_secs = 0.01;
    let resp = client
        .post(format!("{base}/settings"))
        .json(&settings)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    settings.frame_delay_secs = 1.0;
    let resp = client
        .post(format!("{base}/settings"))
        .json(&settings)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(rig.session.settings().frame_delay_secs, 1.0);
    assert_eq!(rig.session.settings().email.app_password, "secret");

    Ok(())
}

#[tokio::test]
async fn motor_command_needs_a_device() -> TestResult {
    let rig = Rig::new(settings_for(&["Front"]), fire(90.0)).await;
    let base = dashboard(&rig, Arc::new(StatusBoard::new())).await;

    let resp = reqwest::get(format!("{base}/motorcmd?cmd=left")).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn only_configured_cameras_can_be_streamed() -> TestResult {
    let rig = Rig::new(settings_for(&["Front"]), fire(90.0)).await;
    let pubsub = Arc::new(NamedPubSub::new());
    let app = router(Arc::new(DashboardState {
        session: rig.session.clone(),
        board: Arc::new(StatusBoard::new()),
        pubsub: pubsub.clone(),
        client: reqwest::Client::new(),
    }));
    let base = format!("http://{}", support::serve(app).await);

    for query in ["?name=Garage", "?name=", ""] {
        let resp = reqwest::get(format!("{base}/stream{query}")).await?;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
    assert!(!pubsub.has_receivers("Garage"));

    let resp = reqwest::get(format!("{base}/stream?name=Front")).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-type"],
        "multipart/x-mixed-replace; boundary=frame"
    );
    assert!(pubsub.has_receivers("Front"));

    Ok(())
}
