//! Whole-player scenarios over real HTTP collaborators.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use lesson_player::content::HttpContentClient;
use lesson_player::manifest::{ManifestLoader, StreamMode};
use lesson_player::model::{PlaybackPolicy, ProgressRecord, StepId};
use lesson_player::persistence::{
    HttpProgressStore, LocalProgressCache, ProgressBridge, RemoteProgressStore,
};
use lesson_player::{
    ElementCommand, LessonPlayer, PlayerConfig, PlayerError, PlayerEvent, RecordingElement,
    RemoteConfig, VariantId,
};
use lms_server::{AppState, LmsServer, ServerConfig};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
360p/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720
720p/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080
1080p/index.m3u8
";

async fn spawn_lms(state: AppState) -> (RemoteConfig, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = LmsServer::new(ServerConfig::default(), state);
    let token = server.cancel_token();
    tokio::spawn(server.serve(listener));
    (RemoteConfig::with_base_url(format!("http://{addr}")), token)
}

async fn spawn_cdn() -> String {
    let router = Router::new()
        .route("/hls/master.m3u8", get(|| async { MASTER }))
        .route(
            "/hls/down.m3u8",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        )
        .route(
            "/hls/missing.m3u8",
            get(|| async { (StatusCode::NOT_FOUND, "gone") }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await });
    format!("http://{addr}/hls")
}

#[tokio::test]
async fn manifest_variants_are_ordered_and_resolved() {
    let cdn = spawn_cdn().await;
    let config = PlayerConfig::default();
    let loader = ManifestLoader::http(reqwest::Client::new(), &config);

    let source = loader
        .resolve(&format!("{cdn}/master.m3u8"), &PlaybackPolicy::default())
        .await
        .unwrap();
    assert_eq!(source.mode, StreamMode::Managed);
    let labels: Vec<_> = source.variants.iter().map(|v| v.label.as_str()).collect();
    assert_eq!(labels, ["1080p", "720p", "360p"]);
    assert_eq!(source.variants[0].uri, format!("{cdn}/1080p/index.m3u8"));
}

#[tokio::test]
async fn unavailable_manifests_fail_the_step() {
    let cdn = spawn_cdn().await;
    let config = PlayerConfig::default();
    let loader = ManifestLoader::http(reqwest::Client::new(), &config);

    for name in ["down", "missing"] {
        let err = loader
            .resolve(&format!("{cdn}/{name}.m3u8"), &PlaybackPolicy::default())
            .await
            .unwrap_err();
        assert!(
            matches!(err, PlayerError::SourceUnavailable { .. }),
            "{name}: {err}"
        );
    }
}

#[tokio::test]
async fn watching_a_lesson_syncs_progress_to_the_server() {
    let (remote, lms_token) = spawn_lms(AppState::seeded().unwrap()).await;
    let client = remote.build_client().unwrap();
    let store = Arc::new(HttpProgressStore::new(client.clone(), remote.clone()));
    let config = PlayerConfig::default();
    let writer_token = CancellationToken::new();
    // Module one is already done on this device.
    let local = LocalProgressCache::in_memory();
    for n in 1..=5 {
        local
            .store(ProgressRecord::new(StepId::new(format!("m1-step{n}")), 0.0, 0.0, true))
            .unwrap();
    }
    let (bridge, writer) = ProgressBridge::spawn(
        local,
        store.clone(),
        config.remote_write_retry.clone(),
        writer_token.clone(),
    );
    let element = RecordingElement::new();
    let content = HttpContentClient::new(client.clone(), remote);
    let mut player = LessonPlayer::bootstrap(
        &content,
        ManifestLoader::http(client, &config),
        bridge,
        Box::new(element.clone()),
        config,
    )
    .await
    .unwrap();

    let video = StepId::from("m2-step2");
    player.activate(&video).await;
    assert!(matches!(
        player.drain_events().as_slice(),
        [PlayerEvent::PrerequisiteNotMet { required, .. }] if required.as_str() == "m2-step1"
    ));

    player.mark_step_complete(&StepId::from("m2-step1"));
    player.activate(&video).await;
    assert_eq!(
        element.commands().first(),
        Some(&ElementCommand::Attach {
            url: "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/ElephantsDream.mp4"
                .to_string()
        })
    );

    player.play();
    player.select_variant(VariantId::Auto);
    assert!(player.drain_events().iter().any(|e| matches!(
        e,
        PlayerEvent::ActionRejected { action: "change quality", .. }
    )));

    // 653 s at a 90 % threshold completes at 587.7 s.
    let mut position = 0.0;
    while position < 590.0 {
        position += 10.0;
        player.on_time_update(position);
    }
    let events = player.drain_events();
    let completions = events
        .iter()
        .filter(|e| matches!(e, PlayerEvent::StepCompleted { .. }))
        .count();
    assert_eq!(completions, 1);
    assert!(player.completions().contains(&video));

    player.shutdown();
    drop(player);
    writer.await.unwrap();

    let remote_record = store.load(&video).await.unwrap().unwrap();
    assert!(remote_record.completed);
    assert_eq!(remote_record.max_watched, 590.0);
    assert!(store
        .load(&StepId::from("m2-step1"))
        .await
        .unwrap()
        .is_some_and(|r| r.completed));

    writer_token.cancel();
    lms_token.cancel();
}

#[tokio::test]
async fn remote_progress_seeds_a_fresh_device() {
    let (remote, lms_token) = spawn_lms(AppState::seeded().unwrap()).await;
    let client = remote.build_client().unwrap();
    let store = Arc::new(HttpProgressStore::new(client.clone(), remote.clone()));
    store
        .save(&lesson_player::ProgressRecord::new(
            StepId::from("m1-step3"),
            42.0,
            48.0,
            false,
        ))
        .await
        .unwrap();

    let config = PlayerConfig {
        native_adaptive_playback: true,
        ..PlayerConfig::default()
    };
    let local = LocalProgressCache::in_memory();
    for done in ["m1-step1", "m1-step2"] {
        local
            .store(lesson_player::ProgressRecord::new(StepId::from(done), 0.0, 0.0, true))
            .unwrap();
    }
    let (bridge, _writer) = ProgressBridge::spawn(
        local.clone(),
        store,
        config.remote_write_retry.clone(),
        CancellationToken::new(),
    );
    let element = RecordingElement::new();
    let content = HttpContentClient::new(client.clone(), remote);
    let mut player = LessonPlayer::bootstrap(
        &content,
        ManifestLoader::http(client, &config),
        bridge,
        Box::new(element.clone()),
        config,
    )
    .await
    .unwrap();

    player.activate(&StepId::from("m1-step3")).await;
    let session = player.session().unwrap();
    assert_eq!(session.position(), 42.0);
    assert_eq!(session.max_watched(), 48.0);
    assert_eq!(element.last_seek(), Some(42.0));
    assert!(local.get(&StepId::from("m1-step3")).is_some());

    // Seek-locked step: beyond the high-water mark snaps back.
    player.request_seek(120.0);
    assert!(player.drain_events().iter().any(|e| matches!(
        e,
        PlayerEvent::SeekBlocked { position, .. } if *position == 48.0
    )));
    assert_eq!(element.last_seek(), Some(48.0));

    tokio::time::sleep(Duration::from_millis(10)).await;
    lms_token.cancel();
}
