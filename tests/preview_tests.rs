//! プレビュー接続の統合テスト

mod common;

use std::sync::Arc;
use std::time::Duration;

use channel_console::console::preview::{AdaptiveEngineProvider, PlaybackStrategy, PreviewState};
use common::*;

const URL_A: &str = "https://cdn.example/ch1/a.m3u8";
const URL_B: &str = "https://cdn.example/ch1/b.m3u8";

fn adaptive(provider: MockEngineProvider) -> (Harness, Arc<MockEngineProvider>) {
    let provider = Arc::new(provider);
    let h = Harness::with_preview(
        RecordingMedia::new(false),
        Some(provider.clone() as Arc<dyn AdaptiveEngineProvider>),
    );
    (h, provider)
}

#[tokio::test(start_paused = true)]
async fn test_native_attach_then_teardown_when_not_ready() {
    let mut h = Harness::new();
    h.api.set_status("ch1", preview_status(Some(URL_A)));

    h.console.select_channel("ch1");
    h.settle().await;

    assert_eq!(
        h.console.preview().state(),
        &PreviewState::Attached {
            url: URL_A.to_string(),
            strategy: PlaybackStrategy::Native,
        }
    );
    assert_eq!(h.media.source().as_deref(), Some(URL_A));
    assert_eq!(h.console.view().preview.label, "Live preview");

    h.api.set_status("ch1", preview_status(None));
    h.media.log.lock().calls.clear();
    h.advance(Duration::from_secs(5)).await;

    assert_eq!(h.console.preview().state(), &PreviewState::Unavailable);
    assert_eq!(h.media.source(), None);
    assert_eq!(h.media.calls(), vec!["pause", "clear_source", "load"]);
    assert_eq!(h.console.view().preview.label, "Preview unavailable");
}

#[tokio::test(start_paused = true)]
async fn test_same_url_is_not_reattached_on_poll() {
    let mut h = Harness::new();
    h.api.set_status("ch1", preview_status(Some(URL_A)));
    h.console.select_channel("ch1");
    h.settle().await;
    h.media.log.lock().calls.clear();

    h.advance(Duration::from_secs(5)).await;
    assert_eq!(h.api.count("status:ch1"), 2);
    assert!(h.media.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_new_url_replaces_adaptive_engine() {
    let (mut h, provider) = adaptive(MockEngineProvider::supported());
    h.api.set_status("ch1", preview_status(Some(URL_A)));

    h.console.select_channel("ch1");
    h.settle().await;
    assert!(h.console.preview().has_engine());
    assert_eq!((provider.created(), provider.live()), (1, 1));
    assert!(matches!(
        h.console.preview().state(),
        PreviewState::Attached { strategy: PlaybackStrategy::Adaptive, .. }
    ));

    h.advance(Duration::from_secs(5)).await;
    assert_eq!(provider.created(), 1);

    h.api.set_status("ch1", preview_status(Some(URL_B)));
    h.advance(Duration::from_secs(5)).await;

    // 古いエンジンは新しいエンジンの生成前に破棄される
    assert_eq!((provider.created(), provider.live()), (2, 1));
    assert_eq!(
        provider.loaded.lock().clone(),
        vec![URL_A.to_string(), URL_B.to_string()]
    );
    assert_eq!(h.media.source().as_deref(), Some(URL_B));
}

#[tokio::test(start_paused = true)]
async fn test_switching_channel_destroys_engine() {
    let (mut h, provider) = adaptive(MockEngineProvider::supported());
    h.api.set_status("ch1", preview_status(Some(URL_A)));
    h.console.select_channel("ch1");
    h.settle().await;
    assert_eq!(provider.live(), 1);

    h.console.select_channel("ch2");
    assert_eq!(provider.live(), 0);
    assert!(!h.console.preview().has_engine());

    h.settle().await;
    assert_eq!(h.console.preview().state(), &PreviewState::Unavailable);
    assert_eq!(provider.created(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_details_twice_releases_once() {
    let (mut h, provider) = adaptive(MockEngineProvider::supported());
    h.api.set_status("ch1", preview_status(Some(URL_A)));
    h.console.select_channel("ch1");
    h.settle().await;

    h.console.close_details();
    h.console.close_details();

    assert_eq!(provider.live(), 0);
    assert_eq!(h.console.preview().state(), &PreviewState::Detached);
    assert_eq!(h.media.source(), None);
    assert_eq!(h.console.view().preview.label, "No preview");
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_environment_attaches_nothing() {
    let mut h = Harness::with_preview(RecordingMedia::new(false), None);
    h.api.set_status("ch1", preview_status(Some(URL_A)));

    h.console.select_channel("ch1");
    h.settle().await;
    h.advance(Duration::from_secs(5)).await;

    assert_eq!(
        h.console.preview().state(),
        &PreviewState::Unsupported {
            url: URL_A.to_string()
        }
    );
    assert_eq!(h.console.view().preview.label, "Format unsupported");
    assert!(!h
        .media
        .calls()
        .iter()
        .any(|c| c.starts_with("set_source") || c == "play"));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_autoplay_still_counts_as_attached() {
    let mut h = Harness::new();
    h.media.log.lock().reject_play = true;
    h.api.set_status("ch1", preview_status(Some(URL_A)));

    h.console.select_channel("ch1");
    h.settle().await;

    assert!(matches!(
        h.console.preview().state(),
        PreviewState::Attached { .. }
    ));
    assert!(h.media.log.lock().paused);
    assert!(h.media.calls().contains(&"play".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_engine_load_failure_is_not_retried() {
    let (mut h, provider) = adaptive(MockEngineProvider {
        supported: true,
        fail_load: true,
        ..Default::default()
    });
    h.api.set_status("ch1", preview_status(Some(URL_A)));

    h.console.select_channel("ch1");
    h.settle().await;

    match h.console.preview().state() {
        PreviewState::Failed { url, reason } => {
            assert_eq!(url, URL_A);
            assert!(reason.contains("manifest 404"));
        }
        other => panic!("unexpected state: {:?}", other),
    }
    assert_eq!(provider.live(), 0);
    assert_eq!(h.console.view().preview.label, "Preview failed");

    h.advance(Duration::from_secs(10)).await;
    assert_eq!(provider.created(), 1);
}
