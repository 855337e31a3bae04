//! start / stop / restart の統合テスト

mod common;

use std::time::Duration;

use channel_console::api::models::{ChannelCommand, ChannelStatus, CommandResponse};
use channel_console::console::timer_service::TimerKind;
use channel_console::console::view::MessageTone;
use common::*;

/// 停止中のチャンネルを選択済みにする
async fn selected(channel: &str) -> Harness {
    selected_with(channel, status(false, None)).await
}

/// 配信中のチャンネルを選択済みにする
async fn selected_live(channel: &str) -> Harness {
    selected_with(channel, status(true, Some(true))).await
}

async fn selected_with(channel: &str, channel_status: ChannelStatus) -> Harness {
    let mut h = Harness::new();
    h.api.set_status(channel, channel_status);
    h.console.select_channel(channel);
    h.settle().await;
    h.api.clear_calls();
    h
}

fn message(h: &Harness) -> Option<(String, MessageTone)> {
    h.console
        .view()
        .message
        .as_ref()
        .map(|m| (m.text.clone(), m.tone))
}

#[tokio::test(start_paused = true)]
async fn test_start_sends_without_confirmation() {
    let mut h = selected("ch1").await;

    h.console.request_command(ChannelCommand::Start);
    assert!(h.console.view().confirmation.is_none());
    h.settle().await;

    assert_eq!(h.api.count("start:ch1"), 1);
    assert_eq!(
        message(&h),
        Some(("Start command sent".to_string(), MessageTone::Info))
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_schedules_one_refresh_after_three_seconds() {
    let mut h = selected("ch1").await;
    h.console.request_command(ChannelCommand::Start);
    h.settle().await;
    assert_eq!(h.console.timers().active_count(&TimerKind::CommandRefresh), 1);

    h.advance(Duration::from_secs(2)).await;
    assert_eq!(h.api.count("status:ch1"), 0);

    h.advance(Duration::from_secs(1)).await;
    assert_eq!(h.api.count("status:ch1"), 1);
    assert_eq!(h.console.timers().active_count(&TimerKind::CommandRefresh), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_requires_confirmation() {
    let mut h = selected_live("ch1").await;

    h.console.request_command(ChannelCommand::Stop);
    h.settle().await;
    assert_eq!(h.api.count("stop:ch1"), 0);
    let prompt = h.console.view().confirmation.as_ref().unwrap().prompt.clone();
    assert!(prompt.contains("ch1"));

    h.console.confirm(false);
    h.settle().await;
    assert_eq!(h.api.count("stop:ch1"), 0);
    assert!(h.console.view().confirmation.is_none());

    h.console.request_command(ChannelCommand::Stop);
    h.console.confirm(true);
    h.settle().await;
    assert_eq!(h.api.count("stop:ch1"), 1);
    assert_eq!(
        message(&h),
        Some(("Stop command sent".to_string(), MessageTone::Info))
    );

    h.advance(Duration::from_secs(2)).await;
    assert_eq!(h.api.count("status:ch1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_refresh_after_five_seconds() {
    let mut h = selected_live("ch1").await;
    h.console.request_command(ChannelCommand::Restart);
    h.console.confirm(true);
    h.settle().await;
    assert_eq!(h.api.count("restart:ch1"), 1);

    h.advance(Duration::from_millis(4900)).await;
    assert_eq!(h.api.count("status:ch1"), 0);

    // 定期ポーリングと確認用の再取得が同時に来る
    h.advance(Duration::from_millis(100)).await;
    assert_eq!(h.api.count("status:ch1"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_command_failure_shows_error_message() {
    let mut h = selected("ch1").await;
    h.api.fail_commands();

    h.console.request_command(ChannelCommand::Start);
    h.settle().await;

    assert_eq!(
        message(&h),
        Some(("Failed to start the stream".to_string(), MessageTone::Error))
    );
    // 失敗は自動で再送しない
    h.advance(Duration::from_secs(10)).await;
    assert_eq!(h.api.count("start:ch1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_application_failure_uses_server_error() {
    let mut h = selected_live("ch1").await;
    h.api.set_command_response(CommandResponse {
        success: false,
        error: Some("channel already stopped".to_string()),
        message: None,
    });

    h.console.request_command(ChannelCommand::Stop);
    h.console.confirm(true);
    h.settle().await;

    let (text, tone) = message(&h).unwrap();
    assert_eq!(tone, MessageTone::Error);
    assert_eq!(text, "Failed to stop the stream: channel already stopped");
}

#[tokio::test(start_paused = true)]
async fn test_message_expires_unless_replaced() {
    let mut h = selected("ch1").await;
    h.console.request_command(ChannelCommand::Start);
    h.settle().await;
    assert!(message(&h).is_some());

    h.advance(Duration::from_secs(4)).await;
    h.console.request_command(ChannelCommand::Start);
    h.settle().await;

    // 最初のメッセージの期限では消えない
    h.advance(Duration::from_secs(2)).await;
    assert!(message(&h).is_some());

    h.advance(Duration::from_secs(4)).await;
    assert!(message(&h).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_commands_need_a_selection() {
    let mut h = Harness::new();
    h.console.request_command(ChannelCommand::Start);
    h.console.request_command(ChannelCommand::Stop);
    h.settle().await;

    assert!(h.console.view().confirmation.is_none());
    assert!(h.api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_switching_drops_pending_confirmation() {
    let mut h = selected_live("ch1").await;
    h.api.set_status("ch2", status(true, Some(true)));
    h.console.request_command(ChannelCommand::Restart);
    h.console.select_channel("ch2");
    h.console.confirm(true);
    h.settle().await;

    assert_eq!(h.api.count("restart:ch1"), 0);
    assert_eq!(h.api.count("restart:ch2"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_refused_while_live() {
    let mut h = selected_live("ch1").await;
    assert!(!h.console.view().status.as_ref().unwrap().controls.start_enabled);

    h.console.request_command(ChannelCommand::Start);
    h.settle().await;

    assert_eq!(h.api.count("start:ch1"), 0);
    assert!(h.console.view().message.is_none());
    assert_eq!(h.console.timers().active_count(&TimerKind::CommandRefresh), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_and_restart_refused_while_offline() {
    let mut h = selected_with("ch1", status(true, Some(false))).await;

    h.console.request_command(ChannelCommand::Stop);
    assert!(h.console.view().confirmation.is_none());
    h.console.confirm(true);
    h.console.request_command(ChannelCommand::Restart);
    assert!(h.console.view().confirmation.is_none());
    h.console.confirm(true);
    h.settle().await;

    assert_eq!(h.api.count("stop:ch1"), 0);
    assert_eq!(h.api.count("restart:ch1"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_rechecks_latest_status() {
    let mut h = selected_live("ch1").await;
    h.console.request_command(ChannelCommand::Stop);
    assert!(h.console.view().confirmation.is_some());

    // 確認中にポーリングで停止が判明する
    h.api.set_status("ch1", status(false, Some(false)));
    h.advance(Duration::from_secs(5)).await;
    assert!(!h.console.view().status.as_ref().unwrap().controls.stop_enabled);

    h.console.confirm(true);
    h.settle().await;
    assert_eq!(h.api.count("stop:ch1"), 0);
    assert!(h.console.view().confirmation.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_commands_allowed_before_first_status() {
    let mut h = Harness::new();
    h.api.delay_status("ch1", Duration::from_secs(30));
    h.console.select_channel("ch1");
    h.settle().await;
    assert!(h.console.view().status.is_none());

    h.console.request_command(ChannelCommand::Start);
    h.settle().await;
    assert_eq!(h.api.count("start:ch1"), 1);
}
