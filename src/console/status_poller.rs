//! ステータスポーリング
//!
//! 選択直後に1回取得し、その後は同じチャンネルが選択されている間だけ
//! 一定間隔で再取得する。応答は要求時のチャンネル名付きでイベントループに戻り、
//! 選択が変わっていれば破棄される（判定は `Console::dispatch` 側）。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::client::ConsoleApi;
use crate::api::models::{ChannelCommand, ChannelStatus};
use crate::console::events::ConsoleEvent;
use crate::console::timer_service::{TimerConfig, TimerId, TimerKind, TimerResult, TimerService};

pub const LABEL_ONLINE: &str = "Online";
pub const LABEL_OFFLINE: &str = "Offline";
pub const DETAIL_NOT_SENDING: &str = "Process running, not sending";
pub const DETAIL_NO_ACTIVITY: &str = "No recent activity";
pub const PLACEHOLDER: &str = "N/A";

/// 稼働時間を `1h 2m 3s` 形式に整形する（先頭のゼロ単位は省略）
pub fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// 操作ボタンの有効/無効。配信状態だけから決まる
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub restart_enabled: bool,
}

impl ControlState {
    pub fn for_liveness(live: bool) -> Self {
        Self {
            start_enabled: !live,
            stop_enabled: live,
            restart_enabled: live,
        }
    }

    /// このコマンドのボタンが有効か
    pub fn allows(self, command: ChannelCommand) -> bool {
        match command {
            ChannelCommand::Start => self.start_enabled,
            ChannelCommand::Stop => self.stop_enabled,
            ChannelCommand::Restart => self.restart_enabled,
        }
    }
}

/// ステータス表示
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    pub live: bool,
    pub label: &'static str,
    pub detail: String,
    pub uptime: String,
    pub current_video: String,
    pub video_count: u64,
    pub next_restart: String,
    pub config_last_saved: String,
    pub controls: ControlState,
}

impl StatusView {
    pub fn from_status(status: &ChannelStatus) -> Self {
        let live = status.is_live();
        let detail = if status.is_running_without_stream() {
            DETAIL_NOT_SENDING.to_string()
        } else {
            status
                .last_activity
                .clone()
                .unwrap_or_else(|| DETAIL_NO_ACTIVITY.to_string())
        };

        Self {
            live,
            label: if live { LABEL_ONLINE } else { LABEL_OFFLINE },
            detail,
            uptime: format_uptime(status.uptime),
            current_video: or_placeholder(&status.current_video),
            video_count: status.video_count,
            next_restart: or_placeholder(&status.next_restart),
            config_last_saved: or_placeholder(&status.config_last_saved),
            controls: ControlState::for_liveness(live),
        }
    }
}

fn or_placeholder(value: &Option<String>) -> String {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or(PLACEHOLDER)
        .to_string()
}

/// 選択中チャンネルのポーリングタイマー
///
/// ドロップ（または `cancel`）でタイマーが止まる。
#[derive(Debug)]
pub struct PollHandle {
    id: TimerId,
    channel: String,
    generation: u64,
    timers: TimerService,
}

impl PollHandle {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if self.timers.cancel_task(&self.id) {
            tracing::debug!("⏹️ Poll timer released: {}", self.channel);
        }
    }
}

/// ステータスの取得とポーリングタイマーの生成
pub struct StatusPoller {
    api: Arc<dyn ConsoleApi>,
    events: mpsc::UnboundedSender<ConsoleEvent>,
    timers: TimerService,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(
        api: Arc<dyn ConsoleApi>,
        events: mpsc::UnboundedSender<ConsoleEvent>,
        timers: TimerService,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            events,
            timers,
            interval,
        }
    }

    /// ステータスを1回取得する
    pub fn fetch(&self, channel: &str) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let channel = channel.to_string();

        tokio::spawn(async move {
            let result = api.status(&channel).await;
            if let Err(e) = &result {
                tracing::warn!("⚠️ Failed to load status for {}: {}", channel, e);
            }
            let _ = events.send(ConsoleEvent::StatusLoaded { channel, result });
        });
    }

    /// 定期取得タイマーを開始する
    pub fn start(&self, channel: &str, generation: u64) -> PollHandle {
        let id = format!("status-poll:{}", generation);
        let events = self.events.clone();
        let tick_channel = channel.to_string();

        self.timers.start_task(
            id.clone(),
            TimerKind::StatusPoll,
            TimerConfig::periodic(self.interval),
            move |_context| {
                let tick = ConsoleEvent::PollTick {
                    channel: tick_channel.clone(),
                    generation,
                };
                match events.send(tick) {
                    Ok(()) => TimerResult::Continue,
                    Err(_) => TimerResult::Error("event loop closed".to_string()),
                }
            },
        );

        tracing::debug!(
            "🔁 Poll timer started: {} every {:?} (generation {})",
            channel,
            self.interval,
            generation
        );

        PollHandle {
            id,
            channel: channel.to_string(),
            generation,
            timers: self.timers.clone(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
