//! start / stop / restart コマンドの送信
//!
//! stop と restart は確認を経てから送る。送信後は結果に応じたメッセージを出し、
//! コマンドごとの遅延で1回だけステータスを再取得する（収束を待ったりはしない）。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::client::{ApiError, ConsoleApi};
use crate::api::models::{ChannelCommand, CommandResponse};
use crate::console::events::ConsoleEvent;
use crate::console::timer_service::{TimerConfig, TimerKind, TimerResult, TimerService};

impl ChannelCommand {
    /// 配信を止めるコマンドは確認が必要
    pub fn requires_confirmation(self) -> bool {
        matches!(self, ChannelCommand::Stop | ChannelCommand::Restart)
    }

    /// 確認用ステータス再取得までの遅延
    pub fn refresh_delay(self) -> Duration {
        match self {
            ChannelCommand::Start => Duration::from_secs(3),
            ChannelCommand::Stop => Duration::from_secs(2),
            ChannelCommand::Restart => Duration::from_secs(5),
        }
    }

    pub fn confirmation_prompt(self, channel: &str) -> String {
        match self {
            ChannelCommand::Start => format!("Start the stream on {}?", channel),
            ChannelCommand::Stop => {
                format!("Are you sure you want to stop the stream on {}?", channel)
            }
            ChannelCommand::Restart => {
                format!("Are you sure you want to restart the stream on {}?", channel)
            }
        }
    }

    pub fn success_message(self) -> &'static str {
        match self {
            ChannelCommand::Start => "Start command sent",
            ChannelCommand::Stop => "Stop command sent",
            ChannelCommand::Restart => "Restart command sent",
        }
    }

    pub fn failure_message(self) -> &'static str {
        match self {
            ChannelCommand::Start => "Failed to start the stream",
            ChannelCommand::Stop => "Failed to stop the stream",
            ChannelCommand::Restart => "Failed to restart the stream",
        }
    }
}

/// 確認待ちのコマンド
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation {
    pub channel: String,
    pub command: ChannelCommand,
    pub prompt: String,
}

impl PendingConfirmation {
    pub fn new(channel: &str, command: ChannelCommand) -> Self {
        Self {
            channel: channel.to_string(),
            command,
            prompt: command.confirmation_prompt(channel),
        }
    }
}

/// コマンド結果の表示内容
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
}

impl CommandOutcome {
    pub fn from_result(command: ChannelCommand, result: &Result<CommandResponse, ApiError>) -> Self {
        match result {
            Ok(response) if response.success => Self {
                success: true,
                message: command.success_message().to_string(),
            },
            Ok(response) => Self {
                success: false,
                message: match response.error.as_deref().filter(|e| !e.is_empty()) {
                    Some(error) => format!("{}: {}", command.failure_message(), error),
                    None => command.failure_message().to_string(),
                },
            },
            Err(_) => Self {
                success: false,
                message: command.failure_message().to_string(),
            },
        }
    }
}

/// コマンド送信と確認用の再取得スケジュール
pub struct CommandDispatcher {
    api: Arc<dyn ConsoleApi>,
    events: mpsc::UnboundedSender<ConsoleEvent>,
    timers: TimerService,
    next_refresh: AtomicU64,
}

impl CommandDispatcher {
    pub fn new(
        api: Arc<dyn ConsoleApi>,
        events: mpsc::UnboundedSender<ConsoleEvent>,
        timers: TimerService,
    ) -> Self {
        Self {
            api,
            events,
            timers,
            next_refresh: AtomicU64::new(0),
        }
    }

    /// コマンドを1回だけ送る（自動リトライはしない）
    pub fn send(&self, channel: &str, command: ChannelCommand) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let channel = channel.to_string();

        tracing::info!("🎛️ Sending {} to {}", command, channel);
        tokio::spawn(async move {
            let result = api.command(&channel, command).await;
            if let Err(e) = &result {
                tracing::error!("❌ {} command failed for {}: {}", command, channel, e);
            }
            let _ = events.send(ConsoleEvent::CommandCompleted {
                channel,
                command,
                result,
            });
        });
    }

    /// 遅延後に1回だけステータス再取得を要求する
    pub fn schedule_refresh(&self, channel: &str, command: ChannelCommand) {
        let serial = self.next_refresh.fetch_add(1, Ordering::SeqCst);
        let id = format!("command-refresh:{}:{}", command, serial);
        let events = self.events.clone();
        let channel = channel.to_string();
        let delay = command.refresh_delay();

        tracing::debug!("⏳ Status refresh for {} in {:?}", channel, delay);
        self.timers.start_task(
            id,
            TimerKind::CommandRefresh,
            TimerConfig::once(delay),
            move |_context| {
                let _ = events.send(ConsoleEvent::CommandRefreshDue {
                    channel: channel.clone(),
                });
                TimerResult::Complete
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_rules() {
        assert!(!ChannelCommand::Start.requires_confirmation());
        assert!(ChannelCommand::Stop.requires_confirmation());
        assert!(ChannelCommand::Restart.requires_confirmation());
    }

    #[test]
    fn test_refresh_delays() {
        assert_eq!(ChannelCommand::Stop.refresh_delay(), Duration::from_secs(2));
        assert_eq!(ChannelCommand::Start.refresh_delay(), Duration::from_secs(3));
        assert_eq!(ChannelCommand::Restart.refresh_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_outcome_wording() {
        let ok = CommandOutcome::from_result(
            ChannelCommand::Restart,
            &Ok(CommandResponse {
                success: true,
                error: None,
                message: None,
            }),
        );
        assert!(ok.success);
        assert_eq!(ok.message, "Restart command sent");

        let rejected = CommandOutcome::from_result(
            ChannelCommand::Stop,
            &Ok(CommandResponse {
                success: false,
                error: Some("not running".to_string()),
                message: None,
            }),
        );
        assert!(!rejected.success);
        assert_eq!(rejected.message, "Failed to stop the stream: not running");

        let network = CommandOutcome::from_result(ChannelCommand::Start, &Err(ApiError::Unauthorized));
        assert_eq!(network.message, "Failed to start the stream");
    }

    #[test]
    fn test_pending_prompt_names_channel() {
        let pending = PendingConfirmation::new("ch1", ChannelCommand::Stop);
        assert!(pending.prompt.contains("ch1"));
        assert!(pending.prompt.contains("stop"));
    }
}
