//! コンソールのイベントループに流れるイベント
//!
//! ネットワーク応答・タイマー・プッシュ受信の継続処理はすべてこの型で
//! 1本のキューに戻され、`Console::dispatch` が順に適用する。

use crate::api::client::ApiError;
use crate::api::models::{
    Channel, ChannelCommand, ChannelStatus, CommandResponse, ConfigResponse, HistoryEntry,
    PublicIpResponse, SaveConfigResponse, ServerInfo,
};
use crate::api::push::PushEvent;

#[derive(Debug)]
pub enum ConsoleEvent {
    /// チャンネル一覧の取得結果
    ChannelsLoaded(Result<Vec<Channel>, ApiError>),
    /// ステータス取得結果（要求時のチャンネル名付き）
    StatusLoaded {
        channel: String,
        result: Result<ChannelStatus, ApiError>,
    },
    /// ポーリングタイマーの発火
    PollTick { channel: String, generation: u64 },
    /// 直近ログの一括取得結果
    LogsLoaded {
        channel: String,
        result: Result<Vec<String>, ApiError>,
    },
    /// プッシュチャンネルからの受信
    Push(PushEvent),
    /// 設定の取得結果
    ConfigLoaded {
        channel: String,
        result: Result<ConfigResponse, ApiError>,
    },
    /// 設定保存の結果
    ConfigSaved {
        channel: String,
        result: Result<SaveConfigResponse, ApiError>,
    },
    /// 設定履歴の取得結果
    HistoryLoaded {
        channel: String,
        result: Result<Vec<HistoryEntry>, ApiError>,
    },
    /// コマンド送信の結果
    CommandCompleted {
        channel: String,
        command: ChannelCommand,
        result: Result<CommandResponse, ApiError>,
    },
    /// コマンド後の確認用ステータス再取得
    CommandRefreshDue { channel: String },
    /// 一時メッセージの期限切れ
    MessageExpired { message_id: u64 },
    /// サーバー情報
    ServerInfoLoaded(Result<ServerInfo, ApiError>),
    /// 公開IP（フォールバック）
    PublicIpLoaded(Result<PublicIpResponse, ApiError>),
}

impl ConsoleEvent {
    /// ログ出力用の短い名前
    pub fn name(&self) -> &'static str {
        match self {
            ConsoleEvent::ChannelsLoaded(_) => "channels_loaded",
            ConsoleEvent::StatusLoaded { .. } => "status_loaded",
            ConsoleEvent::PollTick { .. } => "poll_tick",
            ConsoleEvent::LogsLoaded { .. } => "logs_loaded",
            ConsoleEvent::Push(_) => "push",
            ConsoleEvent::ConfigLoaded { .. } => "config_loaded",
            ConsoleEvent::ConfigSaved { .. } => "config_saved",
            ConsoleEvent::HistoryLoaded { .. } => "history_loaded",
            ConsoleEvent::CommandCompleted { .. } => "command_completed",
            ConsoleEvent::CommandRefreshDue { .. } => "command_refresh_due",
            ConsoleEvent::MessageExpired { .. } => "message_expired",
            ConsoleEvent::ServerInfoLoaded(_) => "server_info_loaded",
            ConsoleEvent::PublicIpLoaded(_) => "public_ip_loaded",
        }
    }
}
