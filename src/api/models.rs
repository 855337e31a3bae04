//! バックエンドAPIのJSON構造
//!
//! ダッシュボードサーバーが返すレスポンスをそのまま受け取るための型。
//! 欠けているフィールドはすべて既定値で補う。

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// チャンネル一覧の1要素
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Channel {
    pub name: String,
    #[serde(default)]
    pub status: ChannelStatus,
}

/// `GET /api/channels`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsResponse {
    #[serde(default)]
    pub channels: Vec<Channel>,
}

/// `GET /api/channel/{name}/status`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChannelStatus {
    #[serde(default)]
    pub running: bool,
    /// 実際に配信データを送っているか。存在する場合はこちらが優先
    #[serde(default)]
    pub streaming: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_seconds")]
    pub uptime: u64,
    #[serde(default)]
    pub current_video: Option<String>,
    #[serde(default)]
    pub video_count: u64,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub next_restart: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub last_activity: Option<String>,
    #[serde(default)]
    pub preview_ready: bool,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub config_last_saved: Option<String>,
}

impl ChannelStatus {
    /// 配信中かどうか（`streaming` があればそれを、なければ `running` を使う）
    pub fn is_live(&self) -> bool {
        self.streaming.unwrap_or(self.running)
    }

    /// プロセスは生きているがデータを送っていない状態
    pub fn is_running_without_stream(&self) -> bool {
        self.running && self.streaming == Some(false)
    }

    /// プレビュー可能なURL
    pub fn ready_preview_url(&self) -> Option<&str> {
        if !self.preview_ready {
            return None;
        }
        self.preview_url.as_deref().filter(|url| !url.is_empty())
    }
}

/// 秒数はバックエンドによって整数・小数・null のいずれでも届く
fn deserialize_seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.floor() as u64))
            .unwrap_or(0),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(|f| f.max(0.0) as u64)
            .unwrap_or(0),
        _ => 0,
    })
}

/// 時刻は文字列のほか、エポック秒（整数・小数）で届くこともある
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => n.as_f64().map(|secs| {
            chrono::DateTime::from_timestamp(secs.floor() as i64, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| n.to_string())
        }),
        _ => None,
    })
}

/// `GET /api/channel/{name}/config`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigResponse {
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub last_saved: Option<String>,
}

/// `POST /api/channel/{name}/config` のリクエストボディ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveConfigRequest {
    pub updates: BTreeMap<String, String>,
}

/// `POST /api/channel/{name}/config` のレスポンス
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SaveConfigResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub last_saved: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// 設定変更履歴の1件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: String,
    #[serde(default)]
    pub updates: BTreeMap<String, serde_json::Value>,
}

/// `GET /api/channel/{name}/config/history`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistoryResponse {
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// `GET /api/channel/{name}/logs`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogsResponse {
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub total: Option<usize>,
}

/// start / stop / restart のレスポンス
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CommandResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /api/server-info`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerInfo {
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default)]
    pub local_ip: Option<String>,
    #[serde(default)]
    pub local_url: Option<String>,
}

/// `GET /api/public-ip`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PublicIpResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub dashboard_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// チャンネルに送る操作コマンド
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ChannelCommand {
    #[display("start")]
    Start,
    #[display("stop")]
    Stop,
    #[display("restart")]
    Restart,
}

/// `POST /login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}
