//! チャンネル設定の編集と変更履歴
//!
//! フォームの項目は固定5つ。バックエンドが返さない項目は既定値で埋める。
//! 保存は差分ではなく全項目を1回のリクエストで送り、
//! 成否にかかわらずフォーム上の入力はそのまま残す。

use chrono::{DateTime, NaiveDateTime};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::client::{ApiError, ConsoleApi};
use crate::api::models::{ConfigResponse, HistoryEntry, SaveConfigResponse};
use crate::console::events::ConsoleEvent;

pub const SAVE_SUCCEEDED: &str = "Configuration saved";
pub const SAVE_FAILED: &str = "Failed to save configuration";
pub const NO_HISTORY: &str = "No updates recorded";

/// 設定項目
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum ConfigKey {
    #[display("RESTART_HOUR")]
    RestartHour,
    #[display("VIDEO_BITRATE")]
    VideoBitrate,
    #[display("AUDIO_BITRATE")]
    AudioBitrate,
    #[display("VIDEO_FPS")]
    VideoFps,
    #[display("VIDEO_SCALE")]
    VideoScale,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::RestartHour,
        ConfigKey::VideoBitrate,
        ConfigKey::AudioBitrate,
        ConfigKey::VideoFps,
        ConfigKey::VideoScale,
    ];

    /// バックエンドが値を返さないときの既定値
    pub fn default_value(self) -> &'static str {
        match self {
            ConfigKey::RestartHour => "12",
            ConfigKey::VideoBitrate => "4500k",
            ConfigKey::AudioBitrate => "160k",
            ConfigKey::VideoFps => "30",
            ConfigKey::VideoScale => "1920:1080",
        }
    }
}

impl FromStr for ConfigKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .into_iter()
            .find(|key| key.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown config key: {}", s))
    }
}

/// 設定フォーム
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigForm {
    values: BTreeMap<ConfigKey, String>,
    last_saved: Option<String>,
}

impl Default for ConfigForm {
    fn default() -> Self {
        Self {
            values: ConfigKey::ALL
                .into_iter()
                .map(|key| (key, key.default_value().to_string()))
                .collect(),
            last_saved: None,
        }
    }
}

impl ConfigForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得した設定でフォームを埋める
    pub fn populate(&mut self, response: &ConfigResponse) {
        for key in ConfigKey::ALL {
            let value = response
                .config
                .get(&key.to_string())
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| key.default_value().to_string());
            self.values.insert(key, value);
        }
        self.last_saved = response.last_saved.clone();
    }

    pub fn set(&mut self, key: ConfigKey, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    pub fn value(&self, key: ConfigKey) -> &str {
        self.values
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.default_value())
    }

    /// 保存用の全項目
    pub fn updates(&self) -> BTreeMap<String, String> {
        ConfigKey::ALL
            .into_iter()
            .map(|key| (key.to_string(), self.value(key).to_string()))
            .collect()
    }

    pub fn last_saved(&self) -> Option<&str> {
        self.last_saved.as_deref()
    }

    pub fn set_last_saved(&mut self, last_saved: Option<String>) {
        if last_saved.is_some() {
            self.last_saved = last_saved;
        }
    }
}

/// 保存結果
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved { last_saved: Option<String> },
    Rejected { message: String },
}

impl SaveOutcome {
    pub fn from_result(result: Result<SaveConfigResponse, ApiError>) -> Self {
        match result {
            Ok(response) if response.success => SaveOutcome::Saved {
                last_saved: response.last_saved,
            },
            Ok(response) => SaveOutcome::Rejected {
                message: response
                    .error
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| SAVE_FAILED.to_string()),
            },
            Err(e) => {
                tracing::error!("❌ Config save request failed: {}", e);
                SaveOutcome::Rejected {
                    message: SAVE_FAILED.to_string(),
                }
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SaveOutcome::Saved { .. } => SAVE_SUCCEEDED,
            SaveOutcome::Rejected { message } => message,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }
}

/// 履歴の表示項目
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryItem {
    Entry { timestamp: String, keys: String },
    Placeholder,
}

impl HistoryItem {
    pub fn text(&self) -> String {
        match self {
            HistoryItem::Entry { timestamp, keys } => format!("{} - {}", timestamp, keys),
            HistoryItem::Placeholder => NO_HISTORY.to_string(),
        }
    }
}

/// ISO形式なら読みやすく整形し、それ以外はそのまま表示する
pub fn format_timestamp(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%Y-%m-%d %H:%M:%S").to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format("%Y-%m-%d %H:%M:%S").to_string();
    }
    raw.to_string()
}

/// 履歴をバックエンドの順序のまま表示項目にする。空なら案内を1件だけ出す
pub fn render_history(entries: &[HistoryEntry]) -> Vec<HistoryItem> {
    if entries.is_empty() {
        return vec![HistoryItem::Placeholder];
    }

    entries
        .iter()
        .map(|entry| HistoryItem::Entry {
            timestamp: format_timestamp(&entry.timestamp),
            keys: entry
                .updates
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect()
}

/// 設定の取得・保存・履歴取得
pub struct ConfigEditor {
    api: Arc<dyn ConsoleApi>,
    events: mpsc::UnboundedSender<ConsoleEvent>,
}

impl ConfigEditor {
    pub fn new(api: Arc<dyn ConsoleApi>, events: mpsc::UnboundedSender<ConsoleEvent>) -> Self {
        Self { api, events }
    }

    pub fn load(&self, channel: &str) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let channel = channel.to_string();

        tokio::spawn(async move {
            let result = api.config(&channel).await;
            if let Err(e) = &result {
                tracing::warn!("⚠️ Failed to load config for {}: {}", channel, e);
            }
            let _ = events.send(ConsoleEvent::ConfigLoaded { channel, result });
        });
    }

    pub fn save(&self, channel: &str, updates: BTreeMap<String, String>) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let channel = channel.to_string();

        tracing::info!("💾 Saving config for {} ({} keys)", channel, updates.len());
        tokio::spawn(async move {
            let result = api.save_config(&channel, updates).await;
            let _ = events.send(ConsoleEvent::ConfigSaved { channel, result });
        });
    }

    pub fn load_history(&self, channel: &str) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let channel = channel.to_string();

        tokio::spawn(async move {
            let result = api.config_history(&channel).await;
            if let Err(e) = &result {
                tracing::warn!("⚠️ Failed to load config history for {}: {}", channel, e);
            }
            let _ = events.send(ConsoleEvent::HistoryLoaded { channel, result });
        });
    }
}
