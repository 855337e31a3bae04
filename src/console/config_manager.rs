//! コンソール設定管理モジュール
//!
//! XDGディレクトリの `config.toml` を読み書きする。
//! ファイルが無ければ既定値、コマンドライン引数があればそちらを優先する。

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// パスワードを上書きする環境変数
pub const PASSWORD_ENV: &str = "CHANNEL_CONSOLE_PASSWORD";

/// 設定値の検証エラー
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("Invalid server URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Player command is empty")]
    EmptyPlayerCommand,
}

/// ログ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// ログレベル (trace/debug/info/warn/error)
    pub level: String,
    /// ファイル出力有効化（無効なら標準エラーへ）
    pub enable_file_logging: bool,
    /// カスタムログディレクトリ（Noneの場合はXDGデフォルト使用）
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            enable_file_logging: false,
            log_dir: None,
        }
    }
}

/// プレビュー用の外部プレイヤー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: "mpv".to_string(),
            args: vec!["--really-quiet".to_string(), "--force-window=yes".to_string()],
        }
    }
}

/// コンソール設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// ダッシュボードのURL
    pub server_url: String,
    /// プッシュチャンネルのパス
    pub push_path: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// ステータスのポーリング間隔（秒）
    pub poll_interval_secs: u64,
    /// 選択時に取得するログ行数
    pub log_lines: usize,
    /// 表示に残すログ行数
    pub log_buffer_lines: usize,
    /// 一時メッセージの表示時間（秒）
    pub message_ttl_secs: u64,
    pub player: PlayerConfig,
    pub log: LogConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            push_path: "/socket.io/".to_string(),
            username: None,
            password: None,
            poll_interval_secs: 5,
            log_lines: 100,
            log_buffer_lines: 1000,
            message_ttl_secs: 6,
            player: PlayerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ConsoleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn message_ttl(&self) -> Duration {
        Duration::from_secs(self.message_ttl_secs)
    }

    /// 環境変数でパスワードを上書きする
    pub fn apply_env(&mut self) {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                debug!("Password taken from {}", PASSWORD_ENV);
                self.password = Some(password);
            }
        }
    }

    /// 値の妥当性を検証
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Zero {
                field: "poll_interval_secs",
            });
        }
        if self.log_lines == 0 {
            return Err(ConfigError::Zero { field: "log_lines" });
        }
        if self.log_buffer_lines == 0 {
            return Err(ConfigError::Zero {
                field: "log_buffer_lines",
            });
        }
        if self.message_ttl_secs == 0 {
            return Err(ConfigError::Zero {
                field: "message_ttl_secs",
            });
        }
        if self.player.command.trim().is_empty() {
            return Err(ConfigError::EmptyPlayerCommand);
        }

        let url = reqwest::Url::parse(&self.server_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.server_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.server_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        Ok(())
    }
}

/// 設定管理マネージャー
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// XDGディレクトリの設定ファイルを使う
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        Ok(Self { config_path })
    }

    /// 指定パスの設定ファイルを使う（`--config`）
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    fn default_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("dev", "lofi", "channel-console")
            .context("Failed to get project directories")?;

        let config_file = project_dirs.config_dir().join("config.toml");
        debug!("Config file path: {}", config_file.display());
        Ok(config_file)
    }

    /// 設定を読み込み
    pub fn load_config(&self) -> Result<ConsoleConfig> {
        if !self.config_path.exists() {
            info!(
                "Config file not found, using default settings: {}",
                self.config_path.display()
            );
            return Ok(ConsoleConfig::default());
        }

        let content = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;

        let config: ConsoleConfig = toml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse config file: {}",
                self.config_path.display()
            )
        })?;

        info!(
            "✅ Configuration loaded from: {}",
            self.config_path.display()
        );
        Ok(config)
    }

    /// 設定を保存
    pub fn save_config(&self, config: &ConsoleConfig) -> Result<()> {
        let content = toml::to_string_pretty(config).context("Failed to serialize config")?;

        fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;

        info!("💾 Configuration saved to: {}", self.config_path.display());
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
