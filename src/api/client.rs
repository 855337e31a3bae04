//! ダッシュボードHTTP APIクライアント
//!
//! コンソールが使うエンドポイントを `ConsoleApi` トレイトとして抽象化し、
//! 本番用の reqwest 実装 `HttpConsoleApi` を提供する。
//! セッションCookieはクライアント内のJarで保持し、WebSocket接続にも流用する。

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::models::*;

/// API呼び出しのエラー
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unexpected HTTP status: {status}")]
    Status { status: u16 },
    #[error("Not authenticated")]
    Unauthorized,
    #[error("Login rejected: {0}")]
    LoginRejected(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// コンソールが依存するバックエンドAPI
#[async_trait]
pub trait ConsoleApi: Send + Sync {
    /// チャンネル一覧
    async fn channels(&self) -> Result<Vec<Channel>, ApiError>;

    /// チャンネルの状態
    async fn status(&self, channel: &str) -> Result<ChannelStatus, ApiError>;

    /// 現在の設定と最終保存時刻
    async fn config(&self, channel: &str) -> Result<ConfigResponse, ApiError>;

    /// 設定を保存（差分ではなく全項目を送る）
    async fn save_config(
        &self,
        channel: &str,
        updates: BTreeMap<String, String>,
    ) -> Result<SaveConfigResponse, ApiError>;

    /// 設定変更履歴（新しい順）
    async fn config_history(&self, channel: &str) -> Result<Vec<HistoryEntry>, ApiError>;

    /// 直近のログ行
    async fn logs(&self, channel: &str, lines: usize) -> Result<Vec<String>, ApiError>;

    /// start / stop / restart
    async fn command(
        &self,
        channel: &str,
        command: ChannelCommand,
    ) -> Result<CommandResponse, ApiError>;

    /// サーバー情報
    async fn server_info(&self) -> Result<ServerInfo, ApiError>;

    /// 公開IP（server-info が使えない場合のフォールバック）
    async fn public_ip(&self) -> Result<PublicIpResponse, ApiError>;
}

/// エラーステータスでもJSON本文を受け入れるかどうか
#[derive(Debug, Clone, Copy, PartialEq)]
enum DecodeMode {
    Strict,
    AcceptErrorBody,
}

/// reqwest によるHTTP実装
#[derive(Debug, Clone)]
pub struct HttpConsoleApi {
    base_url: Url,
    http_client: reqwest::Client,
    cookie_jar: Arc<Jar>,
}

impl HttpConsoleApi {
    /// 新しいクライアントを作成
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", normalized, e)))?;

        let cookie_jar = Arc::new(Jar::default());
        let http_client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookie_jar))
            .user_agent(concat!("channel-console/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url,
            http_client,
            cookie_jar,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// ダッシュボードにログインしてセッションCookieを取得
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        tracing::info!("🔐 Logging in to {} as {}", self.base_url, username);

        let response = self
            .http_client
            .post(self.endpoint("login")?)
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        let login: LoginResponse = Self::decode(response, DecodeMode::AcceptErrorBody).await?;
        if login.success {
            tracing::info!("✅ Login succeeded");
            Ok(())
        } else {
            let reason = login
                .error
                .unwrap_or_else(|| "invalid credentials".to_string());
            tracing::error!("❌ Login rejected: {}", reason);
            Err(ApiError::LoginRejected(reason))
        }
    }

    /// 現在のセッションCookie（WebSocketハンドシェイク用）
    pub fn cookie_header(&self) -> Option<HeaderValue> {
        self.cookie_jar.cookies(&self.base_url)
    }

    /// プッシュチャンネルのURL（http → ws, https → wss）
    ///
    /// Engine.IO v4 のWebSocketトランスポートを直接指定する。
    pub fn push_url(&self, path: &str) -> Result<Url, ApiError> {
        let mut url = self.endpoint(path.trim_start_matches('/'))?;
        url.query_pairs_mut()
            .clear()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket");
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| ApiError::InvalidUrl(format!("cannot use {} for push", url)))?;
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{}{}: {}", self.base_url, path, e)))
    }

    fn channel_endpoint(&self, channel: &str, suffix: &str) -> Result<Url, ApiError> {
        self.endpoint(&format!(
            "api/channel/{}/{}",
            urlencoding::encode(channel),
            suffix
        ))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        tracing::debug!("📡 GET {}", url);
        let response = self.http_client.get(url).send().await?;
        Self::decode(response, DecodeMode::Strict).await
    }

    /// レスポンスをデコード
    ///
    /// `AcceptErrorBody` の場合、4xx/5xx でも `{success: false, error}` 形式の本文を読む。
    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        mode: DecodeMode,
    ) -> Result<T, ApiError> {
        let status = response.status();

        if mode == DecodeMode::Strict {
            if status == StatusCode::UNAUTHORIZED {
                return Err(ApiError::Unauthorized);
            }
            if !status.is_success() {
                return Err(ApiError::Status {
                    status: status.as_u16(),
                });
            }
        }

        let body = response.bytes().await?;
        match serde_json::from_slice::<T>(&body) {
            Ok(value) => Ok(value),
            Err(_) if status == StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            Err(_) if !status.is_success() => Err(ApiError::Status {
                status: status.as_u16(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ConsoleApi for HttpConsoleApi {
    async fn channels(&self) -> Result<Vec<Channel>, ApiError> {
        let response: ChannelsResponse = self.get_json(self.endpoint("api/channels")?).await?;
        Ok(response.channels)
    }

    async fn status(&self, channel: &str) -> Result<ChannelStatus, ApiError> {
        self.get_json(self.channel_endpoint(channel, "status")?)
            .await
    }

    async fn config(&self, channel: &str) -> Result<ConfigResponse, ApiError> {
        self.get_json(self.channel_endpoint(channel, "config")?)
            .await
    }

    async fn save_config(
        &self,
        channel: &str,
        updates: BTreeMap<String, String>,
    ) -> Result<SaveConfigResponse, ApiError> {
        let url = self.channel_endpoint(channel, "config")?;
        tracing::debug!("📡 POST {} ({} keys)", url, updates.len());

        let response = self
            .http_client
            .post(url)
            .json(&SaveConfigRequest { updates })
            .send()
            .await?;
        Self::decode(response, DecodeMode::AcceptErrorBody).await
    }

    async fn config_history(&self, channel: &str) -> Result<Vec<HistoryEntry>, ApiError> {
        let response: HistoryResponse = self
            .get_json(self.channel_endpoint(channel, "config/history")?)
            .await?;
        Ok(response.history)
    }

    async fn logs(&self, channel: &str, lines: usize) -> Result<Vec<String>, ApiError> {
        let mut url = self.channel_endpoint(channel, "logs")?;
        url.query_pairs_mut()
            .append_pair("lines", &lines.to_string());
        let response: LogsResponse = self.get_json(url).await?;
        Ok(response.logs)
    }

    async fn command(
        &self,
        channel: &str,
        command: ChannelCommand,
    ) -> Result<CommandResponse, ApiError> {
        let url = self.channel_endpoint(channel, &command.to_string())?;
        tracing::info!("📤 POST {}", url);

        let response = self.http_client.post(url).send().await?;
        Self::decode(response, DecodeMode::AcceptErrorBody).await
    }

    async fn server_info(&self) -> Result<ServerInfo, ApiError> {
        self.get_json(self.endpoint("api/server-info")?).await
    }

    async fn public_ip(&self) -> Result<PublicIpResponse, ApiError> {
        let response = self
            .http_client
            .get(self.endpoint("api/public-ip")?)
            .send()
            .await?;
        Self::decode(response, DecodeMode::AcceptErrorBody).await
    }
}
