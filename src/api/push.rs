//! ログのプッシュ購読
//!
//! ダッシュボードは flask-socketio なので、WebSocketトランスポート上で
//! Engine.IO / Socket.IO のフレームを話す（形式は [`super::socket_io`]）。
//!
//! - クライアント → サーバー: `subscribe_logs {channel}`
//! - サーバー → クライアント: `logs {channel, lines}`
//!
//! 購読はサーバー側に残り続けるため、別チャンネルのログも届く。
//! どのイベントを表示するかは受信側（コンソール）がチャンネル名で判定する。
//! 接続が切れたら間隔を空けて繋ぎ直し、繋がるたびに [`PushEvent::Connected`] を流す。

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use super::socket_io::{self, EnginePacket, SocketPacket, DEFAULT_NAMESPACE};

/// プッシュチャンネルのエラー
#[derive(thiserror::Error, Debug)]
pub enum PushError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid handshake header: {0}")]
    InvalidHeader(String),
    #[error("Handshake timed out")]
    HandshakeTimeout,
    #[error("Connection rejected by server: {0}")]
    Rejected(String),
    #[error("Push channel closed")]
    Closed,
}

/// クライアントから送るイベント
#[derive(Debug, Clone, PartialEq)]
pub enum PushCommand {
    SubscribeLogs { channel: String },
}

impl PushCommand {
    /// Socket.IO のイベントフレームにする
    pub fn encode(&self) -> Result<String, PushError> {
        match self {
            Self::SubscribeLogs { channel } => Ok(socket_io::encode_event(
                "subscribe_logs",
                &serde_json::json!({ "channel": channel }),
            )?),
        }
    }
}

/// チャンネル名付きのログ行
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogBatch {
    pub channel: String,
    #[serde(default)]
    pub lines: Vec<String>,
}

/// 受信側に渡すイベント
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Connected,
    Logs(LogBatch),
    Disconnected,
}

/// ログ購読を送るための抽象インタフェース
pub trait LogPushChannel: Send + Sync {
    /// 指定チャンネルのログを購読
    fn subscribe_logs(&self, channel: &str) -> Result<(), PushError>;
}

/// サーバーからのイベントを解釈する。不明なイベントや壊れたデータは捨てる
pub fn parse_event(name: &str, data: Value) -> Option<PushEvent> {
    match name {
        "logs" => match serde_json::from_value::<LogBatch>(data) {
            Ok(batch) => Some(PushEvent::Logs(batch)),
            Err(e) => {
                tracing::debug!("⚠️ Ignoring logs event: {}", e);
                None
            }
        },
        "connected" => {
            tracing::debug!("🔗 Push channel greeting: {}", data);
            None
        }
        other => {
            tracing::debug!("Ignoring push event: {}", other);
            None
        }
    }
}

/// テキストフレームを1つ解釈する。既定の名前空間のイベント以外は `None`
pub fn parse_frame(text: &str) -> Option<PushEvent> {
    match socket_io::decode(text) {
        Ok(EnginePacket::Message(SocketPacket::Event {
            namespace,
            name,
            data,
        })) if namespace == DEFAULT_NAMESPACE => parse_event(&name, data),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!("⚠️ Ignoring push frame: {} ({} bytes)", e, text.len());
            None
        }
    }
}

/// 再接続の間隔
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// ハンドシェイク（Engine.IO の open まで）の待ち時間
    pub handshake_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(20),
        }
    }
}

impl ReconnectPolicy {
    /// `attempt` 回目の失敗後に待つ時間（倍々で上限まで）
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_delay)
    }
}

/// 接続先。`Request` は Clone できないので試行ごとに作り直す
struct Endpoint {
    url: String,
    cookie: Option<HeaderValue>,
}

impl Endpoint {
    fn new(url: &str, cookie: Option<String>) -> Result<Self, PushError> {
        let cookie = cookie
            .map(|cookie| {
                HeaderValue::from_str(&cookie).map_err(|e| PushError::InvalidHeader(e.to_string()))
            })
            .transpose()?;
        let endpoint = Self {
            url: url.to_string(),
            cookie,
        };
        endpoint.request()?;
        Ok(endpoint)
    }

    fn request(&self) -> Result<Request, PushError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(cookie) = &self.cookie {
            request.headers_mut().insert(header::COOKIE, cookie.clone());
        }
        Ok(request)
    }
}

enum SessionEnd {
    /// 接続が切れた。繋ぎ直す
    Lost,
    /// 利用側が閉じた
    Shutdown,
}

/// tokio-tungstenite によるプッシュチャンネル
pub struct WebSocketPushClient {
    command_tx: mpsc::UnboundedSender<PushCommand>,
    task: JoinHandle<()>,
}

impl WebSocketPushClient {
    /// 接続タスクを起動して、受信イベントのレシーバーと共に返す
    ///
    /// 接続自体はバックグラウンドで行う。失敗しても `policy` に従って繋ぎ直すので、
    /// ここでエラーになるのはURLやヘッダーが不正な場合だけ。
    pub fn start(
        url: &str,
        cookie: Option<String>,
        policy: ReconnectPolicy,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PushEvent>), PushError> {
        let endpoint = Endpoint::new(url, cookie)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(supervise(endpoint, policy, command_rx, event_tx));
        Ok((Self { command_tx, task }, event_rx))
    }

    /// 接続を閉じる
    pub fn close(self) {
        drop(self.command_tx);
        tracing::debug!("Push channel close requested");
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl LogPushChannel for WebSocketPushClient {
    fn subscribe_logs(&self, channel: &str) -> Result<(), PushError> {
        tracing::debug!("📤 subscribe_logs: {}", channel);
        self.command_tx
            .send(PushCommand::SubscribeLogs {
                channel: channel.to_string(),
            })
            .map_err(|_| PushError::Closed)
    }
}

async fn supervise(
    endpoint: Endpoint,
    policy: ReconnectPolicy,
    mut commands: mpsc::UnboundedReceiver<PushCommand>,
    events: mpsc::UnboundedSender<PushEvent>,
) {
    let mut attempt = 0u32;

    loop {
        let mut connected = false;
        let outcome = run_session(&endpoint, &policy, &mut commands, &events, &mut connected).await;

        if connected {
            tracing::info!("🛑 Push channel disconnected");
            if events.send(PushEvent::Disconnected).is_err() {
                return;
            }
            attempt = 0;
        }
        match outcome {
            Ok(SessionEnd::Shutdown) => return,
            Ok(SessionEnd::Lost) => {}
            Err(e) => tracing::warn!("⚠️ Push channel error: {}", e),
        }

        let delay = policy.delay(attempt);
        attempt = attempt.saturating_add(1);
        tracing::info!("🔄 Reconnecting push channel in {:?}", delay);

        // 待機中の購読は送らない。繋がり直したらコンソールが購読し直す
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = commands.recv() => match command {
                    Some(command) => tracing::debug!("Dropping {:?} while reconnecting", command),
                    None => return,
                },
            }
        }
    }
}

async fn run_session(
    endpoint: &Endpoint,
    policy: &ReconnectPolicy,
    commands: &mut mpsc::UnboundedReceiver<PushCommand>,
    events: &mpsc::UnboundedSender<PushEvent>,
    connected: &mut bool,
) -> Result<SessionEnd, PushError> {
    tracing::info!("🌐 Connecting push channel: {}", endpoint.url);
    let (stream, _response) = tokio::time::timeout(
        policy.handshake_timeout,
        tokio_tungstenite::connect_async(endpoint.request()?),
    )
    .await
    .map_err(|_| PushError::HandshakeTimeout)??;
    let (mut write, mut read) = stream.split();

    // open が来るまではハンドシェイクの待ち時間、以降は ping 間隔 + 猶予
    let mut heartbeat = policy.handshake_timeout;
    let deadline = tokio::time::sleep(heartbeat);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::warn!("⏱️ Push channel heartbeat timed out");
                return Ok(SessionEnd::Lost);
            }
            outgoing = commands.recv() => {
                let Some(command) = outgoing else {
                    let _ = write.send(Message::Text(socket_io::encode_disconnect())).await;
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                };
                if !*connected {
                    tracing::debug!("Dropping {:?} before namespace connect", command);
                    continue;
                }
                write.send(Message::Text(command.encode()?)).await?;
            }
            incoming = read.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Lost),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                };
                let packet = match socket_io::decode(&text) {
                    Ok(packet) => packet,
                    Err(e) => {
                        tracing::debug!("⚠️ Ignoring push frame: {} ({} bytes)", e, text.len());
                        continue;
                    }
                };

                match packet {
                    EnginePacket::Open(info) => {
                        tracing::debug!("Engine.IO open: sid={}", info.sid);
                        heartbeat = info.heartbeat_deadline();
                        deadline.as_mut().reset(Instant::now() + heartbeat);
                        write.send(Message::Text(socket_io::encode_connect())).await?;
                    }
                    EnginePacket::Ping => {
                        deadline.as_mut().reset(Instant::now() + heartbeat);
                        write.send(Message::Text(socket_io::encode_pong())).await?;
                    }
                    EnginePacket::Close => return Ok(SessionEnd::Lost),
                    EnginePacket::Message(SocketPacket::Connect { namespace, .. })
                        if namespace == DEFAULT_NAMESPACE =>
                    {
                        *connected = true;
                        tracing::info!("🔗 Push channel connected");
                        if events.send(PushEvent::Connected).is_err() {
                            return Ok(SessionEnd::Shutdown);
                        }
                    }
                    EnginePacket::Message(SocketPacket::Disconnect { namespace })
                        if namespace == DEFAULT_NAMESPACE =>
                    {
                        return Ok(SessionEnd::Lost);
                    }
                    EnginePacket::Message(SocketPacket::ConnectError { data, .. }) => {
                        return Err(PushError::Rejected(data.to_string()));
                    }
                    EnginePacket::Message(SocketPacket::Event { namespace, name, data })
                        if namespace == DEFAULT_NAMESPACE =>
                    {
                        if let Some(event) = parse_event(&name, data) {
                            if events.send(event).is_err() {
                                return Ok(SessionEnd::Shutdown);
                            }
                        }
                    }
                    other => tracing::trace!("Ignoring packet: {:?}", other),
                }
            }
        }
    }
}
