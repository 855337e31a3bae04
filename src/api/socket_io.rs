//! Engine.IO v4 / Socket.IO v5 のテキストフレーム
//!
//! ダッシュボードは flask-socketio で、WebSocketトランスポート上に次の形式を流す:
//!
//! - `0{"sid":..,"pingInterval":..,"pingTimeout":..}` ハンドシェイク（サーバー → クライアント）
//! - `2` / `3` ping / pong（サーバーが ping、クライアントが pong）
//! - `40` 名前空間への接続、`40{"sid":..}` がその応答
//! - `42["event",data]` イベント
//! - `41` 切断、`44{"message":..}` 接続拒否
//!
//! 既定の名前空間 `/` だけを扱う。バイナリ添付は使わない。

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// 既定の名前空間
pub const DEFAULT_NAMESPACE: &str = "/";

/// ハンドシェイクで受け取る接続パラメータ
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl OpenInfo {
    /// この時間 ping が来なければ接続は死んでいる
    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

/// Socket.IO パケット（Engine.IO の message に載る）
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// 名前空間への接続（応答にはsidが付く）
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        name: String,
        data: Value,
    },
    ConnectError {
        namespace: String,
        data: Value,
    },
    /// ack やバイナリなど、このクライアントが使わない種類
    Unsupported(char),
}

/// Engine.IO パケット
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// フレームの解釈エラー
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Empty frame")]
    Empty,
    #[error("Unknown packet type: {0}")]
    UnknownType(char),
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

/// テキストフレームを1つ解釈する
pub fn decode(text: &str) -> Result<EnginePacket, FrameError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(FrameError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => serde_json::from_str(rest)
            .map(EnginePacket::Open)
            .map_err(|e| FrameError::Malformed(e.to_string())),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => decode_socket(rest).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(FrameError::UnknownType(other)),
    }
}

fn decode_socket(text: &str) -> Result<SocketPacket, FrameError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(FrameError::Empty)?;
    let mut rest = chars.as_str();

    // `/admin,` のような名前空間指定
    let mut namespace = DEFAULT_NAMESPACE.to_string();
    if rest.starts_with('/') {
        let (ns, tail) = rest.split_once(',').unwrap_or((rest, ""));
        namespace = ns.to_string();
        rest = tail;
    }

    // ack ID は読み飛ばす
    let payload = rest.trim_start_matches(|c: char| c.is_ascii_digit());
    let json = || -> Result<Option<Value>, FrameError> {
        if payload.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(payload)
            .map(Some)
            .map_err(|e| FrameError::Malformed(e.to_string()))
    };

    match kind {
        '0' => Ok(SocketPacket::Connect {
            namespace,
            data: json()?,
        }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let Some(Value::Array(mut items)) = json()? else {
                return Err(FrameError::Malformed("event is not an array".to_string()));
            };
            if items.is_empty() {
                return Err(FrameError::Malformed("event without name".to_string()));
            }
            let name = match items.remove(0) {
                Value::String(name) => name,
                other => return Err(FrameError::Malformed(format!("event name {}", other))),
            };
            let data = if items.is_empty() {
                Value::Null
            } else {
                items.remove(0)
            };
            Ok(SocketPacket::Event {
                namespace,
                name,
                data,
            })
        }
        '4' => Ok(SocketPacket::ConnectError {
            namespace,
            data: json()?.unwrap_or(Value::Null),
        }),
        '3' | '5' | '6' => Ok(SocketPacket::Unsupported(kind)),
        other => Err(FrameError::UnknownType(other)),
    }
}

/// 既定の名前空間への接続要求
pub fn encode_connect() -> String {
    "40".to_string()
}

/// 既定の名前空間からの切断
pub fn encode_disconnect() -> String {
    "41".to_string()
}

/// ping への応答
pub fn encode_pong() -> String {
    "3".to_string()
}

/// イベント送信 `42["name",data]`
pub fn encode_event(name: &str, data: &Value) -> Result<String, serde_json::Error> {
    let payload = serde_json::to_string(&serde_json::json!([name, data]))?;
    Ok(format!("42{}", payload))
}
