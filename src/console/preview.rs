//! ライブプレビューの接続管理
//!
//! メディア要素は1つだけで、このマネージャーが排他的に所有する。
//! 再生方式は接続のたびに次の順で決める:
//!
//! 1. アダプティブ再生エンジンが使えるなら、エンジンを生成してURLを読み込み、メディア要素に結び付ける
//! 2. メディア要素がHLSのMIMEタイプを直接再生できるなら、ソースに直接設定する
//! 3. どちらも無理なら「非対応」を表示し、何も接続しない
//!
//! 接続の前には必ず `reset` で前回のエンジンとソースを破棄する。

use std::sync::Arc;

use crate::api::models::ChannelStatus;

/// HLSストリームのMIMEタイプ
pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";

/// プレビュー関連のエラー
#[derive(thiserror::Error, Debug)]
pub enum PreviewError {
    #[error("Adaptive engine unavailable")]
    EngineUnavailable,
    #[error("Failed to load {url}: {reason}")]
    Load { url: String, reason: String },
    #[error("Failed to attach media: {0}")]
    Attach(String),
    #[error("Failed to launch player: {0}")]
    Spawn(#[from] std::io::Error),
}

/// 再生開始の拒否（自動再生ポリシーなど）。致命的ではない
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Playback rejected: {0}")]
pub struct PlaybackError(pub String);

/// メディア要素
pub trait MediaElement: Send {
    /// 指定MIMEタイプを直接再生できるか
    fn can_play_type(&self, mime: &str) -> bool;
    fn set_source(&mut self, url: &str);
    fn source(&self) -> Option<&str>;
    fn clear_source(&mut self);
    /// ソース変更を反映し、不要になったバッファを手放す
    fn load(&mut self);
    fn pause(&mut self);
    fn play(&mut self) -> Result<(), PlaybackError>;
}

/// アダプティブストリーミング再生エンジンのインスタンス
pub trait AdaptiveEngine: Send {
    fn load_source(&mut self, url: &str) -> Result<(), PreviewError>;
    fn attach_media(&mut self, media: &mut dyn MediaElement) -> Result<(), PreviewError>;
    /// エンジンを破棄する。複数回呼ばれても安全であること
    fn destroy(&mut self);
}

/// 再生エンジンの生成元
pub trait AdaptiveEngineProvider: Send + Sync {
    fn is_supported(&self) -> bool;
    fn create(&self) -> Result<Box<dyn AdaptiveEngine>, PreviewError>;
}

/// 再生方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum PlaybackStrategy {
    #[display("adaptive")]
    Adaptive,
    #[display("native")]
    Native,
    #[display("unsupported")]
    Unsupported,
}

impl PlaybackStrategy {
    /// 環境から再生方式を決める（順序固定）
    pub fn detect(provider: Option<&dyn AdaptiveEngineProvider>, media: &dyn MediaElement) -> Self {
        if provider.is_some_and(|p| p.is_supported()) {
            PlaybackStrategy::Adaptive
        } else if media.can_play_type(HLS_MIME) {
            PlaybackStrategy::Native
        } else {
            PlaybackStrategy::Unsupported
        }
    }
}

/// プレビューの状態
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewState {
    /// 何も接続していない
    Detached,
    /// 接続処理中
    Attempting { url: String },
    /// 接続済み
    Attached {
        url: String,
        strategy: PlaybackStrategy,
    },
    /// バックエンドがプレビュー未準備と報告
    Unavailable,
    /// この環境ではストリーム形式を再生できない
    Unsupported { url: String },
    /// エンジンの生成や読み込みに失敗
    Failed { url: String, reason: String },
}

impl PreviewState {
    /// 現在の対象URL
    pub fn url(&self) -> Option<&str> {
        match self {
            PreviewState::Attempting { url }
            | PreviewState::Attached { url, .. }
            | PreviewState::Unsupported { url }
            | PreviewState::Failed { url, .. } => Some(url),
            PreviewState::Detached | PreviewState::Unavailable => None,
        }
    }
}

/// 表示用のインジケーター
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewIndicator {
    pub label: &'static str,
    pub hint: String,
}

impl PreviewIndicator {
    pub fn for_state(state: &PreviewState) -> Self {
        let (label, hint) = match state {
            PreviewState::Detached => ("No preview", "Select a channel to watch its preview".to_string()),
            PreviewState::Attempting { url } => ("Connecting", format!("Opening {}", url)),
            PreviewState::Attached { url, strategy } => {
                ("Live preview", format!("{} ({} playback)", url, strategy))
            }
            PreviewState::Unavailable => (
                "Preview unavailable",
                "The channel is not publishing a preview stream right now".to_string(),
            ),
            PreviewState::Unsupported { .. } => (
                "Format unsupported",
                "This environment cannot play HLS streams".to_string(),
            ),
            PreviewState::Failed { reason, .. } => ("Preview failed", reason.clone()),
        };
        Self { label, hint }
    }
}

/// プレビュー接続マネージャー
pub struct PreviewManager {
    media: Box<dyn MediaElement>,
    provider: Option<Arc<dyn AdaptiveEngineProvider>>,
    engine: Option<Box<dyn AdaptiveEngine>>,
    state: PreviewState,
}

impl PreviewManager {
    pub fn new(
        media: Box<dyn MediaElement>,
        provider: Option<Arc<dyn AdaptiveEngineProvider>>,
    ) -> Self {
        Self {
            media,
            provider,
            engine: None,
            state: PreviewState::Detached,
        }
    }

    /// プレビューを使わない構成（`--no-preview`）
    pub fn disabled(media: Box<dyn MediaElement>) -> Self {
        Self::new(media, None)
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn indicator(&self) -> PreviewIndicator {
        PreviewIndicator::for_state(&self.state)
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn media(&self) -> &dyn MediaElement {
        self.media.as_ref()
    }

    /// ステータス取得結果ごとに接続/切断を判断する
    pub fn on_status(&mut self, status: &ChannelStatus) {
        match status.ready_preview_url() {
            Some(url) => {
                // 同じURLで接続済み（または再生不能と判明済み）なら何もしない
                if self.state.url() == Some(url) {
                    return;
                }
                self.attach(url);
            }
            None => {
                if self.state != PreviewState::Unavailable {
                    tracing::debug!("📺 Preview not ready, tearing down");
                }
                self.reset();
                self.state = PreviewState::Unavailable;
            }
        }
    }

    /// 指定URLに接続する。既存の接続は先に破棄する
    pub fn attach(&mut self, url: &str) {
        self.reset();
        self.state = PreviewState::Attempting {
            url: url.to_string(),
        };

        let strategy = PlaybackStrategy::detect(self.provider.as_deref(), self.media.as_ref());
        tracing::info!("📺 Attaching preview {} ({})", url, strategy);

        match strategy {
            PlaybackStrategy::Adaptive => {
                if let Err(e) = self.bind_engine(url) {
                    tracing::warn!("⚠️ Preview engine failed for {}: {}", url, e);
                    self.reset();
                    self.state = PreviewState::Failed {
                        url: url.to_string(),
                        reason: e.to_string(),
                    };
                    return;
                }
            }
            PlaybackStrategy::Native => {
                self.media.set_source(url);
                self.media.load();
            }
            PlaybackStrategy::Unsupported => {
                self.state = PreviewState::Unsupported {
                    url: url.to_string(),
                };
                return;
            }
        }

        if let Err(e) = self.media.play() {
            tracing::debug!("Preview left paused: {}", e);
        }

        self.state = PreviewState::Attached {
            url: url.to_string(),
            strategy,
        };
    }

    fn bind_engine(&mut self, url: &str) -> Result<(), PreviewError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(PreviewError::EngineUnavailable)?;
        let mut engine = provider.create()?;

        let bound = engine
            .load_source(url)
            .and_then(|()| engine.attach_media(self.media.as_mut()));
        match bound {
            Ok(()) => {
                self.engine = Some(engine);
                Ok(())
            }
            Err(e) => {
                engine.destroy();
                Err(e)
            }
        }
    }

    /// エンジンを破棄し、メディア要素を停止・空にする。何度呼んでもよい
    pub fn reset(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
            tracing::debug!("📺 Preview engine destroyed");
        }
        self.media.pause();
        self.media.clear_source();
        self.media.load();
        self.state = PreviewState::Detached;
    }
}

impl Drop for PreviewManager {
    fn drop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
    }
}

impl std::fmt::Debug for PreviewManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewManager")
            .field("state", &self.state)
            .field("has_engine", &self.engine.is_some())
            .field("adaptive", &self.provider.is_some())
            .finish()
    }
}
