//! 統合テスト用のモック
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use channel_console::api::client::{ApiError, ConsoleApi};
use channel_console::api::models::*;
use channel_console::api::push::{LogPushChannel, PushError};
use channel_console::console::preview::{
    AdaptiveEngine, AdaptiveEngineProvider, MediaElement, PlaybackError, PreviewError,
    PreviewManager, HLS_MIME,
};
use channel_console::console::{Console, ConsoleSettings};

pub fn status(running: bool, streaming: Option<bool>) -> ChannelStatus {
    ChannelStatus {
        running,
        streaming,
        ..Default::default()
    }
}

pub fn preview_status(url: Option<&str>) -> ChannelStatus {
    ChannelStatus {
        running: true,
        streaming: Some(true),
        preview_ready: url.is_some(),
        preview_url: url.map(str::to_string),
        ..Default::default()
    }
}

/// 応答を差し替えられるAPIモック
#[derive(Default)]
pub struct MockApi {
    calls: Mutex<Vec<String>>,
    statuses: Mutex<HashMap<String, ChannelStatus>>,
    status_failures: Mutex<HashMap<String, u16>>,
    status_delays: Mutex<HashMap<String, Duration>>,
    configs: Mutex<HashMap<String, ConfigResponse>>,
    save_response: Mutex<Option<SaveConfigResponse>>,
    save_fails: Mutex<bool>,
    saved: Mutex<Vec<(String, BTreeMap<String, String>)>>,
    histories: Mutex<HashMap<String, Vec<HistoryEntry>>>,
    logs: Mutex<HashMap<String, Vec<String>>>,
    command_response: Mutex<Option<CommandResponse>>,
    command_fails: Mutex<bool>,
    channels: Mutex<Vec<Channel>>,
    server_info: Mutex<Option<ServerInfo>>,
    public_ip: Mutex<Option<PublicIpResponse>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, channel: &str, status: ChannelStatus) {
        self.status_failures.lock().remove(channel);
        self.statuses.lock().insert(channel.to_string(), status);
    }

    pub fn fail_status(&self, channel: &str, code: u16) {
        self.status_failures.lock().insert(channel.to_string(), code);
    }

    pub fn delay_status(&self, channel: &str, delay: Duration) {
        self.status_delays.lock().insert(channel.to_string(), delay);
    }

    pub fn set_config(&self, channel: &str, config: ConfigResponse) {
        self.configs.lock().insert(channel.to_string(), config);
    }

    pub fn set_save_response(&self, response: SaveConfigResponse) {
        *self.save_response.lock() = Some(response);
    }

    pub fn fail_save(&self) {
        *self.save_fails.lock() = true;
    }

    pub fn saved(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.saved.lock().clone()
    }

    pub fn set_history(&self, channel: &str, history: Vec<HistoryEntry>) {
        self.histories.lock().insert(channel.to_string(), history);
    }

    pub fn set_logs(&self, channel: &str, lines: &[&str]) {
        self.logs.lock().insert(
            channel.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
    }

    pub fn set_command_response(&self, response: CommandResponse) {
        *self.command_response.lock() = Some(response);
    }

    pub fn fail_commands(&self) {
        *self.command_fails.lock() = true;
    }

    pub fn set_channels(&self, channels: Vec<Channel>) {
        *self.channels.lock() = channels;
    }

    pub fn set_server_info(&self, info: ServerInfo) {
        *self.server_info.lock() = Some(info);
    }

    pub fn set_public_ip(&self, response: PublicIpResponse) {
        *self.public_ip.lock() = Some(response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ConsoleApi for MockApi {
    async fn channels(&self) -> Result<Vec<Channel>, ApiError> {
        self.record("channels".to_string());
        Ok(self.channels.lock().clone())
    }

    async fn status(&self, channel: &str) -> Result<ChannelStatus, ApiError> {
        self.record(format!("status:{}", channel));
        let delay = self.status_delays.lock().get(channel).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(code) = self.status_failures.lock().get(channel) {
            return Err(ApiError::Status { status: *code });
        }
        Ok(self
            .statuses
            .lock()
            .get(channel)
            .cloned()
            .unwrap_or_default())
    }

    async fn config(&self, channel: &str) -> Result<ConfigResponse, ApiError> {
        self.record(format!("config:{}", channel));
        Ok(self
            .configs
            .lock()
            .get(channel)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_config(
        &self,
        channel: &str,
        updates: BTreeMap<String, String>,
    ) -> Result<SaveConfigResponse, ApiError> {
        self.record(format!("save_config:{}", channel));
        self.saved.lock().push((channel.to_string(), updates));
        if *self.save_fails.lock() {
            return Err(ApiError::Status { status: 500 });
        }
        Ok(self.save_response.lock().clone().unwrap_or(SaveConfigResponse {
            success: true,
            last_saved: Some("2024-05-01T12:00:00".to_string()),
            error: None,
        }))
    }

    async fn config_history(&self, channel: &str) -> Result<Vec<HistoryEntry>, ApiError> {
        self.record(format!("history:{}", channel));
        Ok(self
            .histories
            .lock()
            .get(channel)
            .cloned()
            .unwrap_or_default())
    }

    async fn logs(&self, channel: &str, lines: usize) -> Result<Vec<String>, ApiError> {
        self.record(format!("logs:{}:{}", channel, lines));
        Ok(self.logs.lock().get(channel).cloned().unwrap_or_default())
    }

    async fn command(
        &self,
        channel: &str,
        command: ChannelCommand,
    ) -> Result<CommandResponse, ApiError> {
        self.record(format!("{}:{}", command, channel));
        if *self.command_fails.lock() {
            return Err(ApiError::Status { status: 502 });
        }
        Ok(self.command_response.lock().clone().unwrap_or(CommandResponse {
            success: true,
            error: None,
            message: None,
        }))
    }

    async fn server_info(&self) -> Result<ServerInfo, ApiError> {
        self.record("server_info".to_string());
        self.server_info
            .lock()
            .clone()
            .ok_or(ApiError::Status { status: 404 })
    }

    async fn public_ip(&self) -> Result<PublicIpResponse, ApiError> {
        self.record("public_ip".to_string());
        self.public_ip
            .lock()
            .clone()
            .ok_or(ApiError::Status { status: 503 })
    }
}

/// 購読要求を記録するプッシュチャンネル
#[derive(Default)]
pub struct RecordingPush {
    subscriptions: Mutex<Vec<String>>,
}

impl RecordingPush {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }
}

impl LogPushChannel for RecordingPush {
    fn subscribe_logs(&self, channel: &str) -> Result<(), PushError> {
        self.subscriptions.lock().push(channel.to_string());
        Ok(())
    }
}

/// メディア要素への操作記録
#[derive(Debug, Default)]
pub struct MediaLog {
    pub native_hls: bool,
    pub reject_play: bool,
    pub source: Option<String>,
    pub paused: bool,
    pub calls: Vec<String>,
}

/// 操作を記録するメディア要素（状態はテスト側と共有）
#[derive(Clone, Default)]
pub struct RecordingMedia {
    pub log: Arc<Mutex<MediaLog>>,
}

impl RecordingMedia {
    pub fn new(native_hls: bool) -> Self {
        let media = Self::default();
        media.log.lock().native_hls = native_hls;
        media
    }

    pub fn source(&self) -> Option<String> {
        self.log.lock().source.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().calls.clone()
    }
}

impl MediaElement for RecordingMedia {
    fn can_play_type(&self, mime: &str) -> bool {
        self.log.lock().native_hls && mime == HLS_MIME
    }

    fn set_source(&mut self, url: &str) {
        let mut log = self.log.lock();
        log.source = Some(url.to_string());
        log.calls.push(format!("set_source:{}", url));
    }

    fn source(&self) -> Option<&str> {
        // 共有状態なので参照は返せない。マネージャーの判定には使われない
        None
    }

    fn clear_source(&mut self) {
        let mut log = self.log.lock();
        log.source = None;
        log.calls.push("clear_source".to_string());
    }

    fn load(&mut self) {
        self.log.lock().calls.push("load".to_string());
    }

    fn pause(&mut self) {
        let mut log = self.log.lock();
        log.paused = true;
        log.calls.push("pause".to_string());
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        let mut log = self.log.lock();
        log.calls.push("play".to_string());
        if log.reject_play {
            return Err(PlaybackError("autoplay blocked".to_string()));
        }
        log.paused = false;
        Ok(())
    }
}

/// エンジンの生成と破棄を数えるプロバイダー
#[derive(Default)]
pub struct MockEngineProvider {
    pub supported: bool,
    pub fail_load: bool,
    pub created: Arc<AtomicUsize>,
    pub live: Arc<AtomicUsize>,
    pub loaded: Arc<Mutex<Vec<String>>>,
}

impl MockEngineProvider {
    pub fn supported() -> Self {
        Self {
            supported: true,
            ..Default::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl AdaptiveEngineProvider for MockEngineProvider {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create(&self) -> Result<Box<dyn AdaptiveEngine>, PreviewError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockEngine {
            fail_load: self.fail_load,
            live: Arc::clone(&self.live),
            loaded: Arc::clone(&self.loaded),
            url: None,
            destroyed: false,
        }))
    }
}

pub struct MockEngine {
    fail_load: bool,
    live: Arc<AtomicUsize>,
    loaded: Arc<Mutex<Vec<String>>>,
    url: Option<String>,
    destroyed: bool,
}

impl AdaptiveEngine for MockEngine {
    fn load_source(&mut self, url: &str) -> Result<(), PreviewError> {
        if self.fail_load {
            return Err(PreviewError::Load {
                url: url.to_string(),
                reason: "manifest 404".to_string(),
            });
        }
        self.loaded.lock().push(url.to_string());
        self.url = Some(url.to_string());
        Ok(())
    }

    fn attach_media(&mut self, media: &mut dyn MediaElement) -> Result<(), PreviewError> {
        let url = self
            .url
            .clone()
            .ok_or_else(|| PreviewError::Attach("no source".to_string()))?;
        media.set_source(&url);
        Ok(())
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// テスト用のコンソール一式
pub struct Harness {
    pub console: Console,
    pub api: Arc<MockApi>,
    pub push: Arc<RecordingPush>,
    pub media: RecordingMedia,
}

impl Harness {
    /// ネイティブHLS対応のメディア要素、アダプティブエンジンなし
    pub fn new() -> Self {
        Self::with_preview(RecordingMedia::new(true), None)
    }

    pub fn with_preview(
        media: RecordingMedia,
        provider: Option<Arc<dyn AdaptiveEngineProvider>>,
    ) -> Self {
        let api = MockApi::new();
        let push = RecordingPush::new();
        let preview = PreviewManager::new(Box::new(media.clone()), provider);
        let console = Console::new(
            api.clone(),
            push.clone(),
            preview,
            ConsoleSettings::default(),
        );
        Self {
            console,
            api,
            push,
            media,
        }
    }

    /// 準備済みのイベントを処理する
    pub async fn settle(&mut self) {
        self.console.process_pending().await;
    }

    /// 時間を進めてからイベントを処理する
    pub async fn advance(&mut self, duration: Duration) {
        self.settle().await;
        tokio::time::advance(duration).await;
        self.settle().await;
    }
}
