//! コンソールエンジン
//!
//! 全状態をこの構造体が所有し、非同期処理の継続はすべて `ConsoleEvent` として
//! 1本のキューに戻ってくる。`dispatch` がそれを1件ずつ適用するので、
//! 状態の更新は常に単一タスク上で直列に行われる。
//!
//! チャンネル単位の応答はすべて要求時のチャンネル名を持っており、
//! 適用前に現在の選択と照合して、古いものは捨てる。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::client::ConsoleApi;
use crate::api::models::{Channel, ChannelCommand, PublicIpResponse, ServerInfo};
use crate::api::push::{LogPushChannel, PushEvent};
use crate::console::commands::{CommandDispatcher, CommandOutcome, PendingConfirmation};
use crate::console::config_editor::{render_history, ConfigEditor, ConfigKey, SaveOutcome};
use crate::console::config_manager::ConsoleConfig;
use crate::console::events::ConsoleEvent;
use crate::console::log_stream::LogStreamSubscriber;
use crate::console::preview::PreviewManager;
use crate::console::session::Session;
use crate::console::status_poller::{StatusPoller, StatusView};
use crate::console::timer_service::{TimerConfig, TimerKind, TimerResult, TimerService};
use crate::console::view::{
    ChannelCard, ConsoleView, DetailTab, MessageTone, ServerBanner, StatusMessage,
};

const MESSAGE_TIMER_ID: &str = "status-message";
/// `process_pending` が空振りを何回続けたら処理を打ち切るか
const IDLE_ROUNDS: usize = 16;

/// エンジンの動作設定
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleSettings {
    pub poll_interval: Duration,
    pub log_lines: usize,
    pub log_buffer_lines: usize,
    pub message_ttl: Duration,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            log_lines: 100,
            log_buffer_lines: 1000,
            message_ttl: Duration::from_secs(6),
        }
    }
}

impl From<&ConsoleConfig> for ConsoleSettings {
    fn from(config: &ConsoleConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            log_lines: config.log_lines,
            log_buffer_lines: config.log_buffer_lines,
            message_ttl: config.message_ttl(),
        }
    }
}

/// コンソール本体
pub struct Console {
    api: Arc<dyn ConsoleApi>,
    settings: ConsoleSettings,
    session: Session,
    poller: StatusPoller,
    logs: LogStreamSubscriber,
    config_editor: ConfigEditor,
    commands: CommandDispatcher,
    preview: PreviewManager,
    timers: TimerService,
    view: ConsoleView,
    events_tx: mpsc::UnboundedSender<ConsoleEvent>,
    events_rx: mpsc::UnboundedReceiver<ConsoleEvent>,
    next_message_id: u64,
}

impl Console {
    pub fn new(
        api: Arc<dyn ConsoleApi>,
        push: Arc<dyn LogPushChannel>,
        preview: PreviewManager,
        settings: ConsoleSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let timers = TimerService::new();

        let poller = StatusPoller::new(
            Arc::clone(&api),
            events_tx.clone(),
            timers.clone(),
            settings.poll_interval,
        );
        let logs = LogStreamSubscriber::new(
            Arc::clone(&api),
            push,
            events_tx.clone(),
            settings.log_lines,
        );
        let config_editor = ConfigEditor::new(Arc::clone(&api), events_tx.clone());
        let commands = CommandDispatcher::new(Arc::clone(&api), events_tx.clone(), timers.clone());
        let view = ConsoleView::new(settings.log_buffer_lines, preview.indicator());

        Self {
            api,
            settings,
            session: Session::new(),
            poller,
            logs,
            config_editor,
            commands,
            preview,
            timers,
            view,
            events_tx,
            events_rx,
            next_message_id: 0,
        }
    }

    pub fn view(&self) -> &ConsoleView {
        &self.view
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn preview(&self) -> &PreviewManager {
        &self.preview
    }

    pub fn timers(&self) -> &TimerService {
        &self.timers
    }

    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }

    /// 外部からイベントを投入するための送信側
    pub fn event_sender(&self) -> mpsc::UnboundedSender<ConsoleEvent> {
        self.events_tx.clone()
    }

    /// プッシュチャンネルの受信をイベントキューへ流し込む
    pub fn forward_push(&self, mut push_events: mpsc::UnboundedReceiver<PushEvent>) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = push_events.recv().await {
                if events.send(ConsoleEvent::Push(event)).is_err() {
                    break;
                }
            }
        });
    }

    // ---- 操作 ----

    /// チャンネル一覧を再取得
    pub fn refresh_channels(&self) {
        let api = Arc::clone(&self.api);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = api.channels().await;
            let _ = events.send(ConsoleEvent::ChannelsLoaded(result));
        });
    }

    /// サーバーアドレスのバナーを取得
    pub fn load_server_info(&self) {
        let api = Arc::clone(&self.api);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = api.server_info().await;
            let _ = events.send(ConsoleEvent::ServerInfoLoaded(result));
        });
    }

    /// チャンネルを選択する。選択中のチャンネルなら何もしない
    pub fn select_channel(&mut self, name: &str) {
        if self.session.is_selected(name) {
            tracing::debug!("Channel {} already selected", name);
            return;
        }

        self.view.mark_active(Some(name));
        self.view.panel.visible = true;
        self.view.panel.title = format!("Channel: {}", name);
        self.view.panel.subtitle = match self.view.cards.iter().find(|c| c.name == name) {
            Some(card) if card.live => "Online".to_string(),
            Some(_) => "Offline".to_string(),
            None => "Loading status".to_string(),
        };
        self.view.panel.tab = DetailTab::Status;

        // 旧世代の資源を解放してから新しく取得する
        let Some(transition) = self.session.select(name) else {
            return;
        };
        self.preview.reset();
        self.view.preview = self.preview.indicator();
        self.view.clear_selection_data();

        self.poller.fetch(name);
        let handle = self.poller.start(name, transition.generation);
        self.session.acquire_poll_timer(handle);

        self.logs.subscribe(name);
        self.config_editor.load(name);
        self.config_editor.load_history(name);

        self.view.touch();
    }

    /// 詳細を閉じる。未選択でも安全に呼べる
    pub fn close_details(&mut self) {
        self.session.clear();
        self.preview.reset();

        self.view.panel.visible = false;
        self.view.mark_active(None);
        self.view.clear_selection_data();
        self.view.preview = self.preview.indicator();
        self.view.touch();
    }

    pub fn show_tab(&mut self, tab: DetailTab) {
        let Some(channel) = self.session.selected().map(str::to_string) else {
            return;
        };
        self.view.panel.tab = tab;
        if tab == DetailTab::Logs {
            self.logs.fetch_recent(&channel);
        }
        self.view.touch();
    }

    /// ログ表示を空にする（購読は維持）
    pub fn clear_logs(&mut self) {
        self.view.logs.clear();
        self.view.touch();
    }

    pub fn edit_config(&mut self, key: ConfigKey, value: &str) {
        self.view.config.set(key, value);
        self.view.touch();
    }

    /// フォームの全項目を保存する
    pub fn save_config(&mut self) {
        let Some(channel) = self.session.selected() else {
            return;
        };
        self.config_editor.save(channel, self.view.config.updates());
    }

    pub fn load_history(&self) {
        if let Some(channel) = self.session.selected() {
            self.config_editor.load_history(channel);
        }
    }

    /// コマンドを要求する。stop / restart は確認待ちになる
    pub fn request_command(&mut self, command: ChannelCommand) {
        let Some(channel) = self.session.selected().map(str::to_string) else {
            return;
        };
        if !self.control_enabled(command) {
            tracing::debug!("🚫 {} is disabled for {}", command, channel);
            return;
        }

        if command.requires_confirmation() {
            let pending = PendingConfirmation::new(&channel, command);
            tracing::debug!("❓ {}", pending.prompt);
            self.view.confirmation = Some(pending);
            self.view.touch();
        } else {
            self.commands.send(&channel, command);
        }
    }

    /// 確認待ちのコマンドを確定または取り消す
    pub fn confirm(&mut self, accepted: bool) {
        let Some(pending) = self.view.confirmation.take() else {
            return;
        };
        if !accepted {
            tracing::debug!("{} on {} cancelled", pending.command, pending.channel);
        } else if !self.control_enabled(pending.command) {
            // 確認待ちの間にステータスが変わった
            tracing::debug!(
                "🚫 {} is no longer enabled for {}",
                pending.command,
                pending.channel
            );
        } else {
            self.commands.send(&pending.channel, pending.command);
        }
        self.view.touch();
    }

    /// 現在のステータス表示でボタンが有効か。未取得なら制限しない
    fn control_enabled(&self, command: ChannelCommand) -> bool {
        self.view
            .status
            .as_ref()
            .map_or(true, |status| status.controls.allows(command))
    }

    /// 終了処理
    pub fn shutdown(&mut self) {
        self.session.clear();
        self.preview.reset();
        let cancelled = self.timers.cancel_all_tasks();
        tracing::info!("👋 Console shut down ({} timers cancelled)", cancelled);
    }

    // ---- イベントループ ----

    pub async fn next_event(&mut self) -> Option<ConsoleEvent> {
        self.events_rx.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<ConsoleEvent> {
        self.events_rx.try_recv().ok()
    }

    /// 準備済みのイベントを、しばらく何も来なくなるまで処理する
    ///
    /// テストや組み込み用途向けの補助。CLIのように `next_event` で待ち受ける
    /// ループを持たない呼び出し側が、タスクに譲りながらキューを空にするために使う。
    /// `tokio::time::pause` 下では時間を進めないので、発火済みのタイマーだけが処理される。
    /// 戻り値は適用したイベント数。
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        let mut idle = 0;
        while idle < IDLE_ROUNDS {
            match self.try_next_event() {
                Some(event) => {
                    self.dispatch(event);
                    handled += 1;
                    idle = 0;
                }
                None => {
                    idle += 1;
                    tokio::task::yield_now().await;
                }
            }
        }
        handled
    }

    /// イベントを1件適用する。表示が変わったら true
    pub fn dispatch(&mut self, event: ConsoleEvent) -> bool {
        tracing::trace!("dispatch {}", event.name());
        let changed = match event {
            ConsoleEvent::ChannelsLoaded(result) => match result {
                Ok(channels) => {
                    self.apply_channels(channels);
                    true
                }
                Err(e) => {
                    tracing::warn!("⚠️ Failed to load channels: {}", e);
                    false
                }
            },
            ConsoleEvent::StatusLoaded { channel, result } => {
                if !self.is_current(&channel, "status") {
                    return false;
                }
                match result {
                    Ok(status) => {
                        let live = status.is_live();
                        self.view.status = Some(StatusView::from_status(&status));
                        if let Some(card) = self.view.cards.iter_mut().find(|c| c.name == channel) {
                            card.live = live;
                        }
                        self.preview.on_status(&status);
                        self.view.preview = self.preview.indicator();
                        true
                    }
                    // 前回の表示を残す
                    Err(_) => false,
                }
            }
            ConsoleEvent::PollTick {
                channel,
                generation,
            } => {
                if generation == self.session.generation() && self.session.is_selected(&channel) {
                    self.poller.fetch(&channel);
                }
                false
            }
            ConsoleEvent::LogsLoaded { channel, result } => {
                if !self.is_current(&channel, "logs") {
                    return false;
                }
                match result {
                    Ok(lines) => {
                        self.view.logs.replace(lines);
                        true
                    }
                    Err(_) => false,
                }
            }
            ConsoleEvent::Push(event) => self.apply_push(event),
            ConsoleEvent::ConfigLoaded { channel, result } => {
                if !self.is_current(&channel, "config") {
                    return false;
                }
                match result {
                    Ok(response) => {
                        self.view.config.populate(&response);
                        true
                    }
                    Err(_) => false,
                }
            }
            ConsoleEvent::ConfigSaved { channel, result } => {
                let outcome = SaveOutcome::from_result(result);
                let tone = if outcome.is_saved() {
                    MessageTone::Info
                } else {
                    MessageTone::Error
                };
                self.show_message(outcome.message(), tone);

                if let SaveOutcome::Saved { last_saved } = outcome {
                    tracing::info!("💾 Config saved for {}", channel);
                    if self.session.is_selected(&channel) {
                        self.view.config.set_last_saved(last_saved);
                        self.config_editor.load_history(&channel);
                    }
                }
                true
            }
            ConsoleEvent::HistoryLoaded { channel, result } => {
                if !self.is_current(&channel, "history") {
                    return false;
                }
                match result {
                    Ok(entries) => {
                        self.view.history = render_history(&entries);
                        true
                    }
                    Err(_) => false,
                }
            }
            ConsoleEvent::CommandCompleted {
                channel,
                command,
                result,
            } => {
                let outcome = CommandOutcome::from_result(command, &result);
                let tone = if outcome.success {
                    tracing::info!("✅ {} accepted for {}", command, channel);
                    MessageTone::Info
                } else {
                    tracing::warn!("⚠️ {} failed for {}: {}", command, channel, outcome.message);
                    MessageTone::Error
                };
                self.show_message(&outcome.message, tone);
                self.commands.schedule_refresh(&channel, command);
                true
            }
            ConsoleEvent::CommandRefreshDue { channel } => {
                if self.session.is_selected(&channel) {
                    self.poller.fetch(&channel);
                }
                false
            }
            ConsoleEvent::MessageExpired { message_id } => {
                if self.view.message.as_ref().is_some_and(|m| m.id == message_id) {
                    self.view.message = None;
                    true
                } else {
                    false
                }
            }
            ConsoleEvent::ServerInfoLoaded(result) => match result {
                Ok(info) => self.apply_server_info(info),
                Err(e) => {
                    tracing::warn!("⚠️ Failed to load server info: {}", e);
                    false
                }
            },
            ConsoleEvent::PublicIpLoaded(result) => match result {
                Ok(response) => self.apply_public_ip(response),
                Err(e) => {
                    tracing::warn!("⚠️ Failed to resolve public IP: {}", e);
                    false
                }
            },
        };

        if changed {
            self.view.touch();
        }
        changed
    }

    fn is_current(&self, channel: &str, what: &str) -> bool {
        let current = self.session.is_selected(channel);
        if !current {
            tracing::debug!("🗑️ Discarding stale {} for {}", what, channel);
        }
        current
    }

    fn apply_channels(&mut self, channels: Vec<Channel>) {
        tracing::info!("📋 {} channels loaded", channels.len());
        let selected = self.session.selected();
        self.view.cards = channels
            .into_iter()
            .map(|channel| ChannelCard {
                active: selected == Some(channel.name.as_str()),
                live: channel.status.is_live(),
                name: channel.name,
            })
            .collect();
    }

    fn apply_push(&mut self, event: PushEvent) -> bool {
        match event {
            PushEvent::Connected => {
                self.view.push_connected = true;
                // 再接続後はサーバー側の購読が消えている
                if let Some(channel) = self.session.selected() {
                    self.logs.resubscribe(channel);
                }
                true
            }
            PushEvent::Disconnected => {
                tracing::warn!("⚠️ Log push channel disconnected");
                self.view.push_connected = false;
                true
            }
            PushEvent::Logs(batch) => {
                if !self.session.is_selected(&batch.channel) {
                    return false;
                }
                self.view.logs.append(batch.lines);
                true
            }
        }
    }

    fn apply_server_info(&mut self, info: ServerInfo) -> bool {
        match info.public_ip.filter(|ip| !ip.is_empty() && ip != "N/A") {
            Some(address) => {
                self.view.server = Some(ServerBanner {
                    address,
                    url: info.public_url,
                });
                true
            }
            None => {
                tracing::debug!("Server info has no public IP, asking /api/public-ip");
                let api = Arc::clone(&self.api);
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = api.public_ip().await;
                    let _ = events.send(ConsoleEvent::PublicIpLoaded(result));
                });
                false
            }
        }
    }

    fn apply_public_ip(&mut self, response: PublicIpResponse) -> bool {
        match (response.success, response.ip) {
            (true, Some(address)) if !address.is_empty() => {
                self.view.server = Some(ServerBanner {
                    address,
                    url: response.dashboard_url,
                });
                true
            }
            _ => {
                tracing::debug!("Public IP unavailable: {:?}", response.error);
                false
            }
        }
    }

    /// 一時メッセージを表示し、期限切れタイマーを張り直す
    fn show_message(&mut self, text: &str, tone: MessageTone) {
        self.next_message_id += 1;
        let message_id = self.next_message_id;
        self.view.message = Some(StatusMessage {
            id: message_id,
            text: text.to_string(),
            tone,
        });

        let events = self.events_tx.clone();
        self.timers.start_task(
            MESSAGE_TIMER_ID,
            TimerKind::MessageExpiry,
            TimerConfig::once(self.settings.message_ttl),
            move |_context| {
                let _ = events.send(ConsoleEvent::MessageExpired { message_id });
                TimerResult::Complete
            },
        );
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.timers.cancel_all_tasks();
    }
}
