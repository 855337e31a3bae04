//! 画面のスナップショット
//!
//! エンジンが書き換え、`render` が文字列に描画する。

use crate::console::commands::PendingConfirmation;
use crate::console::config_editor::{ConfigForm, HistoryItem};
use crate::console::log_stream::LogView;
use crate::console::preview::PreviewIndicator;
use crate::console::status_poller::StatusView;

/// チャンネル一覧のカード
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCard {
    pub name: String,
    pub live: bool,
    pub active: bool,
}

/// 詳細パネルのタブ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::Display)]
pub enum DetailTab {
    #[default]
    #[display("status")]
    Status,
    #[display("config")]
    Config,
    #[display("logs")]
    Logs,
}

impl std::str::FromStr for DetailTab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "status" => Ok(DetailTab::Status),
            "config" => Ok(DetailTab::Config),
            "logs" => Ok(DetailTab::Logs),
            other => Err(format!("unknown tab: {}", other)),
        }
    }
}

/// 詳細パネル
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetailPanel {
    pub visible: bool,
    pub title: String,
    pub subtitle: String,
    pub tab: DetailTab,
}

/// メッセージの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTone {
    Info,
    Error,
}

/// 一時メッセージ（一定時間で消える）
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub id: u64,
    pub text: String,
    pub tone: MessageTone,
}

/// サーバーアドレスのバナー
#[derive(Debug, Clone, PartialEq)]
pub struct ServerBanner {
    pub address: String,
    pub url: Option<String>,
}

/// コンソール画面全体
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleView {
    pub cards: Vec<ChannelCard>,
    pub panel: DetailPanel,
    pub status: Option<StatusView>,
    pub logs: LogView,
    pub config: ConfigForm,
    pub history: Vec<HistoryItem>,
    pub message: Option<StatusMessage>,
    pub preview: PreviewIndicator,
    pub confirmation: Option<PendingConfirmation>,
    pub server: Option<ServerBanner>,
    pub push_connected: bool,
    /// 変更のたびに増える（再描画判定用）
    pub revision: u64,
}

impl ConsoleView {
    pub fn new(log_capacity: usize, preview: PreviewIndicator) -> Self {
        Self {
            cards: Vec::new(),
            panel: DetailPanel::default(),
            status: None,
            logs: LogView::new(log_capacity),
            config: ConfigForm::new(),
            history: Vec::new(),
            message: None,
            preview,
            confirmation: None,
            server: None,
            push_connected: false,
            revision: 0,
        }
    }

    /// カードの選択状態を付け替える
    pub fn mark_active(&mut self, selected: Option<&str>) {
        for card in &mut self.cards {
            card.active = Some(card.name.as_str()) == selected;
        }
    }

    /// 選択ごとの表示内容を初期状態に戻す
    pub fn clear_selection_data(&mut self) {
        self.status = None;
        self.logs.clear();
        self.config = ConfigForm::new();
        self.history.clear();
        self.confirmation = None;
    }

    pub fn touch(&mut self) {
        self.revision += 1;
    }
}
