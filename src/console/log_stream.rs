//! ログストリームの購読と表示バッファ
//!
//! 選択時にプッシュチャンネルへ購読要求を送り、並行して直近N行を一括取得する。
//! プッシュ側の購読は解除しないので、他チャンネルのイベントは受信側で捨てる。

use regex::Regex;
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;

use crate::api::client::ConsoleApi;
use crate::api::push::LogPushChannel;
use crate::console::events::ConsoleEvent;

/// ログ行の重要度（表示用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum LogSeverity {
    #[display("error")]
    Error,
    #[display("warning")]
    Warning,
    #[display("info")]
    Info,
    #[display("plain")]
    Plain,
}

fn severity_patterns() -> &'static [(LogSeverity, Option<Regex>)] {
    static PATTERNS: OnceLock<Vec<(LogSeverity, Option<Regex>)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (LogSeverity::Error, r"(?i)\[erro|error"),
            (LogSeverity::Warning, r"(?i)\[warn|warning"),
            (LogSeverity::Info, r"(?i)\[info|info"),
        ]
        .into_iter()
        .map(|(severity, pattern)| (severity, Regex::new(pattern).ok()))
        .collect()
    })
}

/// 行に含まれるマーカーから重要度を判定する（error > warning > info）
pub fn classify_line(line: &str) -> LogSeverity {
    severity_patterns()
        .iter()
        .find(|(_, pattern)| pattern.as_ref().is_some_and(|re| re.is_match(line)))
        .map(|(severity, _)| *severity)
        .unwrap_or(LogSeverity::Plain)
}

/// 表示用のログ行
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub text: String,
    pub severity: LogSeverity,
}

impl LogLine {
    pub fn new(raw: &str) -> Self {
        Self {
            text: raw.trim().to_string(),
            severity: classify_line(raw),
        }
    }
}

/// ログ表示バッファ（古い行から捨てる）
#[derive(Debug, Clone, PartialEq)]
pub struct LogView {
    lines: VecDeque<LogLine>,
    capacity: usize,
    dropped: usize,
    /// 表示位置。描画のたびに最新行へ移動する
    scroll_anchor: usize,
}

impl LogView {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            dropped: 0,
            scroll_anchor: 0,
        }
    }

    /// 内容を置き換える（初回取得時）
    pub fn replace<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.lines.clear();
        self.dropped = 0;
        self.append(lines);
    }

    /// 到着順に追記する
    pub fn append<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            if self.lines.len() >= self.capacity {
                self.lines.pop_front();
                self.dropped += 1;
            }
            self.lines.push_back(LogLine::new(line.as_ref()));
        }
        self.scroll_to_end();
    }

    /// 表示を空にする（購読には影響しない）
    pub fn clear(&mut self) {
        self.lines.clear();
        self.dropped = 0;
        self.scroll_anchor = 0;
    }

    fn scroll_to_end(&mut self) {
        self.scroll_anchor = self.lines.len().saturating_sub(1);
    }

    pub fn lines(&self) -> &VecDeque<LogLine> {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn scroll_anchor(&self) -> usize {
        self.scroll_anchor
    }

    pub fn last(&self) -> Option<&LogLine> {
        self.lines.back()
    }
}

/// 選択チャンネルのログ購読
pub struct LogStreamSubscriber {
    api: Arc<dyn ConsoleApi>,
    push: Arc<dyn LogPushChannel>,
    events: mpsc::UnboundedSender<ConsoleEvent>,
    batch_lines: usize,
}

impl LogStreamSubscriber {
    pub fn new(
        api: Arc<dyn ConsoleApi>,
        push: Arc<dyn LogPushChannel>,
        events: mpsc::UnboundedSender<ConsoleEvent>,
        batch_lines: usize,
    ) -> Self {
        Self {
            api,
            push,
            events,
            batch_lines,
        }
    }

    /// プッシュ購読を送り、直近ログの取得を開始する
    pub fn subscribe(&self, channel: &str) {
        if let Err(e) = self.push.subscribe_logs(channel) {
            tracing::warn!("⚠️ Log subscription failed for {}: {}", channel, e);
        }
        self.fetch_recent(channel);
    }

    /// プッシュ購読だけを送り直す
    pub fn resubscribe(&self, channel: &str) {
        tracing::debug!("🔁 Resubscribing logs for {}", channel);
        if let Err(e) = self.push.subscribe_logs(channel) {
            tracing::warn!("⚠️ Log resubscription failed for {}: {}", channel, e);
        }
    }

    /// 直近ログを一括取得する
    pub fn fetch_recent(&self, channel: &str) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let channel = channel.to_string();
        let lines = self.batch_lines;

        tokio::spawn(async move {
            let result = api.logs(&channel, lines).await;
            if let Err(e) = &result {
                tracing::warn!("⚠️ Failed to load logs for {}: {}", channel, e);
            }
            let _ = events.send(ConsoleEvent::LogsLoaded { channel, result });
        });
    }
}
