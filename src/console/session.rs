//! 選択中チャンネルのセッション状態
//!
//! 選択は常に高々1つ。選択が変わるたびに世代番号を進め、
//! 前の世代のポーリングタイマーを解放してから新しいものを取得する。

use crate::console::status_poller::PollHandle;

/// 選択の遷移結果
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub previous: Option<String>,
    pub current: String,
    pub generation: u64,
}

/// セッション状態（プロセスに1つ）
#[derive(Debug, Default)]
pub struct Session {
    selected: Option<String>,
    generation: u64,
    poll_handle: Option<PollHandle>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_selected(&self, channel: &str) -> bool {
        self.selected.as_deref() == Some(channel)
    }

    /// 現在の世代。選択・解除のたびに増える
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// チャンネルを選択する。既に選択中なら `None`（何もしない）
    ///
    /// 旧世代のポーリングタイマーはここで解放される。
    pub fn select(&mut self, channel: &str) -> Option<Transition> {
        if self.is_selected(channel) {
            return None;
        }

        self.release_poll_timer();
        self.generation += 1;
        let previous = self.selected.replace(channel.to_string());

        tracing::info!(
            "📺 Channel selected: {} (previous: {:?}, generation {})",
            channel,
            previous,
            self.generation
        );

        Some(Transition {
            previous,
            current: channel.to_string(),
            generation: self.generation,
        })
    }

    /// 選択を解除する。未選択でも安全に呼べる
    pub fn clear(&mut self) -> Option<String> {
        self.release_poll_timer();
        self.generation += 1;
        let previous = self.selected.take();
        if let Some(channel) = &previous {
            tracing::info!("📴 Channel deselected: {}", channel);
        }
        previous
    }

    /// ポーリングタイマーを登録する。既存のものは先に解放する
    pub fn acquire_poll_timer(&mut self, handle: PollHandle) {
        self.release_poll_timer();
        self.poll_handle = Some(handle);
    }

    /// ポーリングタイマーを解放
    pub fn release_poll_timer(&mut self) {
        if let Some(handle) = self.poll_handle.take() {
            handle.cancel();
        }
    }

    pub fn poll_handle(&self) -> Option<&PollHandle> {
        self.poll_handle.as_ref()
    }
}
