//! タイマーサービス
//!
//! ステータスの定期ポーリングやコマンド後の再取得など、時間ベースの処理を管理する
//! - タイマーライフサイクル管理
//! - 同じIDのタスクは必ず古い方をキャンセルしてから登録
//! - キャンセルは登録簿から即座に外れる（件数は同期的に観測できる）

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// タイマータスクのID
pub type TimerId = String;

/// タイマータスクの種類
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// 選択中チャンネルのステータス定期取得
    StatusPoll,
    /// コマンド送信後の確認用の再取得（1回のみ）
    CommandRefresh,
    /// 一時メッセージの自動消去
    MessageExpiry,
}

/// タイマータスクの設定
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// 最初の実行までの遅延
    pub delay: Duration,
    /// 繰り返し間隔（Noneで単発実行）
    pub interval: Option<Duration>,
    /// 最大実行回数（Noneで無制限）
    pub max_executions: Option<u32>,
}

impl TimerConfig {
    /// 定期実行用設定。初回も `interval` 後に実行される
    pub fn periodic(interval: Duration) -> Self {
        Self {
            delay: interval,
            interval: Some(interval),
            max_executions: None,
        }
    }

    /// 単発実行用設定
    pub fn once(delay: Duration) -> Self {
        Self {
            delay,
            interval: None,
            max_executions: Some(1),
        }
    }
}

/// タイマータスクの実行コンテキスト
#[derive(Debug, Clone)]
pub struct TimerContext {
    pub task_id: TimerId,
    pub kind: TimerKind,
    pub execution_count: u32,
    pub started_at: Instant,
}

/// ハンドラーの戻り値
#[derive(Debug)]
pub enum TimerResult {
    /// 継続実行
    Continue,
    /// 完了（タスク終了）
    Complete,
    /// エラー（タスク停止）
    Error(String),
}

#[derive(Debug)]
struct TimerTask {
    serial: u64,
    kind: TimerKind,
    cancel_sender: Option<oneshot::Sender<()>>,
}

/// タイマー統計情報
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimerStats {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub cancelled_tasks: u64,
    pub error_tasks: u64,
}

type TaskTable = Arc<Mutex<HashMap<TimerId, TimerTask>>>;

/// タイマーサービス
#[derive(Debug, Clone, Default)]
pub struct TimerService {
    active_tasks: TaskTable,
    stats: Arc<Mutex<TimerStats>>,
    next_serial: Arc<AtomicU64>,
}

impl TimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// タイマータスクを開始する。同じIDの既存タスクは先にキャンセルされる
    pub fn start_task<F>(
        &self,
        id: impl Into<TimerId>,
        kind: TimerKind,
        config: TimerConfig,
        handler: F,
    ) where
        F: Fn(TimerContext) -> TimerResult + Send + Sync + 'static,
    {
        let id = id.into();
        self.cancel_task(&id);

        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst);
        let (cancel_sender, cancel_receiver) = oneshot::channel();

        self.active_tasks.lock().insert(
            id.clone(),
            TimerTask {
                serial,
                kind: kind.clone(),
                cancel_sender: Some(cancel_sender),
            },
        );
        self.stats.lock().total_tasks += 1;

        let context = TimerContext {
            task_id: id.clone(),
            kind: kind.clone(),
            execution_count: 0,
            started_at: Instant::now(),
        };

        tokio::spawn(Self::execute_task(
            serial,
            config,
            handler,
            context,
            cancel_receiver,
            self.active_tasks.clone(),
            self.stats.clone(),
        ));

        tracing::debug!("⏱️ [TIMER] Started task: {} ({:?})", id, kind);
    }

    async fn execute_task<F>(
        serial: u64,
        config: TimerConfig,
        handler: F,
        mut context: TimerContext,
        mut cancel_receiver: oneshot::Receiver<()>,
        active_tasks: TaskTable,
        stats: Arc<Mutex<TimerStats>>,
    ) where
        F: Fn(TimerContext) -> TimerResult + Send + Sync + 'static,
    {
        tokio::select! {
            _ = tokio::time::sleep(config.delay) => {},
            _ = &mut cancel_receiver => return,
        }

        let mut execution_count = 0u32;
        loop {
            if let Some(max) = config.max_executions {
                if execution_count >= max {
                    Self::complete_task(
                        &context.task_id,
                        serial,
                        Outcome::Completed,
                        &active_tasks,
                        &stats,
                    );
                    return;
                }
            }

            // キャンセル直後のタスクはハンドラーを呼ばない
            let still_registered = active_tasks
                .lock()
                .get(&context.task_id)
                .is_some_and(|task| task.serial == serial);
            if !still_registered {
                return;
            }

            context.execution_count = execution_count;
            let result = handler(context.clone());
            execution_count += 1;

            match result {
                TimerResult::Continue => {}
                TimerResult::Complete => {
                    Self::complete_task(
                        &context.task_id,
                        serial,
                        Outcome::Completed,
                        &active_tasks,
                        &stats,
                    );
                    return;
                }
                TimerResult::Error(msg) => {
                    tracing::error!("⏱️ [TIMER] Task error: {} - {}", context.task_id, msg);
                    Self::complete_task(
                        &context.task_id,
                        serial,
                        Outcome::Error,
                        &active_tasks,
                        &stats,
                    );
                    return;
                }
            }

            match config.interval {
                Some(interval) => {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {},
                        _ = &mut cancel_receiver => return,
                    }
                }
                None => {
                    Self::complete_task(
                        &context.task_id,
                        serial,
                        Outcome::Completed,
                        &active_tasks,
                        &stats,
                    );
                    return;
                }
            }
        }
    }

    /// 自分自身の登録だけを外す（同じIDで再登録された新しいタスクは残す）
    fn complete_task(
        task_id: &str,
        serial: u64,
        outcome: Outcome,
        active_tasks: &TaskTable,
        stats: &Arc<Mutex<TimerStats>>,
    ) {
        let removed = {
            let mut tasks = active_tasks.lock();
            match tasks.get(task_id) {
                Some(task) if task.serial == serial => tasks.remove(task_id).is_some(),
                _ => false,
            }
        };

        if removed {
            let mut stats = stats.lock();
            match outcome {
                Outcome::Completed => stats.completed_tasks += 1,
                Outcome::Error => stats.error_tasks += 1,
            }
            tracing::debug!("⏱️ [TIMER] Task finished: {} ({:?})", task_id, outcome);
        }
    }

    /// タスクをキャンセル
    pub fn cancel_task(&self, task_id: &str) -> bool {
        let sender = self
            .active_tasks
            .lock()
            .remove(task_id)
            .and_then(|mut task| task.cancel_sender.take());

        match sender {
            Some(sender) => {
                let _ = sender.send(());
                self.stats.lock().cancelled_tasks += 1;
                tracing::debug!("⏱️ [TIMER] Cancelled task: {}", task_id);
                true
            }
            None => false,
        }
    }

    /// 特定種類のタスクをすべてキャンセル
    pub fn cancel_tasks_by_kind(&self, kind: &TimerKind) -> u32 {
        let task_ids: Vec<TimerId> = self
            .active_tasks
            .lock()
            .iter()
            .filter(|(_, task)| &task.kind == kind)
            .map(|(id, _)| id.clone())
            .collect();

        let cancelled = task_ids
            .iter()
            .filter(|id| self.cancel_task(id))
            .count() as u32;

        if cancelled > 0 {
            tracing::debug!("⏱️ [TIMER] Cancelled {} tasks of kind {:?}", cancelled, kind);
        }
        cancelled
    }

    /// 全タスクをキャンセル
    pub fn cancel_all_tasks(&self) -> u32 {
        let task_ids: Vec<TimerId> = self.active_tasks.lock().keys().cloned().collect();
        task_ids
            .iter()
            .filter(|id| self.cancel_task(id))
            .count() as u32
    }

    pub fn is_active(&self, task_id: &str) -> bool {
        self.active_tasks.lock().contains_key(task_id)
    }

    /// 指定種類のアクティブなタスク数
    pub fn active_count(&self, kind: &TimerKind) -> usize {
        self.active_tasks
            .lock()
            .values()
            .filter(|task| &task.kind == kind)
            .count()
    }

    pub fn stats(&self) -> TimerStats {
        self.stats.lock().clone()
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Completed,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_runs_until_cancelled() {
        let timers = TimerService::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        timers.start_task(
            "poll",
            TimerKind::StatusPoll,
            TimerConfig::periodic(Duration::from_secs(5)),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                TimerResult::Continue
            },
        );
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        assert!(timers.cancel_task("poll"));
        assert_eq!(timers.active_count(&TimerKind::StatusPoll), 0);

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_with_same_id_replaces_task() {
        let timers = TimerService::new();
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));

        let counter = first.clone();
        timers.start_task(
            "poll",
            TimerKind::StatusPoll,
            TimerConfig::periodic(Duration::from_secs(5)),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                TimerResult::Continue
            },
        );
        let counter = second.clone();
        timers.start_task(
            "poll",
            TimerKind::StatusPoll,
            TimerConfig::periodic(Duration::from_secs(5)),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                TimerResult::Continue
            },
        );
        assert_eq!(timers.active_count(&TimerKind::StatusPoll), 1);
        settle().await;

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_task_completes_and_unregisters() {
        let timers = TimerService::new();
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();

        timers.start_task(
            "refresh",
            TimerKind::CommandRefresh,
            TimerConfig::once(Duration::from_secs(2)),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                TimerResult::Complete
            },
        );
        assert!(timers.is_active("refresh"));
        settle().await;

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timers.is_active("refresh"));
        assert_eq!(timers.stats().completed_tasks, 1);
    }

    #[test]
    fn test_cancel_unknown_task_is_noop() {
        let timers = TimerService::new();
        assert!(!timers.cancel_task("missing"));
        assert_eq!(timers.cancel_all_tasks(), 0);
    }
}
