// コンソール用ユーティリティ関数

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::console::config_manager::LogConfig;

const LOG_FILE_BASENAME: &str = "channel-console.log";

/// ログ出力先ディレクトリ
pub fn log_dir(config: &LogConfig) -> Result<PathBuf> {
    if let Some(dir) = &config.log_dir {
        return Ok(dir.clone());
    }
    let project_dirs = ProjectDirs::from("dev", "lofi", "channel-console")
        .context("Failed to determine project directories for log path")?;
    let base = project_dirs
        .state_dir()
        .unwrap_or_else(|| project_dirs.data_local_dir());
    Ok(base.join("logs"))
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// ログ初期化
///
/// ファイル出力時は日次ローテーションのファイルへ書き、ガードを返す。
/// それ以外は標準エラーへ出す（標準出力の画面描画と混ざらないように）。
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    if config.enable_file_logging {
        let dir = log_dir(config)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

        let file_appender = tracing_appender::rolling::daily(&dir, LOG_FILE_BASENAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(env_filter(config))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false),
            )
            .try_init()?;

        tracing::info!("📝 Logging to {}", dir.display());
        return Ok(Some(guard));
    }

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init()?;

    Ok(None)
}
