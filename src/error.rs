//! クレート共通のエラー型

use crate::api::client::ApiError;
use crate::api::push::PushError;
use crate::console::config_manager::ConfigError;
use crate::console::preview::PreviewError;

/// コンソール全体のエラー
#[derive(thiserror::Error, Debug)]
pub enum ConsoleError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Push channel error: {0}")]
    Push(#[from] PushError),

    #[error("Preview error: {0}")]
    Preview(#[from] PreviewError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;
