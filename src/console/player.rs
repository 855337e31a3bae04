//! 外部プレイヤー（mpv / ffplay）によるプレビュー再生
//!
//! ターミナルには映像を出せないため、接続ごとに外部プレイヤーのプロセスを1つ起動し、
//! 破棄時に kill + wait で回収する。

use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::console::config_manager::PlayerConfig;
use crate::console::preview::{
    AdaptiveEngine, AdaptiveEngineProvider, MediaElement, PlaybackError, PreviewError,
};

/// 外部プレイヤーを生成するプロバイダー
#[derive(Debug, Clone)]
pub struct ExternalPlayerProvider {
    command: String,
    args: Vec<String>,
}

impl ExternalPlayerProvider {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn from_config(config: &PlayerConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

/// コマンドが実行可能な場所にあるか（PATH検索を含む）
fn command_exists(command: &str) -> bool {
    if command.is_empty() {
        return false;
    }
    let path = Path::new(command);
    if path.components().count() > 1 {
        return path.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| {
                let candidate = dir.join(command);
                candidate.is_file() || candidate.with_extension("exe").is_file()
            })
        })
        .unwrap_or(false)
}

impl AdaptiveEngineProvider for ExternalPlayerProvider {
    fn is_supported(&self) -> bool {
        command_exists(&self.command)
    }

    fn create(&self) -> Result<Box<dyn AdaptiveEngine>, PreviewError> {
        Ok(Box::new(ExternalPlayerEngine {
            command: self.command.clone(),
            args: self.args.clone(),
            url: None,
            child: None,
        }))
    }
}

/// 1回の接続に対応するプレイヤープロセス
#[derive(Debug)]
pub struct ExternalPlayerEngine {
    command: String,
    args: Vec<String>,
    url: Option<String>,
    child: Option<Child>,
}

impl AdaptiveEngine for ExternalPlayerEngine {
    fn load_source(&mut self, url: &str) -> Result<(), PreviewError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(PreviewError::Load {
                url: url.to_string(),
                reason: "not an HTTP(S) stream".to_string(),
            });
        }
        self.url = Some(url.to_string());
        Ok(())
    }

    fn attach_media(&mut self, media: &mut dyn MediaElement) -> Result<(), PreviewError> {
        let url = self
            .url
            .clone()
            .ok_or_else(|| PreviewError::Attach("no source loaded".to_string()))?;

        let child = Command::new(&self.command)
            .args(&self.args)
            .arg(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        tracing::info!("🎬 Player started: {} (pid {})", self.command, child.id());
        self.child = Some(child);
        media.set_source(&url);
        Ok(())
    }

    fn destroy(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::info!("🛑 Player stopped: {}", self.command);
        }
        self.url = None;
    }
}

impl Drop for ExternalPlayerEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// 画面を持たないメディア要素
///
/// HLSを直接再生する能力はないので、外部プレイヤーが無ければ「非対応」になる。
#[derive(Debug, Default)]
pub struct HeadlessMedia {
    source: Option<String>,
    paused: bool,
}

impl HeadlessMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl MediaElement for HeadlessMedia {
    fn can_play_type(&self, _mime: &str) -> bool {
        false
    }

    fn set_source(&mut self, url: &str) {
        self.source = Some(url.to_string());
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn clear_source(&mut self) {
        self.source = None;
    }

    fn load(&mut self) {}

    fn pause(&mut self) {
        self.paused = true;
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        self.paused = false;
        Ok(())
    }
}
