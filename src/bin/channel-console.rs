use anyhow::Context;
use channel_console::{
    api::models::ChannelCommand,
    console::{
        config_editor::ConfigKey,
        config_manager::{ConfigManager, ConsoleConfig},
        player::{ExternalPlayerProvider, HeadlessMedia},
        preview::{AdaptiveEngineProvider, PreviewManager},
        render::render,
        utils,
        view::DetailTab,
        ConsoleSettings,
    },
    Console, HttpConsoleApi, LogPushChannel, ReconnectPolicy, WebSocketPushClient,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// 配信チャンネル運用コンソール
#[derive(Parser, Debug)]
#[command(name = "channel-console", version, about)]
struct Args {
    /// ダッシュボードのURL
    #[arg(long)]
    server: Option<String>,
    /// ログインユーザー名
    #[arg(long)]
    user: Option<String>,
    /// 設定ファイルのパス
    #[arg(long)]
    config: Option<PathBuf>,
    /// ログレベル
    #[arg(long)]
    log_level: Option<String>,
    /// プレビュー用の外部プレイヤーを使わない
    #[arg(long, default_value_t = false)]
    no_preview: bool,
}

enum Input {
    Continue,
    Quit,
}

const HELP: &str = "commands: list | select <name> | close | tab <status|config|logs> | \
start | stop | restart | yes | no | set <KEY> <VALUE> | save | history | clear | show | quit";

fn load_config(args: &Args) -> anyhow::Result<ConsoleConfig> {
    let manager = match &args.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load_config()?;
    config.apply_env();

    if let Some(server) = &args.server {
        config.server_url = server.clone();
    }
    if let Some(user) = &args.user {
        config.username = Some(user.clone());
    }
    if let Some(level) = &args.log_level {
        config.log.level = level.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn handle_line(console: &mut Console, line: &str) -> Input {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Input::Continue;
    };

    match command {
        "list" => console.refresh_channels(),
        "select" => match parts.next() {
            Some(name) => console.select_channel(name),
            None => eprintln!("usage: select <name>"),
        },
        "close" => console.close_details(),
        "tab" => match parts.next().map(str::parse::<DetailTab>) {
            Some(Ok(tab)) => console.show_tab(tab),
            Some(Err(e)) => eprintln!("{}", e),
            None => eprintln!("usage: tab <status|config|logs>"),
        },
        "start" => console.request_command(ChannelCommand::Start),
        "stop" => console.request_command(ChannelCommand::Stop),
        "restart" => console.request_command(ChannelCommand::Restart),
        "yes" | "y" => console.confirm(true),
        "no" | "n" => console.confirm(false),
        "set" => match (parts.next().map(str::parse::<ConfigKey>), parts.next()) {
            (Some(Ok(key)), Some(value)) => console.edit_config(key, value),
            (Some(Err(e)), _) => eprintln!("{}", e),
            _ => eprintln!("usage: set <KEY> <VALUE>"),
        },
        "save" => console.save_config(),
        "history" => console.load_history(),
        "clear" => console.clear_logs(),
        "show" => println!("{}", render(console.view())),
        "quit" | "exit" => return Input::Quit,
        _ => eprintln!("{}", HELP),
    }
    Input::Continue
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let _log_guard = utils::init_logging(&config.log)?;

    tracing::info!("🎬 Starting channel-console for {}", config.server_url);

    let api = Arc::new(HttpConsoleApi::new(&config.server_url)?);
    if let (Some(user), Some(password)) = (&config.username, &config.password) {
        api.login(user, password).await.context("Login failed")?;
    }

    let push_url = api.push_url(&config.push_path)?;
    let cookie = api
        .cookie_header()
        .and_then(|value| value.to_str().ok().map(str::to_string));
    // 接続はバックグラウンドで行い、切れても繋ぎ直す
    let (push_client, push_events) =
        WebSocketPushClient::start(push_url.as_str(), cookie, ReconnectPolicy::default())
            .context("Invalid push channel endpoint")?;
    let push_client = Arc::new(push_client);
    let push: Arc<dyn LogPushChannel> = push_client.clone();

    let media = Box::new(HeadlessMedia::new());
    let preview = if args.no_preview {
        PreviewManager::disabled(media)
    } else {
        let provider = ExternalPlayerProvider::from_config(&config.player);
        if !provider.is_supported() {
            tracing::warn!("⚠️ Player {} not found, preview disabled", provider.command());
        }
        let provider: Arc<dyn AdaptiveEngineProvider> = Arc::new(provider);
        PreviewManager::new(media, Some(provider))
    };

    let mut console = Console::new(api, push, preview, ConsoleSettings::from(&config));
    console.forward_push(push_events);
    console.load_server_info();
    console.refresh_channels();

    eprintln!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut rendered_revision = u64::MAX;

    loop {
        tokio::select! {
            event = console.next_event() => {
                let Some(event) = event else { break };
                console.dispatch(event);
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Input::Quit = handle_line(&mut console, line.trim()) {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("❌ Failed to read input: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }

        if console.view().revision != rendered_revision {
            rendered_revision = console.view().revision;
            println!("{}", render(console.view()));
        }
    }

    console.shutdown();
    drop(console);
    if let Ok(client) = Arc::try_unwrap(push_client) {
        client.close();
    }

    tracing::info!("👋 channel-console shutting down");
    Ok(())
}
