//! 画面スナップショットのテキスト描画

use std::fmt::Write;

use crate::console::config_editor::ConfigKey;
use crate::console::log_stream::LogSeverity;
use crate::console::view::{ConsoleView, DetailTab, MessageTone};

/// 画面全体を描画する
pub fn render(view: &ConsoleView) -> String {
    let mut out = String::new();

    match &view.server {
        Some(banner) => {
            let _ = writeln!(
                out,
                "🌐 {}{}",
                banner.address,
                banner
                    .url
                    .as_deref()
                    .map(|url| format!("  ({})", url))
                    .unwrap_or_default()
            );
        }
        None => out.push_str("🌐 (server address unknown)\n"),
    }
    let _ = writeln!(
        out,
        "Log stream: {}",
        if view.push_connected { "connected" } else { "disconnected" }
    );

    out.push_str("\nChannels\n");
    if view.cards.is_empty() {
        out.push_str("  (none)\n");
    }
    for card in &view.cards {
        let _ = writeln!(
            out,
            "  {} {} {}",
            if card.active { ">" } else { " " },
            if card.live { "🟢" } else { "🔴" },
            card.name
        );
    }

    if let Some(message) = &view.message {
        let marker = match message.tone {
            MessageTone::Info => "ℹ️",
            MessageTone::Error => "❌",
        };
        let _ = writeln!(out, "\n{} {}", marker, message.text);
    }
    if let Some(pending) = &view.confirmation {
        let _ = writeln!(out, "\n❓ {} (yes/no)", pending.prompt);
    }

    if view.panel.visible {
        let _ = writeln!(out, "\n== {} ==  {}", view.panel.title, view.panel.subtitle);
        let _ = writeln!(
            out,
            "Preview: {} - {}",
            view.preview.label, view.preview.hint
        );
        let _ = writeln!(out, "[{}]", view.panel.tab);
        match view.panel.tab {
            DetailTab::Status => render_status(view, &mut out),
            DetailTab::Config => render_config(view, &mut out),
            DetailTab::Logs => render_logs(view, &mut out),
        }
    }

    out
}

fn render_status(view: &ConsoleView, out: &mut String) {
    let Some(status) = &view.status else {
        out.push_str("  Loading status\n");
        return;
    };
    let _ = writeln!(out, "  Status:        {}", status.label);
    let _ = writeln!(out, "  Detail:        {}", status.detail);
    let _ = writeln!(out, "  Uptime:        {}", status.uptime);
    let _ = writeln!(out, "  Current video: {}", status.current_video);
    let _ = writeln!(out, "  Videos played: {}", status.video_count);
    let _ = writeln!(out, "  Next restart:  {}", status.next_restart);
    let _ = writeln!(out, "  Config saved:  {}", status.config_last_saved);

    let button = |name: &str, enabled: bool| {
        if enabled {
            format!("[{}]", name)
        } else {
            format!("({})", name)
        }
    };
    let _ = writeln!(
        out,
        "  {} {} {}",
        button("start", status.controls.start_enabled),
        button("stop", status.controls.stop_enabled),
        button("restart", status.controls.restart_enabled)
    );
}

fn render_config(view: &ConsoleView, out: &mut String) {
    for key in ConfigKey::ALL {
        let _ = writeln!(out, "  {:<14} {}", key.to_string(), view.config.value(key));
    }
    let _ = writeln!(
        out,
        "  Last saved:    {}",
        view.config.last_saved().unwrap_or("never")
    );
    out.push_str("  History:\n");
    for item in &view.history {
        let _ = writeln!(out, "    - {}", item.text());
    }
}

fn render_logs(view: &ConsoleView, out: &mut String) {
    if view.logs.dropped() > 0 {
        let _ = writeln!(out, "  ({} older lines dropped)", view.logs.dropped());
    }
    for line in view.logs.lines() {
        let marker = match line.severity {
            LogSeverity::Error => "E",
            LogSeverity::Warning => "W",
            LogSeverity::Info => "I",
            LogSeverity::Plain => " ",
        };
        let _ = writeln!(out, "  {} {}", marker, line.text);
    }
}
