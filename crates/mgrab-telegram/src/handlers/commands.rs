use std::sync::Arc;

use teloxide::prelude::*;

use mgrab_core::{
    domain::{ChatId, Platform},
    messaging::types::InlineKeyboard,
};

use crate::router::AppState;

pub const START_MENU_TEXT: &str = "📥 What do you want to download from?";

const HELP_TEXT: &str = "I download video and audio from Instagram and Facebook.\n\n\
    /start — pick a platform and send a link\n\
    /cancel — abandon the current flow\n\
    /help — this message";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub fn platform_keyboard() -> InlineKeyboard {
    InlineKeyboard::from_pairs([
        (
            Platform::Instagram.label(),
            format!("platform:{}", Platform::Instagram.as_str()),
        ),
        (
            Platform::Facebook.label(),
            format!("platform:{}", Platform::Facebook.as_str()),
        ),
    ])
}

pub async fn handle_command(
    _bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let (cmd, _args) = parse_command(text);
    let chat_id = ChatId(msg.chat.id.0);

    match cmd.as_str() {
        "start" => {
            let _ = state
                .messenger
                .send_inline_keyboard(chat_id, START_MENU_TEXT, platform_keyboard())
                .await;
        }
        "cancel" => {
            let reply = if state.sessions.remove(chat_id).await.is_some() {
                "Cancelled. /start to begin again."
            } else {
                "Nothing to cancel. /start to begin."
            };
            let _ = state.messenger.send_html(chat_id, reply).await;
        }
        "help" => {
            let _ = state.messenger.send_html(chat_id, HELP_TEXT).await;
        }
        _ => {
            let _ = state
                .messenger
                .send_html(chat_id, "Unknown command. Try /start.")
                .await;
        }
    }

    Ok(())
}
