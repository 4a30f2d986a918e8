//! Telegram update handlers.
//!
//! Each handler is a thin adapter: it maps the teloxide update onto the
//! core dialogue state machine and performs the resulting transport calls.
//! Handlers never propagate errors — the dispatch loop must survive
//! anything a single update throws at it.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use mgrab_core::{
    domain::ChatId,
    users::{announce_new_user, NewUser},
};

use crate::router::AppState;

mod callback;
mod commands;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    log_new_user(&msg, &state);

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(bot, msg, state).await;
        }
        return text::handle_text(bot, msg, state).await;
    }

    // Only text drives the flow; nudge everything else toward the menu.
    let _ = bot
        .send_message(msg.chat.id, "Send me a link as text, or /start to begin.")
        .await;

    Ok(())
}

/// First-contact notice to the operator channel, off the hot path.
fn log_new_user(msg: &Message, state: &Arc<AppState>) {
    let Some(user) = msg.from() else {
        return;
    };
    let chat_id = ChatId(msg.chat.id.0);
    let new_user = NewUser {
        user_id: user.id.0 as i64,
        first_name: user.first_name.clone(),
        username: user.username.clone(),
    };
    let state = Arc::clone(state);
    tokio::spawn(async move {
        announce_new_user(
            &state.known_users,
            &state.messenger,
            ChatId(state.cfg.log_channel_id),
            chat_id,
            &new_user,
        )
        .await;
    });
}
