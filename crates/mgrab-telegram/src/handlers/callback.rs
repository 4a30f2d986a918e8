use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};
use tracing::warn;

use mgrab_core::{
    domain::{ChatId, MediaKind, MessageId, MessageRef, Platform},
    download::DownloadRequest,
    errors::Error,
    formatting::{escape_html, truncate_text},
    messaging::types::InlineKeyboard,
    resolver::types::eligible_heights,
    session::{ChatSession, FormatDecision},
};

use crate::router::AppState;

const RESTART_TEXT: &str = "⚠️ Something went wrong. Please start over with /start.";
const NO_RENDITIONS_TEXT: &str = "⚠️ No downloadable video of 360p or higher was found.";

fn quality_keyboard(heights: &[u32]) -> InlineKeyboard {
    InlineKeyboard::from_pairs(
        heights
            .iter()
            .map(|h| (format!("{h}p"), format!("quality:{h}"))),
    )
}

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let data = q.data.clone().unwrap_or_default();

    // A callback without its message is stale beyond recovery; just ack it.
    let Some(message) = q.message.as_ref() else {
        let _ = state.messenger.answer_callback_query(&cb_id, None).await;
        return Ok(());
    };
    let chat_id = ChatId(message.chat.id.0);
    // The tapped keyboard message doubles as the download status message.
    let status = MessageRef {
        chat_id,
        message_id: MessageId(message.id.0),
    };

    let Some((prefix, value)) = data.split_once(':') else {
        let _ = state.messenger.answer_callback_query(&cb_id, None).await;
        return Ok(());
    };

    match prefix {
        "platform" => handle_platform(&state, &cb_id, chat_id, status, value).await,
        "fmt" => handle_format(&state, &cb_id, chat_id, status, value).await,
        "quality" => handle_quality(&state, &cb_id, chat_id, status, value).await,
        _ => {
            let _ = state.messenger.answer_callback_query(&cb_id, None).await;
        }
    }

    Ok(())
}

async fn handle_platform(
    state: &Arc<AppState>,
    cb_id: &str,
    chat_id: ChatId,
    menu: MessageRef,
    value: &str,
) {
    let Some(platform) = Platform::parse(value) else {
        let _ = state.messenger.answer_callback_query(cb_id, None).await;
        return;
    };

    state
        .sessions
        .set(chat_id, ChatSession::begin(platform))
        .await;

    let _ = state.messenger.answer_callback_query(cb_id, None).await;
    let prompt = format!("🔗 Send me the {} link.", platform.label());
    let _ = state.messenger.edit_html(menu, &prompt).await;
}

async fn handle_format(
    state: &Arc<AppState>,
    cb_id: &str,
    chat_id: ChatId,
    status: MessageRef,
    value: &str,
) {
    let Some(kind) = MediaKind::parse(value) else {
        let _ = state.messenger.answer_callback_query(cb_id, None).await;
        return;
    };

    let decision = match state.sessions.get(chat_id).await {
        Some(session) => session.choose_format(kind),
        None => FormatDecision::Restart,
    };

    match decision {
        FormatDecision::Download(plan) => {
            let _ = state
                .messenger
                .answer_callback_query(cb_id, Some("Download queued"))
                .await;
            state.downloads.clone().spawn(DownloadRequest {
                chat_id,
                status,
                plan,
            });
        }
        FormatDecision::ListRenditions { url } => {
            let _ = state
                .messenger
                .answer_callback_query(cb_id, Some("Checking available quality…"))
                .await;
            offer_renditions(state, chat_id, status, &url).await;
        }
        FormatDecision::Restart => restart(state, cb_id, chat_id, status).await,
    }
}

async fn handle_quality(
    state: &Arc<AppState>,
    cb_id: &str,
    chat_id: ChatId,
    status: MessageRef,
    value: &str,
) {
    let Ok(height) = value.parse::<u32>() else {
        let _ = state.messenger.answer_callback_query(cb_id, None).await;
        return;
    };

    let decision = match state.sessions.get(chat_id).await {
        Some(session) => session.choose_quality(height),
        None => FormatDecision::Restart,
    };

    match decision {
        FormatDecision::Download(plan) => {
            let _ = state
                .messenger
                .answer_callback_query(cb_id, Some("Download queued"))
                .await;
            state.downloads.clone().spawn(DownloadRequest {
                chat_id,
                status,
                plan,
            });
        }
        _ => restart(state, cb_id, chat_id, status).await,
    }
}

async fn offer_renditions(state: &Arc<AppState>, chat_id: ChatId, status: MessageRef, url: &str) {
    match state.resolver.list_renditions(url).await {
        Ok(renditions) => {
            let heights = eligible_heights(&renditions);
            if heights.is_empty() {
                // Nothing worth offering: report and return the chat to idle
                // rather than presenting an empty menu.
                let _ = state.messenger.edit_html(status, NO_RENDITIONS_TEXT).await;
                state.sessions.remove(chat_id).await;
                return;
            }

            if !state.sessions.update(chat_id, |s| s.await_quality()).await {
                let _ = state.messenger.edit_html(status, RESTART_TEXT).await;
                return;
            }
            let _ = state
                .messenger
                .edit_inline_keyboard(status, "🎚 Pick a quality:", quality_keyboard(&heights))
                .await;
        }
        Err(err) => {
            warn!(chat_id = chat_id.0, error = %err, "rendition listing failed");
            let reason = match &err {
                Error::Resolver(msg) => msg.clone(),
                other => other.to_string(),
            };
            let text = format!("❌ {}", escape_html(&truncate_text(&reason, 300)));
            let _ = state.messenger.edit_html(status, &text).await;
            state.sessions.remove(chat_id).await;
        }
    }
}

async fn restart(state: &Arc<AppState>, cb_id: &str, chat_id: ChatId, status: MessageRef) {
    let _ = state.messenger.answer_callback_query(cb_id, None).await;
    let _ = state.messenger.edit_html(status, RESTART_TEXT).await;
    state.sessions.remove(chat_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_keyboard_labels_heights() {
        let kb = quality_keyboard(&[1080, 720, 360]);
        assert_eq!(kb.buttons.len(), 3);
        assert_eq!(kb.buttons[0].label, "1080p");
        assert_eq!(kb.buttons[0].callback_data, "quality:1080");
        assert_eq!(kb.buttons[2].callback_data, "quality:360");
    }
}
