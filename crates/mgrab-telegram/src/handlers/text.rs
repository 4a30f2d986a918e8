use std::sync::Arc;

use teloxide::prelude::*;

use mgrab_core::{
    domain::{ChatId, MediaKind},
    messaging::types::InlineKeyboard,
};

use crate::router::AppState;

pub const FORMAT_MENU_TEXT: &str = "What should I fetch?";

pub fn format_keyboard() -> InlineKeyboard {
    InlineKeyboard::from_pairs([
        ("🎬 Video", format!("fmt:{}", MediaKind::Video.as_str())),
        ("🎵 Audio", format!("fmt:{}", MediaKind::Audio.as_str())),
    ])
}

/// Free text is only meaningful while a session awaits a link: the text is
/// taken verbatim as the URL and the Video/Audio choice is offered next.
pub async fn handle_text(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text().map(|s| s.trim().to_string()) else {
        return Ok(());
    };
    if text.is_empty() {
        return Ok(());
    }
    let chat_id = ChatId(msg.chat.id.0);

    let mut accepted = false;
    let existed = state
        .sessions
        .update(chat_id, |session| {
            accepted = session.accept_link(&text);
        })
        .await;

    if !existed {
        let _ = state
            .messenger
            .send_html(chat_id, "Use /start to begin.")
            .await;
        return Ok(());
    }
    if !accepted {
        let _ = state
            .messenger
            .send_html(
                chat_id,
                "Please use the buttons above, or /cancel to start over.",
            )
            .await;
        return Ok(());
    }

    // Best-effort delete of the user's link message keeps the chat tidy.
    let _ = bot.delete_message(msg.chat.id, msg.id).await;

    let _ = state
        .messenger
        .send_inline_keyboard(chat_id, FORMAT_MENU_TEXT, format_keyboard())
        .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_keyboard_offers_video_and_audio() {
        let kb = format_keyboard();
        assert_eq!(kb.buttons.len(), 2);
        assert_eq!(kb.buttons[0].callback_data, "fmt:video");
        assert_eq!(kb.buttons[1].callback_data, "fmt:audio");
    }
}
