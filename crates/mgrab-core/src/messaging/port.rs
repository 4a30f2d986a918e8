use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{ChatAction, InlineKeyboard, UploadCounter},
    Result,
};

/// Cross-messenger port.
///
/// Telegram is the first implementation; the shape is designed so future
/// adapters can fit behind the same interface.
///
/// Edit calls are required to treat a "content unchanged" response from the
/// transport as success, so callers can re-render status text without
/// diffing it first.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;

    /// Stream a local file to the chat as an audio attachment. When a
    /// counter is supplied the adapter feeds it with the bytes read so far.
    async fn send_audio_file(
        &self,
        chat_id: ChatId,
        path: &Path,
        counter: Option<UploadCounter>,
    ) -> Result<()>;

    /// Stream a local file to the chat as a video attachment (with the
    /// transport's streaming hint where supported).
    async fn send_video_file(
        &self,
        chat_id: ChatId,
        path: &Path,
        counter: Option<UploadCounter>,
    ) -> Result<()>;
}
