//! Telegram adapter (teloxide).
//!
//! This crate implements the `mgrab-core` MessagingPort over the Telegram
//! Bot API, including streamed file uploads with byte-level progress
//! accounting.

use std::{
    path::Path,
    pin::Pin,
    task::{Context, Poll},
};

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode},
};

use tokio::{
    fs::File,
    io::{AsyncRead, ReadBuf},
    time::sleep,
};

pub mod handlers;
pub mod router;

use mgrab_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, InlineKeyboard, UploadCounter},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Transport(format!("telegram error: {e}"))
    }

    fn is_not_modified(e: &teloxide::RequestError) -> bool {
        matches!(
            e,
            teloxide::RequestError::Api(teloxide::ApiError::MessageNotModified)
        )
    }

    async fn with_retry<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> std::result::Result<T, teloxide::RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(other),
                },
            }
        }
    }

    fn keyboard_markup(keyboard: InlineKeyboard) -> InlineKeyboardMarkup {
        let rows: Vec<Vec<InlineKeyboardButton>> = keyboard
            .buttons
            .into_iter()
            .map(|b| vec![InlineKeyboardButton::callback(b.label, b.callback_data)])
            .collect();
        InlineKeyboardMarkup::new(rows)
    }

    /// File uploads are single-attempt: a streamed body cannot be replayed
    /// on retry.
    async fn input_file(path: &Path, counter: Option<UploadCounter>) -> Result<InputFile> {
        let Some(counter) = counter else {
            return Ok(InputFile::file(path));
        };
        let file = File::open(path).await?;
        let reader = CountingReader::new(file, counter);
        let mut input = InputFile::read(reader);
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            input = input.file_name(name.to_string());
        }
        Ok(input)
    }
}

/// AsyncRead wrapper that reports every byte read into the shared counter.
///
/// The orchestrator polls the counter from its progress loop while the
/// request body streams out of this reader.
struct CountingReader<R> {
    inner: R,
    counter: UploadCounter,
}

impl<R> CountingReader<R> {
    fn new(inner: R, counter: UploadCounter) -> Self {
        Self { inner, counter }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let after = buf.filled().len();
            if after > before {
                self.counter.add_bytes(after - before);
            }
        }
        poll
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await
            .map_err(Self::map_err)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        let res = self
            .with_retry(|| {
                self.bot
                    .edit_message_text(
                        Self::tg_chat(msg.chat_id),
                        Self::tg_msg_id(msg.message_id),
                        html.to_string(),
                    )
                    .parse_mode(ParseMode::Html)
            })
            .await;

        match res {
            Ok(_) => Ok(()),
            // Re-rendering unchanged text is not an error for callers.
            Err(e) if Self::is_not_modified(&e) => Ok(()),
            Err(e) => Err(Self::map_err(e)),
        }
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await
        .map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
            ChatAction::UploadVideo => teloxide::types::ChatAction::UploadVideo,
            ChatAction::UploadDocument => teloxide::types::ChatAction::UploadDocument,
        };
        self.with_retry(|| self.bot.send_chat_action(Self::tg_chat(chat_id), tg_action))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let markup = Self::keyboard_markup(keyboard);
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
            })
            .await
            .map_err(Self::map_err)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        let markup = Self::keyboard_markup(keyboard);
        let res = self
            .with_retry(|| {
                self.bot
                    .edit_message_text(
                        Self::tg_chat(msg.chat_id),
                        Self::tg_msg_id(msg.message_id),
                        text.to_string(),
                    )
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
            })
            .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if Self::is_not_modified(&e) => Ok(()),
            Err(e) => Err(Self::map_err(e)),
        }
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await
        .map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_audio_file(
        &self,
        chat_id: ChatId,
        path: &Path,
        counter: Option<UploadCounter>,
    ) -> Result<()> {
        let input = Self::input_file(path, counter).await?;
        self.bot
            .send_audio(Self::tg_chat(chat_id), input)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_video_file(
        &self,
        chat_id: ChatId,
        path: &Path,
        counter: Option<UploadCounter>,
    ) -> Result<()> {
        let input = Self::input_file(path, counter).await?;
        self.bot
            .send_video(Self::tg_chat(chat_id), input)
            .supports_streaming(true)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }
}
