use std::{collections::HashSet, sync::Arc};

use tokio::sync::Mutex;
use tracing::warn;

use crate::{domain::ChatId, formatting::escape_html, messaging::port::MessagingPort};

/// Chat ids already announced to the operator log channel.
///
/// Append-only for the process lifetime; exists purely to suppress duplicate
/// "new user" notices. Not persisted anywhere — acceptable for this bot, a
/// real user directory is out of scope.
#[derive(Default)]
pub struct KnownUsers {
    inner: Mutex<HashSet<i64>>,
}

impl KnownUsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the chat id as seen. Returns true only the first time, so the
    /// caller announces at most once per process lifetime.
    pub async fn mark_seen(&self, chat_id: ChatId) -> bool {
        self.inner.lock().await.insert(chat_id.0)
    }
}

/// Identity fields of the sender, as far as the transport knows them.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub user_id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

fn render_notice(user: &NewUser) -> String {
    let username = user
        .username
        .as_deref()
        .map(|u| format!("@{}", escape_html(u)))
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "👋 <b>New user</b>\n\n\
         <b>User ID:</b> <code>{}</code>\n\
         <b>First name:</b> {}\n\
         <b>Username:</b> {}",
        user.user_id,
        escape_html(&user.first_name),
        username
    )
}

/// Send the one-line notice to the operator log channel if this chat has not
/// been seen before. Send failures are logged and swallowed; they never
/// interrupt the user-facing flow.
pub async fn announce_new_user(
    known: &KnownUsers,
    messenger: &Arc<dyn MessagingPort>,
    log_channel: ChatId,
    chat_id: ChatId,
    user: &NewUser,
) {
    if !known.mark_seen(chat_id).await {
        return;
    }
    if let Err(err) = messenger.send_html(log_channel, &render_notice(user)).await {
        warn!(chat_id = chat_id.0, error = %err, "failed to announce new user");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chat_id_is_new_only_once() {
        let known = KnownUsers::new();
        assert!(known.mark_seen(ChatId(1)).await);
        assert!(!known.mark_seen(ChatId(1)).await);
        assert!(!known.mark_seen(ChatId(1)).await);
        assert!(known.mark_seen(ChatId(2)).await);
    }

    #[test]
    fn notice_escapes_user_supplied_fields() {
        let notice = render_notice(&NewUser {
            user_id: 99,
            first_name: "<Mallory>".to_string(),
            username: Some("m&m".to_string()),
        });
        assert!(notice.contains("<code>99</code>"));
        assert!(notice.contains("&lt;Mallory&gt;"));
        assert!(notice.contains("@m&amp;m"));
        assert!(!notice.contains("<Mallory>"));
    }

    #[test]
    fn missing_username_renders_as_na() {
        let notice = render_notice(&NewUser {
            user_id: 7,
            first_name: "Ana".to_string(),
            username: None,
        });
        assert!(notice.contains("<b>Username:</b> N/A"));
    }
}
