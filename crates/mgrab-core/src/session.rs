use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;

use crate::domain::{ChatId, MediaKind, Platform};

/// Which step of the download dialogue a chat is currently in.
///
/// A chat with no session at all is idle; sessions only exist while a flow
/// is in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Platform picked, waiting for the user to paste a link.
    AwaitingLink(Platform),
    /// Link captured, waiting for the Video/Audio choice.
    AwaitingFormat(Platform),
    /// Facebook video: waiting for a resolution pick.
    AwaitingQuality,
}

/// Per-chat dialogue state.
///
/// `url` is set when the link is captured and read by every later stage.
/// Callback events can arrive for sessions that were already cleared or
/// rewound (stale buttons), so every stage transition re-checks its
/// preconditions instead of trusting the event.
#[derive(Clone, Debug)]
pub struct ChatSession {
    pub stage: Stage,
    pub url: Option<String>,
    touched: Instant,
}

/// What the dialogue decided to do in response to a format/quality pick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormatDecision {
    /// Hand off to the download orchestrator.
    Download(DownloadPlan),
    /// Facebook video: list renditions first and let the user pick one.
    ListRenditions { url: String },
    /// Preconditions not met (stale button, missing url): tell the user to
    /// start over.
    Restart,
}

/// Everything the orchestrator needs to run one download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadPlan {
    pub url: String,
    pub kind: MediaKind,
    /// Resolution ceiling in pixels of height, when the user picked one.
    pub quality: Option<u32>,
}

impl ChatSession {
    /// Entry point of the flow: the user picked a platform.
    pub fn begin(platform: Platform) -> Self {
        Self {
            stage: Stage::AwaitingLink(platform),
            url: None,
            touched: Instant::now(),
        }
    }

    /// Free text arrived while we were waiting for a link. The text is taken
    /// verbatim as the URL (no validation; the resolver is the judge).
    /// Returns false when the session is not in a link-awaiting stage.
    pub fn accept_link(&mut self, url: &str) -> bool {
        let Stage::AwaitingLink(platform) = self.stage else {
            return false;
        };
        self.url = Some(url.to_string());
        self.stage = Stage::AwaitingFormat(platform);
        self.touched = Instant::now();
        true
    }

    /// The user picked Video or Audio.
    ///
    /// Instagram goes straight to download for both kinds; Facebook audio
    /// too. Facebook video needs a rendition listing first.
    pub fn choose_format(&self, kind: MediaKind) -> FormatDecision {
        match (&self.stage, &self.url) {
            (Stage::AwaitingFormat(platform), Some(url)) => match (platform, kind) {
                (Platform::Facebook, MediaKind::Video) => FormatDecision::ListRenditions {
                    url: url.clone(),
                },
                _ => FormatDecision::Download(DownloadPlan {
                    url: url.clone(),
                    kind,
                    quality: None,
                }),
            },
            _ => FormatDecision::Restart,
        }
    }

    /// Renditions were listed; remember that we are now waiting for a pick.
    pub fn await_quality(&mut self) {
        self.stage = Stage::AwaitingQuality;
        self.touched = Instant::now();
    }

    /// The user picked a concrete resolution. The value is passed verbatim
    /// to the orchestrator as a quality ceiling.
    pub fn choose_quality(&self, height: u32) -> FormatDecision {
        match (&self.stage, &self.url) {
            (Stage::AwaitingQuality, Some(url)) => FormatDecision::Download(DownloadPlan {
                url: url.clone(),
                kind: MediaKind::Video,
                quality: Some(height),
            }),
            _ => FormatDecision::Restart,
        }
    }

    fn expired(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.touched) > ttl
    }
}

/// Process-wide session store: one entry per chat, nothing persisted.
///
/// A single async mutex around the map keeps concurrent access from the
/// dispatcher and download workers well-defined; critical sections never
/// await while holding the lock.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<i64, ChatSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, chat_id: ChatId) -> Option<ChatSession> {
        self.inner.lock().await.get(&chat_id.0).cloned()
    }

    pub async fn set(&self, chat_id: ChatId, session: ChatSession) {
        self.inner.lock().await.insert(chat_id.0, session);
    }

    /// Mutate the session in place, if present. Returns false when there is
    /// no session for the chat.
    pub async fn update(&self, chat_id: ChatId, f: impl FnOnce(&mut ChatSession)) -> bool {
        let mut map = self.inner.lock().await;
        match map.get_mut(&chat_id.0) {
            Some(session) => {
                f(session);
                session.touched = Instant::now();
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, chat_id: ChatId) -> Option<ChatSession> {
        self.inner.lock().await.remove(&chat_id.0)
    }

    /// Drop sessions that have not been touched within `ttl`. Abandoned
    /// flows never self-clean otherwise, so the router runs this on an
    /// interval. Returns the number of sessions removed.
    pub async fn prune(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut map = self.inner.lock().await;
        let before = map.len();
        map.retain(|_, session| !session.expired(ttl, now));
        before - map.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT: ChatId = ChatId(42);

    #[test]
    fn full_instagram_video_walk() {
        let mut session = ChatSession::begin(Platform::Instagram);
        assert_eq!(session.stage, Stage::AwaitingLink(Platform::Instagram));
        assert!(session.url.is_none());

        assert!(session.accept_link("https://instagram.com/p/abc"));
        assert_eq!(session.stage, Stage::AwaitingFormat(Platform::Instagram));

        let decision = session.choose_format(MediaKind::Video);
        assert_eq!(
            decision,
            FormatDecision::Download(DownloadPlan {
                url: "https://instagram.com/p/abc".to_string(),
                kind: MediaKind::Video,
                quality: None,
            })
        );
    }

    #[test]
    fn facebook_audio_skips_quality_choice() {
        let mut session = ChatSession::begin(Platform::Facebook);
        session.accept_link("https://fb.watch/xyz");
        match session.choose_format(MediaKind::Audio) {
            FormatDecision::Download(plan) => {
                assert_eq!(plan.kind, MediaKind::Audio);
                assert_eq!(plan.quality, None);
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn facebook_video_lists_renditions_then_downloads_with_ceiling() {
        let mut session = ChatSession::begin(Platform::Facebook);
        session.accept_link("https://fb.watch/xyz");

        assert_eq!(
            session.choose_format(MediaKind::Video),
            FormatDecision::ListRenditions {
                url: "https://fb.watch/xyz".to_string()
            }
        );

        session.await_quality();
        match session.choose_quality(720) {
            FormatDecision::Download(plan) => {
                assert_eq!(plan.kind, MediaKind::Video);
                assert_eq!(plan.quality, Some(720));
                assert_eq!(plan.url, "https://fb.watch/xyz");
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn stale_buttons_are_answered_with_restart() {
        // Format pick before any link was captured.
        let session = ChatSession::begin(Platform::Instagram);
        assert_eq!(session.choose_format(MediaKind::Video), FormatDecision::Restart);

        // Quality pick while the session is still at the format stage.
        let mut session = ChatSession::begin(Platform::Facebook);
        session.accept_link("https://fb.watch/xyz");
        assert_eq!(session.choose_quality(480), FormatDecision::Restart);
    }

    #[test]
    fn link_is_only_accepted_while_awaiting_one() {
        let mut session = ChatSession::begin(Platform::Instagram);
        session.accept_link("https://instagram.com/p/abc");
        assert!(!session.accept_link("https://instagram.com/p/second"));
        assert_eq!(session.url.as_deref(), Some("https://instagram.com/p/abc"));
    }

    #[tokio::test]
    async fn store_set_get_remove() {
        let store = SessionStore::new();
        assert!(store.get(CHAT).await.is_none());

        store.set(CHAT, ChatSession::begin(Platform::Instagram)).await;
        assert!(store.get(CHAT).await.is_some());
        assert_eq!(store.len().await, 1);

        store.remove(CHAT).await;
        assert!(store.get(CHAT).await.is_none());
    }

    #[tokio::test]
    async fn store_update_requires_existing_session() {
        let store = SessionStore::new();
        assert!(!store.update(CHAT, |s| s.await_quality()).await);

        store.set(CHAT, ChatSession::begin(Platform::Facebook)).await;
        assert!(
            store
                .update(CHAT, |s| {
                    s.accept_link("https://fb.watch/xyz");
                })
                .await
        );
        let session = store.get(CHAT).await.unwrap();
        assert_eq!(session.stage, Stage::AwaitingFormat(Platform::Facebook));
    }

    #[test]
    fn expiry_is_relative_to_last_touch() {
        let session = ChatSession::begin(Platform::Instagram);
        let t0 = session.touched;
        assert!(!session.expired(Duration::from_secs(60), t0 + Duration::from_secs(30)));
        assert!(session.expired(Duration::from_secs(60), t0 + Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn prune_drops_expired_sessions() {
        let store = SessionStore::new();
        store.set(CHAT, ChatSession::begin(Platform::Instagram)).await;
        store
            .set(ChatId(7), ChatSession::begin(Platform::Facebook))
            .await;

        // A generous TTL keeps fresh sessions alive.
        assert_eq!(store.prune(Duration::from_secs(1800)).await, 0);
        assert_eq!(store.len().await, 2);

        // A zero TTL expires anything that has aged at all.
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.prune(Duration::ZERO).await, 2);
        assert_eq!(store.len().await, 0);
    }
}
