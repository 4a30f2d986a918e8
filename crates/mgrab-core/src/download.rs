use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::{
    domain::{ChatId, MediaKind, MessageRef},
    formatting::{escape_html, truncate_text},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, UploadCounter},
    },
    progress::ProgressTracker,
    resolver::{
        client::MediaResolver,
        types::{FetchRequest, FormatSpec},
    },
    session::{DownloadPlan, SessionStore},
    Error, Result,
};

pub const STATUS_PREPARING: &str = "⏳ Preparing to download…";
pub const STATUS_DOWNLOADING: &str = "⬇️ Downloading…";
pub const STATUS_UPLOADING: &str = "✅ Download complete. Now uploading…";

const ERROR_TEXT_MAX: usize = 300;

/// One accepted download, ready to hand to a worker.
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    pub chat_id: ChatId,
    /// The message that is repeatedly edited in place to reflect progress
    /// (the keyboard message the user tapped, repurposed).
    pub status: MessageRef,
    pub plan: DownloadPlan,
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub download_dir: PathBuf,
    pub max_concurrent: usize,
    pub progress_edit_interval: Duration,
}

/// Runs the fetch-and-upload sequence off the dispatch path.
///
/// Workers are gated by a semaphore so concurrency is bounded; requests past
/// the limit queue on the permit. A worker never propagates an error and
/// always clears the chat's session on the way out.
pub struct DownloadOrchestrator {
    resolver: Arc<dyn MediaResolver>,
    messenger: Arc<dyn MessagingPort>,
    sessions: Arc<SessionStore>,
    permits: Arc<Semaphore>,
    cfg: OrchestratorConfig,
}

impl DownloadOrchestrator {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        messenger: Arc<dyn MessagingPort>,
        sessions: Arc<SessionStore>,
        cfg: OrchestratorConfig,
    ) -> Self {
        Self {
            resolver,
            messenger,
            sessions,
            permits: Arc::new(Semaphore::new(cfg.max_concurrent.max(1))),
            cfg,
        }
    }

    /// Queue one download and return immediately.
    pub fn spawn(self: Arc<Self>, req: DownloadRequest) {
        tokio::spawn(async move { self.run(req).await });
    }

    async fn run(&self, req: DownloadRequest) {
        let Ok(_permit) = self.permits.clone().acquire_owned().await else {
            return; // semaphore closed, process is shutting down
        };

        let chat_id = req.chat_id;
        info!(
            chat_id = chat_id.0,
            url = %req.plan.url,
            kind = req.plan.kind.as_str(),
            quality = ?req.plan.quality,
            "starting download"
        );

        if let Err(err) = self.execute(&req).await {
            warn!(chat_id = chat_id.0, error = %err, "download failed");
            let text = format!(
                "❌ {}",
                escape_html(&truncate_text(&user_message(&err), ERROR_TEXT_MAX))
            );
            let _ = self.messenger.edit_html(req.status, &text).await;
        }

        // The flow always returns the chat to idle, success and failure alike.
        self.sessions.remove(chat_id).await;
    }

    async fn execute(&self, req: &DownloadRequest) -> Result<()> {
        self.edit_status(req.status, STATUS_PREPARING).await;

        tokio::fs::create_dir_all(&self.cfg.download_dir).await?;
        let fetch = FetchRequest {
            url: req.plan.url.clone(),
            spec: FormatSpec::for_kind(req.plan.kind, req.plan.quality),
            kind: req.plan.kind,
            dest_dir: self.cfg.download_dir.clone(),
            file_stem: file_stem_for(req.chat_id),
        };
        self.edit_status(req.status, STATUS_DOWNLOADING).await;
        let path = self.resolver.fetch(&fetch).await?;

        let delivered = self.deliver(req, &path).await;

        // The local copy is reclaimed whether or not the upload worked.
        if let Err(err) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %err, "could not remove downloaded file");
        }
        delivered?;

        // The transient status message disappears once the media is in the chat.
        let _ = self.messenger.delete_message(req.status).await;
        info!(chat_id = req.chat_id.0, "download delivered");
        Ok(())
    }

    async fn deliver(&self, req: &DownloadRequest, path: &Path) -> Result<()> {
        self.edit_status(req.status, STATUS_UPLOADING).await;

        let total = tokio::fs::metadata(path).await?.len();
        let counter = UploadCounter::new();
        let action = match req.plan.kind {
            MediaKind::Video => ChatAction::UploadVideo,
            MediaKind::Audio => ChatAction::UploadDocument,
        };
        let _ = self.messenger.send_chat_action(req.chat_id, action).await;

        // Progress loop: polls the byte counter and edits the status message,
        // throttled by the tracker. Stopped once the upload call returns.
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
        let messenger = Arc::clone(&self.messenger);
        let status = req.status;
        let counter_for_progress = counter.clone();
        let mut tracker = ProgressTracker::new(self.cfg.progress_edit_interval);
        let progress_task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(250));
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let sent = counter_for_progress.bytes_sent();
                        if let Some(text) = tracker.try_render(Instant::now(), sent, total) {
                            let _ = messenger.edit_html(status, &text).await;
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });

        let upload = match req.plan.kind {
            MediaKind::Audio => {
                self.messenger
                    .send_audio_file(req.chat_id, path, Some(counter.clone()))
                    .await
            }
            MediaKind::Video => {
                self.messenger
                    .send_video_file(req.chat_id, path, Some(counter.clone()))
                    .await
            }
        };

        let _ = stop_tx.send(());
        let _ = progress_task.await;

        upload
    }

    /// Status edits are best-effort: a failed edit must not abort the flow.
    async fn edit_status(&self, status: MessageRef, text: &str) {
        if let Err(err) = self.messenger.edit_html(status, text).await {
            debug!(error = %err, "status edit failed");
        }
    }
}

fn file_stem_for(chat_id: ChatId) -> String {
    // Chat id + wall-clock millis keeps concurrent chats (and repeat runs in
    // the same chat) from colliding in the shared downloads dir.
    format!("{}_{}", chat_id.0, chrono::Utc::now().timestamp_millis())
}

fn user_message(err: &Error) -> String {
    match err {
        Error::Resolver(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageId, Platform};
    use crate::messaging::types::InlineKeyboard;
    use crate::resolver::types::Rendition;
    use crate::session::ChatSession;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    const CHAT: ChatId = ChatId(42);
    const STATUS: MessageRef = MessageRef {
        chat_id: CHAT,
        message_id: MessageId(100),
    };

    fn tmp_dir(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
    }

    #[derive(Default)]
    struct RecordingMessenger {
        events: Mutex<Vec<String>>,
        fail_uploads: bool,
    }

    impl RecordingMessenger {
        fn failing_uploads() -> Self {
            Self {
                fail_uploads: true,
                ..Self::default()
            }
        }

        async fn events(&self) -> Vec<String> {
            self.events.lock().await.clone()
        }

        async fn push(&self, event: String) {
            self.events.lock().await.push(event);
        }
    }

    #[async_trait]
    impl MessagingPort for RecordingMessenger {
        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
            self.push(format!("send:{html}")).await;
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(1),
            })
        }

        async fn edit_html(&self, _msg: MessageRef, html: &str) -> Result<()> {
            self.push(format!("edit:{html}")).await;
            Ok(())
        }

        async fn delete_message(&self, _msg: MessageRef) -> Result<()> {
            self.push("delete".to_string()).await;
            Ok(())
        }

        async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
            self.push("action".to_string()).await;
            Ok(())
        }

        async fn send_inline_keyboard(
            &self,
            chat_id: ChatId,
            text: &str,
            _keyboard: InlineKeyboard,
        ) -> Result<MessageRef> {
            self.push(format!("keyboard:{text}")).await;
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(2),
            })
        }

        async fn edit_inline_keyboard(
            &self,
            _msg: MessageRef,
            text: &str,
            _keyboard: InlineKeyboard,
        ) -> Result<()> {
            self.push(format!("edit-keyboard:{text}")).await;
            Ok(())
        }

        async fn answer_callback_query(
            &self,
            _callback_id: &str,
            _text: Option<&str>,
        ) -> Result<()> {
            self.push("answer".to_string()).await;
            Ok(())
        }

        async fn send_audio_file(
            &self,
            _chat_id: ChatId,
            path: &Path,
            counter: Option<UploadCounter>,
        ) -> Result<()> {
            self.upload("audio", path, counter).await
        }

        async fn send_video_file(
            &self,
            _chat_id: ChatId,
            path: &Path,
            counter: Option<UploadCounter>,
        ) -> Result<()> {
            self.upload("video", path, counter).await
        }
    }

    impl RecordingMessenger {
        async fn upload(
            &self,
            kind: &str,
            path: &Path,
            counter: Option<UploadCounter>,
        ) -> Result<()> {
            if self.fail_uploads {
                return Err(Error::Transport("telegram error: upload refused".to_string()));
            }
            let len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            if let Some(counter) = counter {
                counter.add_bytes(len as usize);
            }
            self.push(format!("upload:{kind}")).await;
            Ok(())
        }
    }

    /// Pretends to download by writing a small file where yt-dlp would.
    struct FileResolver;

    #[async_trait]
    impl MediaResolver for FileResolver {
        async fn list_renditions(&self, _url: &str) -> Result<Vec<Rendition>> {
            Ok(vec![])
        }

        async fn fetch(&self, req: &FetchRequest) -> Result<PathBuf> {
            let ext = match req.kind {
                MediaKind::Video => "mp4",
                MediaKind::Audio => "mp3",
            };
            let path = req.dest_dir.join(format!("{}.{ext}", req.file_stem));
            tokio::fs::write(&path, vec![0u8; 64]).await?;
            Ok(path)
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl MediaResolver for FailingResolver {
        async fn list_renditions(&self, _url: &str) -> Result<Vec<Rendition>> {
            Ok(vec![])
        }

        async fn fetch(&self, _req: &FetchRequest) -> Result<PathBuf> {
            Err(Error::Resolver("Unsupported URL".to_string()))
        }
    }

    fn orchestrator(
        resolver: Arc<dyn MediaResolver>,
        messenger: Arc<RecordingMessenger>,
        sessions: Arc<SessionStore>,
        dir: PathBuf,
    ) -> DownloadOrchestrator {
        DownloadOrchestrator::new(
            resolver,
            messenger,
            sessions,
            OrchestratorConfig {
                download_dir: dir,
                max_concurrent: 2,
                progress_edit_interval: Duration::from_millis(1),
            },
        )
    }

    fn request(kind: MediaKind) -> DownloadRequest {
        DownloadRequest {
            chat_id: CHAT,
            status: STATUS,
            plan: DownloadPlan {
                url: "https://instagram.com/p/abc".to_string(),
                kind,
                quality: None,
            },
        }
    }

    async fn seeded_sessions() -> Arc<SessionStore> {
        let sessions = Arc::new(SessionStore::new());
        sessions.set(CHAT, ChatSession::begin(Platform::Instagram)).await;
        sessions
    }

    #[tokio::test]
    async fn success_walks_statuses_and_cleans_up() {
        let dir = tmp_dir("mgrab-dl-ok");
        let messenger = Arc::new(RecordingMessenger::default());
        let sessions = seeded_sessions().await;
        let orch = orchestrator(Arc::new(FileResolver), messenger.clone(), sessions.clone(), dir.clone());

        orch.run(request(MediaKind::Video)).await;

        let events = messenger.events().await;
        assert_eq!(events[0], format!("edit:{STATUS_PREPARING}"));
        assert_eq!(events[1], format!("edit:{STATUS_DOWNLOADING}"));
        assert!(events.contains(&format!("edit:{STATUS_UPLOADING}")));
        assert!(events.contains(&"upload:video".to_string()));
        assert_eq!(events.last().unwrap(), "delete");

        // Session cleared, downloaded file reclaimed.
        assert!(sessions.get(CHAT).await.is_none());
        let leftovers = std::fs::read_dir(&dir).unwrap().count();
        assert_eq!(leftovers, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn audio_uses_audio_upload() {
        let dir = tmp_dir("mgrab-dl-audio");
        let messenger = Arc::new(RecordingMessenger::default());
        let sessions = seeded_sessions().await;
        let orch = orchestrator(Arc::new(FileResolver), messenger.clone(), sessions, dir.clone());

        orch.run(request(MediaKind::Audio)).await;

        let events = messenger.events().await;
        assert!(events.contains(&"upload:audio".to_string()));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn resolver_failure_reports_error_and_clears_session() {
        let dir = tmp_dir("mgrab-dl-fail");
        let messenger = Arc::new(RecordingMessenger::default());
        let sessions = seeded_sessions().await;
        let orch = orchestrator(Arc::new(FailingResolver), messenger.clone(), sessions.clone(), dir.clone());

        orch.run(request(MediaKind::Video)).await;

        let events = messenger.events().await;
        assert!(events.iter().any(|e| e.starts_with("edit:❌")));
        assert!(events.iter().any(|e| e.contains("Unsupported URL")));
        // No upload, no status deletion on the failure path.
        assert!(!events.contains(&"delete".to_string()));
        assert!(sessions.get(CHAT).await.is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn upload_failure_still_clears_session_and_file() {
        let dir = tmp_dir("mgrab-dl-upfail");
        let messenger = Arc::new(RecordingMessenger::failing_uploads());
        let sessions = seeded_sessions().await;
        let orch = orchestrator(Arc::new(FileResolver), messenger.clone(), sessions.clone(), dir.clone());

        orch.run(request(MediaKind::Video)).await;

        let events = messenger.events().await;
        assert!(events.iter().any(|e| e.starts_with("edit:❌")));
        assert!(sessions.get(CHAT).await.is_none());
        // The fetched file is reclaimed even though the upload failed.
        let leftovers = std::fs::read_dir(&dir).unwrap().count();
        assert_eq!(leftovers, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
