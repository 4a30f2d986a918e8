use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;

use crate::{
    domain::MediaKind,
    resolver::types::{FetchRequest, Rendition},
    Result,
};

/// Hexagonal port for the external media resolver.
///
/// Both calls are long-latency and blocking from the worker's perspective;
/// only workers (never the dispatch path) may call `fetch`.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// List the renditions available for a URL.
    async fn list_renditions(&self, url: &str) -> Result<Vec<Rendition>>;

    /// Fetch the media described by the request to local storage and return
    /// the path of the produced file.
    async fn fetch(&self, req: &FetchRequest) -> Result<PathBuf>;
}

/// A fully built subprocess invocation (program + args).
#[derive(Clone, Debug)]
pub struct ResolverInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Builds yt-dlp invocations from resolver requests.
///
/// Kept in core (next to the request types) so the argument contract is
/// unit-testable without spawning anything; the adapter crate only adds
/// process plumbing.
#[derive(Clone, Debug)]
pub struct YtdlpInvocationBuilder {
    pub ytdlp_path: PathBuf,
    pub socket_timeout: Duration,
}

impl YtdlpInvocationBuilder {
    pub fn new(ytdlp_path: PathBuf, socket_timeout: Duration) -> Self {
        Self {
            ytdlp_path,
            socket_timeout,
        }
    }

    /// `yt-dlp -j` metadata dump for a single item.
    pub fn list_invocation(&self, url: &str) -> ResolverInvocation {
        ResolverInvocation {
            program: self.ytdlp_path.clone(),
            args: vec![
                "-j".to_string(),
                "--no-playlist".to_string(),
                "--no-warnings".to_string(),
                url.to_string(),
            ],
        }
    }

    /// Download invocation. yt-dlp substitutes the extension itself, so the
    /// output template keeps `%(ext)s`; audio is extracted to mp3, video is
    /// merged into mp4. Only this phase carries the socket timeout.
    pub fn fetch_invocation(&self, req: &FetchRequest) -> ResolverInvocation {
        let template = req
            .dest_dir
            .join(format!("{}.%(ext)s", req.file_stem))
            .to_string_lossy()
            .into_owned();

        let mut args = vec![
            "-f".to_string(),
            req.spec.as_str().to_string(),
            "-o".to_string(),
            template,
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout.as_secs().to_string(),
        ];
        match req.kind {
            MediaKind::Audio => {
                args.push("-x".to_string());
                args.push("--audio-format".to_string());
                args.push("mp3".to_string());
            }
            MediaKind::Video => {
                args.push("--merge-output-format".to_string());
                args.push("mp4".to_string());
            }
        }
        args.push(req.url.clone());

        ResolverInvocation {
            program: self.ytdlp_path.clone(),
            args,
        }
    }
}
