//! yt-dlp adapter.
//!
//! Implements the `mgrab-core` MediaResolver port by driving the `yt-dlp`
//! binary as a subprocess: `-j` metadata dumps for rendition listing, a
//! format-selector download for fetching. Argument building lives in core
//! (`YtdlpInvocationBuilder`); this crate only adds process plumbing and
//! error translation.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};
use tracing::{debug, warn};

use mgrab_core::{
    errors::Error,
    resolver::{
        client::{MediaResolver, ResolverInvocation, YtdlpInvocationBuilder},
        types::{FetchRequest, Rendition},
    },
    Result,
};

const STDERR_TAIL_MAX_BYTES: usize = 16 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 200;

/// Patterns in yt-dlp stderr that mean the media itself cannot be fetched,
/// paired with the short reason shown to the user.
const FATAL_ERROR_REASONS: &[(&str, &str)] = &[
    ("Unsupported URL", "This link is not supported."),
    ("is not a valid URL", "That does not look like a valid link."),
    ("Video unavailable", "The media is unavailable."),
    ("Private video", "The media is private."),
    ("This video is private", "The media is private."),
    ("removed by the uploader", "The media was removed by the uploader."),
    ("no longer available", "The media is no longer available."),
    ("blocked it in your country", "The media is blocked in this region."),
    ("geo-restricted", "The media is blocked in this region."),
    ("age-restricted", "The media is age-restricted."),
    ("Sign in to confirm", "The platform is asking for a login; try another link."),
    ("Requested format is not available", "No matching format is available."),
    ("Unable to extract", "Could not extract media from this link."),
    ("HTTP Error 404", "The media was not found (404)."),
    ("HTTP Error 403", "Access to the media was denied (403)."),
];

#[derive(Clone, Debug)]
pub struct YtdlpResolver {
    builder: YtdlpInvocationBuilder,
}

#[derive(Clone, Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    fn push_line(&mut self, line: String) {
        // +1 for the '\n' we join with later.
        self.bytes = self.bytes.saturating_add(line.len() + 1);
        self.lines.push_back(line);

        while self.lines.len() > STDERR_TAIL_MAX_LINES || self.bytes > STDERR_TAIL_MAX_BYTES {
            if let Some(front) = self.lines.pop_front() {
                self.bytes = self.bytes.saturating_sub(front.len() + 1);
            } else {
                break;
            }
        }
    }

    fn snapshot(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// Subset of the `-j` metadata dump we care about.
#[derive(Debug, Deserialize)]
struct VideoMetadata {
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    height: Option<u32>,
    vcodec: Option<String>,
}

impl YtdlpResolver {
    pub fn new(ytdlp_path: PathBuf, socket_timeout: Duration) -> Self {
        Self {
            builder: YtdlpInvocationBuilder::new(ytdlp_path, socket_timeout),
        }
    }
}

#[async_trait]
impl MediaResolver for YtdlpResolver {
    async fn list_renditions(&self, url: &str) -> Result<Vec<Rendition>> {
        let inv = self.builder.list_invocation(url);
        debug!(program = %inv.program.display(), url, "listing renditions");

        let output = Command::new(&inv.program)
            .args(&inv.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Resolver(format!("failed to start yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Resolver(classify_failure(&stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let metadata: VideoMetadata = serde_json::from_str(stdout.trim())
            .map_err(|e| Error::Resolver(format!("unreadable yt-dlp metadata: {e}")))?;

        Ok(renditions_from_formats(&metadata.formats))
    }

    async fn fetch(&self, req: &FetchRequest) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&req.dest_dir).await?;

        let inv = self.builder.fetch_invocation(req);
        debug!(program = %inv.program.display(), url = %req.url, "fetching media");

        let mut child = spawn_piped(&inv)?;

        // Drain both pipes so the child never blocks on a full buffer; the
        // stderr tail is what we report on failure.
        let mut tail = StderrTail::default();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "mgrab_ytdlp::stdout", "{line}");
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tail.push_line(line);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::Resolver(format!("yt-dlp did not exit cleanly: {e}")))?;

        if !status.success() {
            let stderr = tail.snapshot();
            warn!(url = %req.url, %status, "yt-dlp failed");
            return Err(Error::Resolver(classify_failure(&stderr)));
        }

        find_downloaded_file(&req.dest_dir, &req.file_stem)?.ok_or_else(|| {
            Error::Resolver("download finished but no file was produced".to_string())
        })
    }
}

fn spawn_piped(inv: &ResolverInvocation) -> Result<tokio::process::Child> {
    Command::new(&inv.program)
        .args(&inv.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Resolver(format!("failed to start yt-dlp: {e}")))
}

fn renditions_from_formats(formats: &[RawFormat]) -> Vec<Rendition> {
    formats
        .iter()
        .filter(|f| f.vcodec.as_deref().map_or(true, |v| v != "none"))
        .filter_map(|f| f.height.map(|height| Rendition { height }))
        .collect()
}

/// Turn a yt-dlp stderr dump into a short user-facing reason.
fn classify_failure(stderr: &str) -> String {
    for (pattern, reason) in FATAL_ERROR_REASONS {
        if stderr.contains(pattern) {
            return (*reason).to_string();
        }
    }

    // Unrecognized failure: surface the last ERROR line, or the tail end.
    stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .or_else(|| stderr.lines().last())
        .unwrap_or("yt-dlp failed without output")
        .trim()
        .to_string()
}

/// yt-dlp substitutes the extension itself, so the produced file is located
/// by its stem after the run.
fn find_downloaded_file(dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
    let prefix = format!("{stem}.");
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && !name.ends_with(".part") {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}
