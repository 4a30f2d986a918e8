use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed process configuration, sourced from environment variables at
/// startup (an optional `.env` file is honored without overriding the
/// real environment).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    /// Operator-only chat/channel that receives "new user" notices.
    pub log_channel_id: i64,

    // Webhook
    pub webhook_host: String,
    pub port: u16,

    // yt-dlp
    pub ytdlp_path: PathBuf,
    pub fetch_socket_timeout: Duration,

    // Downloads
    pub download_dir: PathBuf,
    pub max_concurrent_downloads: usize,

    // Sessions
    pub session_ttl: Duration,
    pub session_sweep_interval: Duration,

    // Progress reporting
    pub progress_edit_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let log_channel_id = env_i64("LOG_CHANNEL_ID").ok_or_else(|| {
            Error::Config("LOG_CHANNEL_ID environment variable is required".to_string())
        })?;

        let webhook_host = env_str("WEBHOOK_HOST")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("WEBHOOK_HOST environment variable is required".to_string())
            })?;
        let port = env_u16("PORT").unwrap_or(8443);

        let ytdlp_path = env_path("YTDLP_PATH")
            .or_else(|| which_in_path("yt-dlp"))
            .unwrap_or_else(|| PathBuf::from("/usr/local/bin/yt-dlp"));
        let fetch_socket_timeout =
            Duration::from_secs(env_u64("FETCH_SOCKET_TIMEOUT_SECS").unwrap_or(30));

        let download_dir = PathBuf::from(
            env_str("DOWNLOAD_DIR").unwrap_or("/tmp/mgrab-downloads".to_string()),
        );
        fs::create_dir_all(&download_dir)?;

        let max_concurrent_downloads =
            env_usize("MAX_CONCURRENT_DOWNLOADS").unwrap_or(4).max(1);

        let session_ttl = Duration::from_secs(env_u64("SESSION_TTL_SECS").unwrap_or(1800));
        let session_sweep_interval =
            Duration::from_secs(env_u64("SESSION_SWEEP_INTERVAL_SECS").unwrap_or(60));

        let progress_edit_interval =
            Duration::from_millis(env_u64("PROGRESS_EDIT_INTERVAL_MS").unwrap_or(1500));

        Ok(Self {
            telegram_bot_token,
            log_channel_id,
            webhook_host,
            port,
            ytdlp_path,
            fetch_socket_timeout,
            download_dir,
            max_concurrent_downloads,
            session_ttl,
            session_sweep_interval,
            progress_edit_interval,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u16(key: &str) -> Option<u16> {
    env_str(key).and_then(|s| s.trim().parse::<u16>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    for dir in env::split_paths(&path) {
        let candidate = dir.join(binary);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable_file(p: &Path) -> bool {
    if !p.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(md) = fs::metadata(p) {
            return (md.permissions().mode() & 0o111) != 0;
        }
    }
    true
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
