use std::time::{Duration, Instant};

/// Number of fixed-width segments in the textual progress bar.
pub const BAR_SEGMENTS: usize = 10;

/// Render the progress bar: filled segments by floor division of the
/// percentage, then the percentage with one decimal place.
///
/// `render_bar(45, 100)` => `"▓▓▓▓░░░░░░ 45.0%"`.
pub fn render_bar(current: u64, total: u64) -> String {
    let percentage = if total == 0 {
        0.0
    } else {
        (current.min(total) as f64 / total as f64) * 100.0
    };
    let filled =
        ((BAR_SEGMENTS as f64 * percentage / 100.0).floor() as usize).min(BAR_SEGMENTS);
    format!(
        "{}{} {percentage:.1}%",
        "▓".repeat(filled),
        "░".repeat(BAR_SEGMENTS - filled)
    )
}

/// Per-download progress reporter.
///
/// Holds the last-update timestamp and the last rendered text explicitly, so
/// the throttling state travels with the download instead of hiding in some
/// shared callback. At most one render per `min_interval` window, and
/// renders identical to the previous one are suppressed entirely.
#[derive(Debug)]
pub struct ProgressTracker {
    min_interval: Duration,
    last_update: Option<Instant>,
    last_text: Option<String>,
}

impl ProgressTracker {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_update: None,
            last_text: None,
        }
    }

    /// Render the upload status for `current/total` bytes if an update is
    /// due at `now`; `None` means "skip this tick".
    pub fn try_render(&mut self, now: Instant, current: u64, total: u64) -> Option<String> {
        if total == 0 {
            return None;
        }
        if let Some(last) = self.last_update {
            if now.duration_since(last) < self.min_interval {
                return None;
            }
        }

        let text = format!("Uploading...\n{}", render_bar(current, total));
        if self.last_text.as_deref() == Some(text.as_str()) {
            return None;
        }

        self.last_update = Some(now);
        self.last_text = Some(text.clone());
        Some(text)
    }
}
