use std::path::PathBuf;

use crate::domain::MediaKind;

/// Lowest resolution worth offering to the user.
pub const MIN_HEIGHT: u32 = 360;

/// One encoded variant of a media resource, as reported by the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rendition {
    /// Vertical resolution in pixels.
    pub height: u32,
}

/// Heights worth presenting as quality buttons: at least [`MIN_HEIGHT`],
/// deduplicated, highest first.
pub fn eligible_heights(renditions: &[Rendition]) -> Vec<u32> {
    let mut heights: Vec<u32> = renditions
        .iter()
        .map(|r| r.height)
        .filter(|h| *h >= MIN_HEIGHT)
        .collect();
    heights.sort_unstable_by(|a, b| b.cmp(a));
    heights.dedup();
    heights
}

/// A yt-dlp format selector expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatSpec(String);

impl FormatSpec {
    /// Best available audio-only stream, falling back to whatever is best.
    pub fn audio_best() -> Self {
        Self("bestaudio/best".to_string())
    }

    /// Best video+audio pair, optionally capped at a resolution ceiling.
    pub fn video_best(ceiling: Option<u32>) -> Self {
        match ceiling {
            Some(h) => Self(format!(
                "bestvideo[height<={h}]+bestaudio/best[height<={h}]"
            )),
            None => Self("bestvideo+bestaudio/best".to_string()),
        }
    }

    pub fn for_kind(kind: MediaKind, ceiling: Option<u32>) -> Self {
        match kind {
            MediaKind::Audio => Self::audio_best(),
            MediaKind::Video => Self::video_best(ceiling),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One fetch job for the resolver.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub url: String,
    pub spec: FormatSpec,
    pub kind: MediaKind,
    /// Directory the file lands in; created by the caller if absent.
    pub dest_dir: PathBuf,
    /// File name without extension. Must be unique across concurrent chats;
    /// the orchestrator embeds the chat id and a timestamp.
    pub file_stem: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_spec_asks_for_audio_only() {
        assert_eq!(FormatSpec::audio_best().as_str(), "bestaudio/best");
        assert_eq!(
            FormatSpec::for_kind(MediaKind::Audio, Some(720)).as_str(),
            "bestaudio/best"
        );
    }

    #[test]
    fn video_spec_caps_at_ceiling() {
        assert_eq!(
            FormatSpec::video_best(Some(720)).as_str(),
            "bestvideo[height<=720]+bestaudio/best[height<=720]"
        );
        assert_eq!(
            FormatSpec::video_best(None).as_str(),
            "bestvideo+bestaudio/best"
        );
    }

    #[test]
    fn eligible_heights_filters_dedups_and_sorts() {
        let renditions = [
            Rendition { height: 240 },
            Rendition { height: 360 },
            Rendition { height: 720 },
            Rendition { height: 360 },
            Rendition { height: 1080 },
            Rendition { height: 144 },
        ];
        assert_eq!(eligible_heights(&renditions), vec![1080, 720, 360]);
    }

    #[test]
    fn no_eligible_heights_below_minimum() {
        let renditions = [Rendition { height: 144 }, Rendition { height: 240 }];
        assert!(eligible_heights(&renditions).is_empty());
    }
}
