use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Outgoing "chat action" (typing indicator, upload indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
    UploadVideo,
    UploadDocument,
}

/// Inline keyboard (buttons) used for the dialogue menus.
#[derive(Clone, Debug)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }

    /// Convenience for "one button per row" menus built from
    /// (label, callback data) pairs.
    pub fn from_pairs<L, D>(pairs: impl IntoIterator<Item = (L, D)>) -> Self
    where
        L: Into<String>,
        D: Into<String>,
    {
        let buttons = pairs
            .into_iter()
            .map(|(label, data)| InlineButton {
                label: label.into(),
                callback_data: data.into(),
            })
            .collect();
        Self { buttons }
    }
}

/// Shared byte counter fed by the transport while a file upload streams out.
///
/// The orchestrator polls it to drive the progress bar; the adapter adds
/// bytes from its reader wrapper. Atomic, so both sides can touch it without
/// further locking.
#[derive(Clone, Debug, Default)]
pub struct UploadCounter {
    bytes_sent: Arc<AtomicU64>,
}

impl UploadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_counter_accumulates() {
        let counter = UploadCounter::new();
        let clone = counter.clone();
        clone.add_bytes(512);
        clone.add_bytes(512);
        assert_eq!(counter.bytes_sent(), 1024);
    }

    #[test]
    fn keyboard_from_pairs_keeps_order() {
        let kb = InlineKeyboard::from_pairs([("Video", "fmt:video"), ("Audio", "fmt:audio")]);
        assert_eq!(kb.buttons.len(), 2);
        assert_eq!(kb.buttons[0].label, "Video");
        assert_eq!(kb.buttons[1].callback_data, "fmt:audio");
    }
}
