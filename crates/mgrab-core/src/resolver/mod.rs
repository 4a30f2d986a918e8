//! Media resolver port.
//!
//! The bot never extracts media itself; it asks a resolver (yt-dlp in the
//! shipped adapter) to list renditions and to fetch a file to local storage.

pub mod client;
pub mod types;
