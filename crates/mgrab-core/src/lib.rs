//! Core domain + application logic for mgrab, a Telegram bot that fetches
//! video/audio from social-media links.
//!
//! This crate is intentionally framework-agnostic. Telegram and yt-dlp live
//! behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod download;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod progress;
pub mod resolver;
pub mod session;
pub mod users;

pub use errors::{Error, Result};
