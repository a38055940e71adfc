//! PaperPress: a Telegram bot for everyday PDF chores.
//!
//! Two flows, driven entirely through chat:
//!
//! - **Convert**: collect a sequence of photos and merge them into a
//!   single PDF, one page per photo, in the order they arrived.
//! - **Compress**: re-encode an image at a chosen quality tier, or run a
//!   PDF through the external Ghostscript toolchain with a matching
//!   profile.
//!
//! ## Architecture
//!
//! ```text
//! Telegram ── getUpdates ──▶ TelegramClient ── Inbound ──▶ Engine
//!     ▲                                                      │
//!     └──────────── Outbound (text / menus / documents) ◀────┘
//! ```
//!
//! The listener downloads photo/document payloads before events reach the
//! engine, so the conversation state machine is transport-agnostic and
//! testable through the [`channels::Outbound`] seam.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod channels;
pub mod compress;
pub mod config;
pub mod error;
pub mod flow;
pub mod pdf;
pub mod storage;

pub use channels::{BotCommand, Inbound, InboundKind, InlineButton, Outbound, TelegramClient};
pub use compress::QualityPreset;
pub use config::Config;
pub use error::FlowError;
pub use flow::Engine;
pub use storage::ScratchStore;
