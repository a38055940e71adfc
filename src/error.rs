//! Error taxonomy for the conversation flows.
//!
//! Every variant here terminates the session it occurred in: the user gets
//! exactly one plain-language message, scratch storage is released first,
//! and no partial artifact is ever delivered. Wrong-message-type situations
//! are not errors; the receiving states re-prompt and stay put.

use std::path::PathBuf;
use thiserror::Error;

/// A failure that ends a convert-or-compress flow.
#[derive(Debug, Error)]
pub enum FlowError {
    /// `/done` was sent before any image arrived.
    #[error("no images were received, nothing to convert")]
    NoInput,

    /// The PDF could not be built from the collected images.
    #[error("could not build the PDF ({reason})")]
    Assembly { path: Option<PathBuf>, reason: String },

    /// The input raster image could not be decoded.
    #[error("could not read that image ({0})")]
    Decode(String),

    /// The external PDF compression executable is not installed.
    #[error("the PDF compression tool is not installed on this server")]
    ToolUnavailable,

    /// The compression step itself failed (external tool exit or encode).
    #[error("compression failed ({0})")]
    Compression(String),
}

impl FlowError {
    /// The single chat message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        format!("⚠️ {self}.")
    }
}
