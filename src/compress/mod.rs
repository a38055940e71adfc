//! Compression executor: raster re-encode and external PDF compression.
//!
//! The image variant decodes with the `image` crate, normalizes to RGB so
//! the result is always JPEG-encodable, and re-encodes at the preset's
//! numeric quality. The PDF variant shells out to Ghostscript with a fixed
//! argument template; a missing executable is reported before anything is
//! spawned, and a non-zero exit surfaces the tool's stderr.

use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use tokio::process::Command;

use crate::error::FlowError;

/// Name of the external PDF compression executable looked up on PATH.
pub const PDF_TOOL: &str = "gs";

// ── Quality presets ─────────────────────────────────────────────────

/// One of the three fixed compression strength tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityPreset {
    High,
    #[default]
    Medium,
    Low,
}

impl QualityPreset {
    /// Map a `level_*` callback payload to a preset.
    ///
    /// Unrecognized payloads fall back to Medium.
    pub fn from_callback(data: &str) -> Self {
        match data {
            "level_high" => Self::High,
            "level_low" => Self::Low,
            _ => Self::Medium,
        }
    }

    /// Numeric JPEG encode quality for the image variant.
    pub fn jpeg_quality(self) -> u8 {
        match self {
            Self::High => 90,
            Self::Medium => 60,
            Self::Low => 30,
        }
    }

    /// Ghostscript `-dPDFSETTINGS` profile for the PDF variant.
    pub fn gs_profile(self) -> &'static str {
        match self {
            Self::High => "/printer",
            Self::Medium => "/ebook",
            Self::Low => "/screen",
        }
    }
}

// ── Output naming ───────────────────────────────────────────────────

/// Output name for a re-encoded raster image: `compressed_<stem>.jpg`.
pub fn compressed_image_name(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    format!("compressed_{stem}.jpg")
}

/// Output name for a compressed PDF: `compressed_<name>`.
pub fn compressed_pdf_name(original: &str) -> String {
    format!("compressed_{original}")
}

// ── Image variant ───────────────────────────────────────────────────

/// Re-encode a raster image at the given JPEG quality.
///
/// The source is decoded from memory (any supported format) and converted
/// to RGB before encoding, so grayscale and alpha inputs still produce a
/// valid JPEG. Returns the encoded bytes written to `output`.
pub fn compress_image(bytes: &[u8], quality: u8, output: &Path) -> Result<(), FlowError> {
    let img = image::load_from_memory(bytes).map_err(|e| FlowError::Decode(e.to_string()))?;
    let rgb = img.to_rgb8();

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality)
        .encode_image(&rgb)
        .map_err(|e| FlowError::Compression(e.to_string()))?;

    std::fs::write(output, &encoded).map_err(|e| FlowError::Compression(e.to_string()))?;
    tracing::debug!(
        input_bytes = bytes.len(),
        output_bytes = encoded.len(),
        quality,
        "image re-encoded"
    );
    Ok(())
}

// ── PDF variant ─────────────────────────────────────────────────────

/// Locate the PDF compression executable.
///
/// A configured override path wins; otherwise PATH is searched. Either way
/// an absent tool is a reported condition, not a spawn failure later.
pub fn locate_pdf_tool(override_path: Option<&Path>) -> Result<PathBuf, FlowError> {
    if let Some(path) = override_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(path = %path.display(), "configured PDF tool path does not exist");
        return Err(FlowError::ToolUnavailable);
    }
    which::which(PDF_TOOL).map_err(|_| FlowError::ToolUnavailable)
}

/// The fixed Ghostscript argument template.
///
/// Non-interactive batch mode, pdfwrite device, PDF 1.4 compatibility, and
/// a profile derived from the quality preset.
pub fn pdf_tool_args(input: &Path, output: &Path, preset: QualityPreset) -> Vec<String> {
    vec![
        "-sDEVICE=pdfwrite".into(),
        "-dCompatibilityLevel=1.4".into(),
        format!("-dPDFSETTINGS={}", preset.gs_profile()),
        "-dNOPAUSE".into(),
        "-dQUIET".into(),
        "-dBATCH".into(),
        format!("-sOutputFile={}", output.display()),
        input.display().to_string(),
    ]
}

/// Run the external tool over `input`, writing `output`.
pub async fn compress_pdf(
    tool: &Path,
    input: &Path,
    output: &Path,
    preset: QualityPreset,
) -> Result<(), FlowError> {
    let result = Command::new(tool)
        .args(pdf_tool_args(input, output, preset))
        .output()
        .await
        .map_err(|e| FlowError::Compression(format!("failed to run {}: {e}", tool.display())))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(FlowError::Compression(format!(
            "{} exited with {}: {}",
            tool.display(),
            result.status,
            stderr.trim()
        )));
    }

    if !output.exists() {
        return Err(FlowError::Compression("tool produced no output file".into()));
    }

    tracing::info!(output = %output.display(), profile = preset.gs_profile(), "PDF compressed");
    Ok(())
}
