//! PDF assembly from an ordered image sequence.
//!
//! Each image becomes one page sized to its pixel dimensions (1 px = 1 pt),
//! embedded as a DCTDecode image XObject. Insertion order is page order.
//! RGB JPEG sources are embedded as-is; everything else is normalized to
//! RGB and re-encoded once at high quality.

use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::error::FlowError;

/// JPEG quality used when a source image has to be re-encoded for embedding.
const EMBED_JPEG_QUALITY: u8 = 90;

fn assembly_err(path: &Path, reason: impl ToString) -> FlowError {
    FlowError::Assembly {
        path: Some(path.to_path_buf()),
        reason: reason.to_string(),
    }
}

/// JPEG bytes plus pixel dimensions, ready to embed as a page.
struct PageImage {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
}

fn load_page_image(path: &Path) -> Result<PageImage, FlowError> {
    let bytes = std::fs::read(path).map_err(|e| assembly_err(path, e))?;
    let img = image::load_from_memory(&bytes).map_err(|e| assembly_err(path, e))?;
    let (width, height) = img.dimensions();

    let is_jpeg = image::guess_format(&bytes)
        .map(|f| f == image::ImageFormat::Jpeg)
        .unwrap_or(false);

    // An RGB JPEG can go straight into a DCTDecode stream without a
    // second lossy pass.
    if is_jpeg && matches!(img, DynamicImage::ImageRgb8(_)) {
        return Ok(PageImage { jpeg: bytes, width, height });
    }

    let rgb = img.to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, EMBED_JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| assembly_err(path, e))?;
    Ok(PageImage { jpeg, width, height })
}

/// Assemble the ordered image sequence into a single PDF.
///
/// Fails with [`FlowError::NoInput`] on an empty sequence and with
/// [`FlowError::Assembly`] if any referenced file is unreadable or not a
/// decodable image. No partial document is produced on failure.
pub fn assemble(ordered_paths: &[PathBuf]) -> Result<Vec<u8>, FlowError> {
    if ordered_paths.is_empty() {
        return Err(FlowError::NoInput);
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(ordered_paths.len());

    for path in ordered_paths {
        let page = load_page_image(path)?;
        let (w, h) = (i64::from(page.width), i64::from(page.height));

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w,
                "Height" => h,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            page.jpeg,
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![w.into(), 0.into(), 0.into(), h.into(), 0.into(), 0.into()],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content
                .encode()
                .map_err(|e| assembly_err(path, e))?,
        ));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = i64::try_from(kids.len()).unwrap_or(i64::MAX);
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(|e| FlowError::Assembly {
        path: None,
        reason: e.to_string(),
    })?;

    tracing::info!(pages = ordered_paths.len(), bytes = out.len(), "PDF assembled");
    Ok(out)
}
