//! End-to-end conversation scenarios.
//!
//! Drives the engine with typed events through a recording mock transport,
//! then inspects what would have reached the user and what was left on
//! disk.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use paperpress_bot::channels::{BotCommand, Inbound, InboundKind, InlineButton, Outbound};
use paperpress_bot::flow::Engine;
use paperpress_bot::storage::ScratchStore;
use tempfile::TempDir;

const CHAT: i64 = 4242;

// ── Recording mock transport ───────────────────────────────────────

#[derive(Debug, Clone)]
#[allow(dead_code)]
enum Sent {
    Text {
        chat_id: i64,
        text: String,
    },
    Menu {
        chat_id: i64,
        buttons: Vec<String>,
    },
    Edit {
        text: String,
    },
    EditMenu {
        text: String,
        buttons: Vec<String>,
    },
    CallbackAnswer {
        notice: Option<String>,
    },
    Document {
        chat_id: i64,
        file_name: String,
        bytes: Vec<u8>,
        caption: Option<String>,
    },
}

#[derive(Default)]
struct RecordingOutbound {
    sent: Mutex<Vec<Sent>>,
    next_message_id: Mutex<i64>,
}

impl RecordingOutbound {
    fn push(&self, item: Sent) {
        self.sent.lock().unwrap().push(item);
    }

    fn all(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn documents(&self) -> Vec<(String, Vec<u8>, Option<String>)> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Document {
                    file_name,
                    bytes,
                    caption,
                    ..
                } => Some((file_name, bytes, caption)),
                _ => None,
            })
            .collect()
    }

    fn texts(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn callback_notices(&self) -> Vec<Option<String>> {
        self.all()
            .into_iter()
            .filter_map(|s| match s {
                Sent::CallbackAnswer { notice } => Some(notice),
                _ => None,
            })
            .collect()
    }

    fn button_rows(buttons: &[Vec<InlineButton>]) -> Vec<String> {
        buttons
            .iter()
            .flatten()
            .map(|b| b.callback_data.clone())
            .collect()
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.push(Sent::Text {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_menu(
        &self,
        chat_id: i64,
        _text: &str,
        buttons: Vec<Vec<InlineButton>>,
    ) -> anyhow::Result<i64> {
        self.push(Sent::Menu {
            chat_id,
            buttons: Self::button_rows(&buttons),
        });
        let mut id = self.next_message_id.lock().unwrap();
        *id += 1;
        Ok(*id)
    }

    async fn edit_message_text(
        &self,
        _chat_id: i64,
        _message_id: i64,
        text: &str,
    ) -> anyhow::Result<()> {
        self.push(Sent::Edit {
            text: text.to_string(),
        });
        Ok(())
    }

    async fn edit_menu(
        &self,
        _chat_id: i64,
        _message_id: i64,
        text: &str,
        buttons: Vec<Vec<InlineButton>>,
    ) -> anyhow::Result<()> {
        self.push(Sent::EditMenu {
            text: text.to_string(),
            buttons: Self::button_rows(&buttons),
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        _callback_id: &str,
        text: Option<&str>,
    ) -> anyhow::Result<()> {
        self.push(Sent::CallbackAnswer {
            notice: text.map(String::from),
        });
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: Option<&str>,
    ) -> anyhow::Result<()> {
        // Capture the bytes now: scratch is torn down right after sending.
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        self.push(Sent::Document {
            chat_id,
            file_name,
            bytes,
            caption: caption.map(String::from),
        });
        Ok(())
    }
}

// ── Harness ────────────────────────────────────────────────────────

struct Harness {
    _tmp: TempDir,
    outbound: Arc<RecordingOutbound>,
    store: ScratchStore,
    engine: Engine,
}

impl Harness {
    fn new(pdf_tool: Option<PathBuf>) -> Self {
        let tmp = TempDir::new().unwrap();
        let outbound = Arc::new(RecordingOutbound::default());
        let store = ScratchStore::new(tmp.path());
        let engine = Engine::new(outbound.clone(), store.clone(), pdf_tool);
        Self {
            _tmp: tmp,
            outbound,
            store,
            engine,
        }
    }

    fn scratch_dir(&self) -> PathBuf {
        self.store.dir_for(CHAT)
    }

    async fn send(&mut self, kind: InboundKind) {
        self.engine.handle(Inbound::new(CHAT, kind)).await.unwrap();
    }

    async fn command(&mut self, cmd: BotCommand) {
        self.send(InboundKind::Command(cmd)).await;
    }

    async fn press(&mut self, data: &str) {
        self.send(InboundKind::Callback {
            callback_id: "cb".into(),
            message_id: 1,
            data: data.into(),
        })
        .await;
    }

    async fn photo(&mut self, bytes: Vec<u8>) {
        self.send(InboundKind::Photo { bytes }).await;
    }

    async fn document(&mut self, bytes: Vec<u8>, file_name: &str) {
        self.send(InboundKind::Document {
            bytes,
            file_name: file_name.into(),
        })
        .await;
    }
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(
        width,
        height,
        image::Rgb([40, 90, 160]),
    ));
    let mut buf = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut buf),
        image::ImageFormat::Png,
    )
    .unwrap();
    buf
}

fn page_widths(pdf: &[u8]) -> Vec<i64> {
    let doc = lopdf::Document::load_mem(pdf).unwrap();
    let mut widths = Vec::new();
    for (_, page_id) in doc.get_pages() {
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        widths.push(media_box[2].as_i64().unwrap());
    }
    widths
}

// ── Convert flow ───────────────────────────────────────────────────

#[tokio::test]
async fn convert_three_images_yields_three_pages_in_send_order() {
    let mut h = Harness::new(None);

    h.command(BotCommand::Start).await;
    h.press("convert").await;
    h.photo(png_bytes(30, 40)).await;
    h.photo(png_bytes(50, 40)).await;
    h.photo(png_bytes(70, 40)).await;
    h.command(BotCommand::Done).await;

    let docs = h.outbound.documents();
    assert_eq!(docs.len(), 1, "exactly one PDF should be delivered");
    let (file_name, bytes, caption) = &docs[0];
    assert!(file_name.ends_with(".pdf"));
    assert_eq!(caption.as_deref(), Some("📄 Here is your PDF!"));
    assert_eq!(page_widths(bytes), vec![30, 50, 70]);

    assert!(!h.scratch_dir().exists(), "scratch must be released");
}

#[tokio::test]
async fn done_without_images_reports_no_input_and_sends_nothing() {
    let mut h = Harness::new(None);

    h.command(BotCommand::Start).await;
    h.press("convert").await;
    h.command(BotCommand::Done).await;

    assert!(h.outbound.documents().is_empty());
    let texts = h.outbound.texts();
    assert!(
        texts.iter().any(|t| t.contains("no images")),
        "expected a NoInput notice, got {texts:?}"
    );
    assert!(!h.scratch_dir().exists());
}

#[tokio::test]
async fn cancel_mid_collection_discards_everything() {
    let mut h = Harness::new(None);

    h.command(BotCommand::Start).await;
    h.press("convert").await;
    h.photo(png_bytes(20, 20)).await;
    h.command(BotCommand::Cancel).await;

    assert!(h.outbound.documents().is_empty());
    assert!(h.outbound.texts().iter().any(|t| t.contains("Cancelled")));
    assert!(!h.scratch_dir().exists());
}

#[tokio::test]
async fn non_image_message_keeps_count_and_state() {
    let mut h = Harness::new(None);

    h.command(BotCommand::Start).await;
    h.press("convert").await;
    h.photo(png_bytes(20, 20)).await;
    h.send(InboundKind::Text).await;
    h.send(InboundKind::Unsupported).await;
    h.photo(png_bytes(20, 20)).await;

    let texts = h.outbound.texts();
    assert!(texts.iter().any(|t| t.contains("Image 1 saved")));
    assert!(
        texts.iter().any(|t| t.contains("Image 2 saved")),
        "count must not advance on non-image messages: {texts:?}"
    );

    // Still collecting: /done now produces a 2-page PDF.
    h.command(BotCommand::Done).await;
    let docs = h.outbound.documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(page_widths(&docs[0].1).len(), 2);
}

#[tokio::test]
async fn document_during_collection_is_a_reprompt_not_a_page() {
    let mut h = Harness::new(None);

    h.command(BotCommand::Start).await;
    h.press("convert").await;
    h.document(b"%PDF-1.4 not an image".to_vec(), "stray.pdf").await;
    h.photo(png_bytes(25, 25)).await;
    h.command(BotCommand::Done).await;

    let docs = h.outbound.documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(page_widths(&docs[0].1).len(), 1, "the stray document must not become a page");
}

#[tokio::test]
async fn start_resets_an_in_flight_session() {
    let mut h = Harness::new(None);

    h.command(BotCommand::Start).await;
    h.press("convert").await;
    h.photo(png_bytes(20, 20)).await;

    h.command(BotCommand::Start).await;
    h.press("convert").await;
    h.photo(png_bytes(20, 20)).await;

    let texts = h.outbound.texts();
    let first_acks = texts.iter().filter(|t| t.contains("Image 1 saved")).count();
    assert_eq!(first_acks, 2, "restart must reset the image count: {texts:?}");
}

// ── Compress flow ──────────────────────────────────────────────────

#[tokio::test]
async fn compress_image_delivers_a_jpeg_artifact() {
    let mut h = Harness::new(None);

    h.command(BotCommand::Start).await;
    h.press("compression").await;
    h.press("compression_image").await;
    h.press("level_low").await;
    h.photo(png_bytes(64, 64)).await;

    let docs = h.outbound.documents();
    assert_eq!(docs.len(), 1);
    let (file_name, bytes, caption) = &docs[0];
    assert!(file_name.starts_with("compressed_photo_"));
    assert!(file_name.ends_with(".jpg"));
    assert_eq!(&bytes[..2], &[0xFF, 0xD8], "artifact must be a JPEG");
    assert_eq!(caption.as_deref(), Some("✅ Here is your compressed image."));

    assert!(!h.scratch_dir().exists());
}

#[tokio::test]
async fn compress_image_accepts_a_document_upload() {
    let mut h = Harness::new(None);

    h.command(BotCommand::Start).await;
    h.press("compression").await;
    h.press("compression_image").await;
    h.press("level_high").await;
    h.document(png_bytes(32, 32), "scan.png").await;

    let docs = h.outbound.documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].0, "compressed_scan.jpg");
}

#[tokio::test]
async fn unknown_level_selector_defaults_to_medium() {
    let input = png_bytes(48, 48);

    let mut medium = Harness::new(None);
    medium.command(BotCommand::Start).await;
    medium.press("compression").await;
    medium.press("compression_image").await;
    medium.press("level_medium").await;
    medium.document(input.clone(), "a.png").await;

    let mut unknown = Harness::new(None);
    unknown.command(BotCommand::Start).await;
    unknown.press("compression").await;
    unknown.press("compression_image").await;
    unknown.press("level_ultra").await;
    unknown.document(input, "a.png").await;

    let medium_bytes = &medium.outbound.documents()[0].1;
    let unknown_bytes = &unknown.outbound.documents()[0].1;
    assert_eq!(medium_bytes, unknown_bytes);
}

#[tokio::test]
async fn missing_pdf_tool_aborts_with_notice_and_cleanup() {
    let mut h = Harness::new(Some(PathBuf::from("/nonexistent/bin/gs")));

    h.command(BotCommand::Start).await;
    h.press("compression").await;
    h.press("compression_pdf").await;
    h.press("level_medium").await;
    h.document(b"%PDF-1.4\n%%EOF".to_vec(), "report.pdf").await;

    assert!(h.outbound.documents().is_empty(), "no partial artifact");
    let texts = h.outbound.texts();
    assert!(
        texts.iter().any(|t| t.contains("not installed")),
        "expected a tool-unavailable notice, got {texts:?}"
    );
    assert!(!h.scratch_dir().exists());
}

#[tokio::test]
async fn undecodable_image_reports_decode_error_and_cleans_up() {
    let mut h = Harness::new(None);

    h.command(BotCommand::Start).await;
    h.press("compression").await;
    h.press("compression_image").await;
    h.press("level_medium").await;
    h.document(b"this is not an image".to_vec(), "junk.bin").await;

    assert!(h.outbound.documents().is_empty());
    let texts = h.outbound.texts();
    assert!(texts.iter().any(|t| t.contains("could not read")));
    assert!(!h.scratch_dir().exists());
}

// ── Menu robustness ────────────────────────────────────────────────

#[tokio::test]
async fn stale_callback_is_acknowledged_and_ignored() {
    let mut h = Harness::new(None);

    h.command(BotCommand::Start).await;
    h.press("level_high").await;

    let notices = h.outbound.callback_notices();
    assert!(
        notices.iter().any(|n| n.as_deref().is_some_and(|t| t.contains("no longer active"))),
        "stale press must be answered: {notices:?}"
    );

    // The flow is still usable afterwards.
    h.press("convert").await;
    h.photo(png_bytes(20, 20)).await;
    assert!(h.outbound.texts().iter().any(|t| t.contains("Image 1 saved")));
}

#[tokio::test]
async fn events_without_a_session_prompt_for_start() {
    let mut h = Harness::new(None);

    h.photo(png_bytes(20, 20)).await;
    h.send(InboundKind::Text).await;
    h.command(BotCommand::Done).await;
    h.command(BotCommand::Cancel).await;

    assert!(h.outbound.documents().is_empty());
    assert!(h
        .outbound
        .texts()
        .iter()
        .all(|t| t.contains("/start")));
}

#[tokio::test]
async fn wrong_type_while_choosing_level_reprompts() {
    let mut h = Harness::new(None);

    h.command(BotCommand::Start).await;
    h.press("compression").await;
    h.press("compression_image").await;
    h.photo(png_bytes(20, 20)).await;

    assert!(h.outbound.documents().is_empty());
    assert!(h
        .outbound
        .texts()
        .iter()
        .any(|t| t.contains("buttons")));

    // The menu selection still works after the stray photo.
    h.press("level_low").await;
    h.photo(png_bytes(20, 20)).await;
    assert_eq!(h.outbound.documents().len(), 1);
}
