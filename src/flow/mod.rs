//! Conversation state machine.
//!
//! Drives a chat through one of two mutually exclusive flows:
//!
//! ```text
//! Idle ── /start ──▶ ChoosingAction ─┬─ convert ────▶ ReceivingImages ── /done ──▶ Idle
//!                                    └─ compression ▶ ChoosingCompressionTarget
//!                                                        │ image / pdf
//!                                                        ▼
//!                                                    ChoosingLevel
//!                                                        │ high / medium / low
//!                                                        ▼
//!                                                ReceivingFileToCompress ── file ──▶ Idle
//! ```
//!
//! `/cancel` aborts from anywhere. A wrong message type in a receiving
//! state re-prompts and stays put. Every terminal transition (success,
//! cancel, or error) releases the chat's scratch directory before the
//! user hears about the outcome.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use rand::Rng;

use crate::channels::traits::{BotCommand, Inbound, InboundKind, InlineButton, Outbound};
use crate::compress::{self, QualityPreset};
use crate::error::FlowError;
use crate::pdf;
use crate::storage::ScratchStore;

const MSG_SEND_IMAGES: &str =
    "📷 Please send me *all the images you want in the PDF*. Send /done when finished.";
const MSG_CHOOSE_TARGET: &str = "🔧 Choose what to compress:";
const MSG_SEND_FILE: &str = "📂 Now send me the file or photo to compress.";
const MSG_USE_BUTTONS: &str = "Please use the buttons above, or send /cancel.";
const MSG_NOT_STARTED: &str = "Send /start to begin.";
const MSG_STALE_MENU: &str = "That menu is no longer active";
const MSG_CANCELLED: &str = "🚫 Cancelled. Send /start to begin again.";
const MSG_NOTHING_TO_CANCEL: &str = "Nothing to cancel. Send /start to begin.";
const MSG_NOTHING_TO_FINISH: &str = "Nothing to finish here. Send /start to begin.";

/// Which flow the session is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Convert,
    CompressImage,
    CompressPdf,
}

/// Position in the conversation. Idle chats have no session at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatState {
    ChoosingAction,
    ReceivingImages,
    ChoosingCompressionTarget,
    ChoosingLevel,
    ReceivingFileToCompress,
}

/// Per-chat flow state, created on `/start` and destroyed on every
/// terminal transition.
struct Session {
    state: ChatState,
    mode: Option<Mode>,
    quality: QualityPreset,
    images: Vec<PathBuf>,
    scratch: PathBuf,
}

impl Session {
    fn new(scratch: PathBuf) -> Self {
        Self {
            state: ChatState::ChoosingAction,
            mode: None,
            quality: QualityPreset::default(),
            images: Vec::new(),
            scratch,
        }
    }
}

fn pdf_file_name(username: Option<&str>) -> String {
    let owner = username.unwrap_or("document");
    format!("{owner}-{}.pdf", rand::thread_rng().gen_range(10..100))
}

fn photo_file_name() -> String {
    format!("photo_{}.jpg", rand::thread_rng().gen_range(1000..10000))
}

/// The conversation engine: one session per chat, events handled to
/// completion in arrival order.
pub struct Engine {
    outbound: Arc<dyn Outbound>,
    scratch: ScratchStore,
    pdf_tool: Option<PathBuf>,
    sessions: HashMap<i64, Session>,
}

impl Engine {
    pub fn new(
        outbound: Arc<dyn Outbound>,
        scratch: ScratchStore,
        pdf_tool: Option<PathBuf>,
    ) -> Self {
        Self {
            outbound,
            scratch,
            pdf_tool,
            sessions: HashMap::new(),
        }
    }

    /// Handle one inbound event to completion.
    ///
    /// Flow failures are reported to the user in-line; the returned error
    /// only covers the transport itself.
    pub async fn handle(&mut self, event: Inbound) -> anyhow::Result<()> {
        tracing::debug!(event_id = %event.id, chat_id = event.chat_id, "handling event");
        let chat_id = event.chat_id;
        match event.kind {
            InboundKind::Command(BotCommand::Start) => {
                self.on_start(chat_id, event.first_name.as_deref()).await
            }
            InboundKind::Command(BotCommand::Cancel) => self.on_cancel(chat_id).await,
            InboundKind::Command(BotCommand::Done) => {
                self.on_done(chat_id, event.username.as_deref()).await
            }
            InboundKind::Callback {
                callback_id,
                message_id,
                data,
            } => {
                self.on_callback(chat_id, &callback_id, message_id, &data)
                    .await
            }
            InboundKind::Photo { bytes } => self.on_photo(chat_id, bytes).await,
            InboundKind::Document { bytes, file_name } => {
                self.on_document(chat_id, bytes, &file_name).await
            }
            InboundKind::Text | InboundKind::Unsupported => self.on_other(chat_id).await,
        }
    }

    // ── Entry and exit ──────────────────────────────────────────────

    async fn on_start(&mut self, chat_id: i64, first_name: Option<&str>) -> anyhow::Result<()> {
        // /start always resets: abandon any in-flight flow first.
        if self.sessions.contains_key(&chat_id) {
            self.teardown(chat_id);
        }

        let scratch = match self.scratch.acquire(chat_id) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::error!(chat_id, "failed to create scratch dir: {e}");
                return self
                    .outbound
                    .send_text(chat_id, "⚠️ Internal storage error, please try again later.")
                    .await;
            }
        };
        self.sessions.insert(chat_id, Session::new(scratch));

        let name = first_name.unwrap_or("there");
        let buttons = vec![
            vec![InlineButton::new("📄 Convert Images to PDF", "convert")],
            vec![InlineButton::new("🗜️ Compress File", "compression")],
        ];
        self.outbound
            .send_menu(
                chat_id,
                &format!("👋 Welcome, *{name}*! What would you like to do?"),
                buttons,
            )
            .await?;
        Ok(())
    }

    async fn on_cancel(&mut self, chat_id: i64) -> anyhow::Result<()> {
        if self.sessions.contains_key(&chat_id) {
            self.teardown(chat_id);
            self.outbound.send_text(chat_id, MSG_CANCELLED).await
        } else {
            self.outbound.send_text(chat_id, MSG_NOTHING_TO_CANCEL).await
        }
    }

    /// Drop the session and release its scratch directory. Runs on every
    /// terminal transition, error paths included.
    fn teardown(&mut self, chat_id: i64) {
        self.sessions.remove(&chat_id);
        if let Err(e) = self.scratch.release(chat_id) {
            tracing::warn!(chat_id, "failed to remove scratch dir: {e}");
        }
    }

    // ── Button presses ──────────────────────────────────────────────

    async fn on_callback(
        &mut self,
        chat_id: i64,
        callback_id: &str,
        message_id: i64,
        data: &str,
    ) -> anyhow::Result<()> {
        let Some(session) = self.sessions.get_mut(&chat_id) else {
            return self
                .outbound
                .answer_callback(callback_id, Some(MSG_NOT_STARTED))
                .await;
        };

        match (session.state, data) {
            (ChatState::ChoosingAction, "convert") => {
                session.mode = Some(Mode::Convert);
                session.images.clear();
                session.state = ChatState::ReceivingImages;
                self.outbound.answer_callback(callback_id, None).await?;
                self.outbound
                    .edit_message_text(chat_id, message_id, MSG_SEND_IMAGES)
                    .await
            }
            (ChatState::ChoosingAction, "compression") => {
                session.state = ChatState::ChoosingCompressionTarget;
                self.outbound.answer_callback(callback_id, None).await?;
                let buttons = vec![vec![
                    InlineButton::new("📷 Image", "compression_image"),
                    InlineButton::new("📄 PDF", "compression_pdf"),
                ]];
                self.outbound
                    .edit_menu(chat_id, message_id, MSG_CHOOSE_TARGET, buttons)
                    .await
            }
            (ChatState::ChoosingCompressionTarget, "compression_image" | "compression_pdf") => {
                let mode = if data == "compression_image" {
                    Mode::CompressImage
                } else {
                    Mode::CompressPdf
                };
                session.mode = Some(mode);
                session.state = ChatState::ChoosingLevel;
                self.outbound.answer_callback(callback_id, None).await?;

                let target = if mode == Mode::CompressImage { "Image" } else { "PDF" };
                let buttons = vec![vec![
                    InlineButton::new("🔷 High", "level_high"),
                    InlineButton::new("🔷 Medium", "level_medium"),
                    InlineButton::new("🔷 Low", "level_low"),
                ]];
                self.outbound
                    .edit_menu(
                        chat_id,
                        message_id,
                        &format!("🔧 Selected: *{target} compression*.\nNow choose compression level:"),
                        buttons,
                    )
                    .await
            }
            (ChatState::ChoosingLevel, level) if level.starts_with("level_") => {
                session.quality = QualityPreset::from_callback(level);
                session.state = ChatState::ReceivingFileToCompress;
                self.outbound.answer_callback(callback_id, None).await?;
                self.outbound
                    .edit_message_text(chat_id, message_id, MSG_SEND_FILE)
                    .await
            }
            _ => {
                // A button from an earlier menu, or one that does not
                // belong to this state. Acknowledge and stay put.
                tracing::debug!(chat_id, data, "ignoring stale callback");
                self.outbound
                    .answer_callback(callback_id, Some(MSG_STALE_MENU))
                    .await
            }
        }
    }

    // ── Incoming files ──────────────────────────────────────────────

    fn state_of(&self, chat_id: i64) -> Option<ChatState> {
        self.sessions.get(&chat_id).map(|s| s.state)
    }

    async fn on_photo(&mut self, chat_id: i64, bytes: Vec<u8>) -> anyhow::Result<()> {
        match self.state_of(chat_id) {
            Some(ChatState::ReceivingImages) => self.append_image(chat_id, bytes).await,
            Some(ChatState::ReceivingFileToCompress) => {
                self.run_compression(chat_id, bytes, &photo_file_name()).await
            }
            Some(_) => self.outbound.send_text(chat_id, MSG_USE_BUTTONS).await,
            None => self.outbound.send_text(chat_id, MSG_NOT_STARTED).await,
        }
    }

    /// Store one collected image under its sequence index and ack with the
    /// running count.
    async fn append_image(&mut self, chat_id: i64, bytes: Vec<u8>) -> anyhow::Result<()> {
        let stored = match self.sessions.get_mut(&chat_id) {
            Some(session) => {
                let index = session.images.len();
                let path = session.scratch.join(format!("{index}.jpg"));
                match std::fs::write(&path, &bytes) {
                    Ok(()) => {
                        session.images.push(path);
                        Ok(session.images.len())
                    }
                    Err(e) => Err(e),
                }
            }
            None => return self.outbound.send_text(chat_id, MSG_NOT_STARTED).await,
        };

        match stored {
            Ok(count) => {
                self.outbound
                    .send_text(
                        chat_id,
                        &format!("✅ Image {count} saved! Send more or /done."),
                    )
                    .await
            }
            Err(e) => {
                tracing::error!(chat_id, "failed to store image: {e}");
                self.teardown(chat_id);
                self.outbound
                    .send_text(chat_id, "⚠️ Couldn't store that image, the flow was aborted.")
                    .await
            }
        }
    }

    async fn on_document(
        &mut self,
        chat_id: i64,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> anyhow::Result<()> {
        match self.state_of(chat_id) {
            Some(ChatState::ReceivingFileToCompress) => {
                self.run_compression(chat_id, bytes, file_name).await
            }
            // The convert flow only collects photos; an attached file is a
            // re-prompt, not a page.
            Some(ChatState::ReceivingImages) => {
                self.outbound.send_text(chat_id, MSG_SEND_IMAGES).await
            }
            Some(_) => self.outbound.send_text(chat_id, MSG_USE_BUTTONS).await,
            None => self.outbound.send_text(chat_id, MSG_NOT_STARTED).await,
        }
    }

    async fn on_other(&mut self, chat_id: i64) -> anyhow::Result<()> {
        let reply = match self.state_of(chat_id) {
            Some(ChatState::ReceivingImages) => MSG_SEND_IMAGES,
            Some(ChatState::ReceivingFileToCompress) => "⚠️ Please send a file or photo.",
            Some(_) => MSG_USE_BUTTONS,
            None => MSG_NOT_STARTED,
        };
        self.outbound.send_text(chat_id, reply).await
    }

    // ── Terminal: convert ───────────────────────────────────────────

    async fn on_done(&mut self, chat_id: i64, username: Option<&str>) -> anyhow::Result<()> {
        let work = match self.sessions.get(&chat_id) {
            Some(session) if session.state == ChatState::ReceivingImages => {
                Self::assemble_pdf(session, username)
            }
            _ => return self.outbound.send_text(chat_id, MSG_NOTHING_TO_FINISH).await,
        };

        let send_result = match &work {
            Ok(path) => {
                self.outbound
                    .send_document(chat_id, path, Some("📄 Here is your PDF!"))
                    .await
            }
            Err(_) => Ok(()),
        };
        self.teardown(chat_id);

        if let Err(err) = work {
            self.outbound
                .send_text(chat_id, &err.user_message())
                .await?;
        }
        send_result
    }

    /// Build the PDF artifact inside the session's scratch directory.
    fn assemble_pdf(session: &Session, username: Option<&str>) -> Result<PathBuf, FlowError> {
        if session.images.is_empty() {
            return Err(FlowError::NoInput);
        }

        let bytes = pdf::assemble(&session.images)?;
        let out = session.scratch.join(pdf_file_name(username));
        std::fs::write(&out, &bytes).map_err(|e| FlowError::Assembly {
            path: None,
            reason: e.to_string(),
        })?;
        Ok(out)
    }

    // ── Terminal: compress ──────────────────────────────────────────

    async fn run_compression(
        &mut self,
        chat_id: i64,
        bytes: Vec<u8>,
        original_name: &str,
    ) -> anyhow::Result<()> {
        let work = match self.sessions.get(&chat_id) {
            Some(session) => {
                Self::compress_artifact(session, self.pdf_tool.as_deref(), &bytes, original_name)
                    .await
            }
            None => return self.outbound.send_text(chat_id, MSG_NOT_STARTED).await,
        };

        let send_result = match &work {
            Ok((path, caption)) => self.outbound.send_document(chat_id, path, Some(caption)).await,
            Err(_) => Ok(()),
        };
        self.teardown(chat_id);

        if let Err(err) = work {
            self.outbound
                .send_text(chat_id, &err.user_message())
                .await?;
        }
        send_result
    }

    /// Produce the compressed artifact for the session's recorded target.
    async fn compress_artifact(
        session: &Session,
        pdf_tool: Option<&std::path::Path>,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<(PathBuf, &'static str), FlowError> {
        match session.mode {
            Some(Mode::CompressImage) => {
                let out = session
                    .scratch
                    .join(compress::compressed_image_name(original_name));
                compress::compress_image(bytes, session.quality.jpeg_quality(), &out)?;
                Ok((out, "✅ Here is your compressed image."))
            }
            Some(Mode::CompressPdf) => {
                // Locate the tool before writing anything; absence aborts
                // the session with no partial output.
                let tool = compress::locate_pdf_tool(pdf_tool)?;

                let input = session.scratch.join(format!("received_{original_name}"));
                std::fs::write(&input, bytes)
                    .map_err(|e| FlowError::Compression(e.to_string()))?;

                let out = session
                    .scratch
                    .join(compress::compressed_pdf_name(original_name));
                compress::compress_pdf(&tool, &input, &out, session.quality).await?;
                Ok((out, "✅ Here is your compressed PDF."))
            }
            Some(Mode::Convert) | None => {
                Err(FlowError::Compression("no compression target selected".into()))
            }
        }
    }
}
