//! Telegram Bot API client: long-polls `getUpdates` and turns raw updates
//! into typed [`Inbound`] events, downloading photo/document payloads
//! before they reach the conversation engine.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tokio::sync::mpsc;

use super::traits::{BotCommand, Inbound, InboundKind, InlineButton, Outbound};

/// What a raw message update turned out to be, before any file download.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MessageKind {
    Command(BotCommand),
    Text,
    /// `file_id` of the largest available photo size.
    Photo { file_id: String },
    Document { file_id: String, file_name: String },
    Unsupported,
}

/// Telegram channel that long-polls the Bot API for updates.
pub struct TelegramClient {
    bot_token: String,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot_token, file_path
        )
    }

    fn is_user_allowed(&self, identity: &str) -> bool {
        self.allowed_users.iter().any(|u| u == "*" || u == identity)
    }

    fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        identities.into_iter().any(|id| self.is_user_allowed(id))
    }

    /// Download a file from Telegram by its `file_id` (getFile + fetch).
    async fn download_file(&self, file_id: &str) -> anyhow::Result<Vec<u8>> {
        let url = self.api_url("getFile");
        let body = serde_json::json!({ "file_id": file_id });

        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            let err = resp.text().await?;
            anyhow::bail!("Telegram getFile failed: {err}");
        }

        let data: serde_json::Value = resp.json().await?;
        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(|p| p.as_str())
            .ok_or_else(|| anyhow::anyhow!("Missing file_path in getFile response"))?;

        let file_resp = self.client.get(self.file_url(file_path)).send().await?;
        if !file_resp.status().is_success() {
            anyhow::bail!(
                "Failed to download file from Telegram: {}",
                file_resp.status()
            );
        }

        Ok(file_resp.bytes().await?.to_vec())
    }

    /// Probe the bot token via `getMe`.
    pub async fn health_check(&self) -> bool {
        self.client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn keyboard_json(buttons: Vec<Vec<InlineButton>>) -> serde_json::Value {
        let rows: Vec<Vec<serde_json::Value>> = buttons
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|btn| {
                        serde_json::json!({
                            "text": btn.text,
                            "callback_data": btn.callback_data
                        })
                    })
                    .collect()
            })
            .collect();
        serde_json::json!({ "inline_keyboard": rows })
    }

    async fn post_json(&self, method: &str, body: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await?;
            anyhow::bail!("Telegram {method} failed: {err}");
        }
        Ok(resp.json().await?)
    }

    /// Classify a raw `message` object without touching the network.
    fn classify_message(message: &serde_json::Value) -> MessageKind {
        if let Some(text) = message.get("text").and_then(|v| v.as_str()) {
            return match BotCommand::parse(text) {
                Some(cmd) => MessageKind::Command(cmd),
                None => MessageKind::Text,
            };
        }

        // Photos arrive as an array of sizes; the last entry is the largest.
        if let Some(photo) = message
            .get("photo")
            .and_then(|p| p.as_array())
            .and_then(|sizes| sizes.last())
        {
            if let Some(file_id) = photo.get("file_id").and_then(|v| v.as_str()) {
                return MessageKind::Photo {
                    file_id: file_id.to_string(),
                };
            }
        }

        if let Some(document) = message.get("document") {
            if let Some(file_id) = document.get("file_id").and_then(|v| v.as_str()) {
                let file_name = document
                    .get("file_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("file.bin")
                    .to_string();
                return MessageKind::Document {
                    file_id: file_id.to_string(),
                    file_name,
                };
            }
        }

        MessageKind::Unsupported
    }

    /// Parse a `callback_query` update into an [`Inbound`] event.
    fn parse_callback_query(callback: &serde_json::Value) -> Option<Inbound> {
        let callback_id = callback.get("id")?.as_str()?.to_string();
        let data = callback.get("data")?.as_str()?.to_string();

        let from = callback.get("from")?;
        let first_name = from
            .get("first_name")
            .and_then(|n| n.as_str())
            .map(String::from);
        let username = from
            .get("username")
            .and_then(|u| u.as_str())
            .map(String::from);

        let message = callback.get("message")?;
        let chat_id = message.get("chat")?.get("id")?.as_i64()?;
        let message_id = message.get("message_id")?.as_i64()?;

        let mut event = Inbound::new(
            chat_id,
            InboundKind::Callback {
                callback_id,
                message_id,
                data,
            },
        );
        event.first_name = first_name;
        event.username = username;
        Some(event)
    }

    /// Sender identities usable against the allowlist (username, user id).
    fn sender_identities(from: Option<&serde_json::Value>) -> (Option<String>, Option<String>) {
        let username = from
            .and_then(|f| f.get("username"))
            .and_then(|u| u.as_str())
            .map(String::from);
        let user_id = from
            .and_then(|f| f.get("id"))
            .and_then(serde_json::Value::as_i64)
            .map(|id| id.to_string());
        (username, user_id)
    }

    fn update_authorized(&self, username: Option<&str>, user_id: Option<&str>) -> bool {
        let mut identities: Vec<&str> = Vec::with_capacity(2);
        if let Some(u) = username {
            identities.push(u);
        }
        if let Some(id) = user_id {
            identities.push(id);
        }
        self.is_any_user_allowed(identities)
    }

    /// Long-poll `getUpdates` forever, forwarding typed events to `tx`.
    ///
    /// Returns only when the receiving side of `tx` is gone.
    pub async fn listen(&self, tx: mpsc::Sender<Inbound>) -> anyhow::Result<()> {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for updates...");

        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": 30,
                "allowed_updates": ["message", "callback_query"]
            });

            let resp = match self
                .client
                .post(self.api_url("getUpdates"))
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };

            let data: serde_json::Value = match resp.json().await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Telegram parse error: {e}");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };

            let Some(results) = data.get("result").and_then(serde_json::Value::as_array) else {
                continue;
            };

            for update in results {
                if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64) {
                    offset = uid + 1;
                }

                // Inline button presses.
                if let Some(callback) = update.get("callback_query") {
                    let (username, user_id) =
                        Self::sender_identities(callback.get("from"));
                    if !self.update_authorized(username.as_deref(), user_id.as_deref()) {
                        tracing::warn!(
                            "Ignoring callback from unauthorized user: {}",
                            username.as_deref().unwrap_or("unknown")
                        );
                        continue;
                    }
                    if let Some(event) = Self::parse_callback_query(callback) {
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    continue;
                }

                let Some(message) = update.get("message") else {
                    continue;
                };

                let Some(chat_id) = message
                    .get("chat")
                    .and_then(|c| c.get("id"))
                    .and_then(serde_json::Value::as_i64)
                else {
                    continue;
                };

                // Authorization first, before any file download.
                let (username, user_id) = Self::sender_identities(message.get("from"));
                if !self.update_authorized(username.as_deref(), user_id.as_deref()) {
                    tracing::warn!(
                        "Ignoring message from unauthorized user: username={}, user_id={}",
                        username.as_deref().unwrap_or("unknown"),
                        user_id.as_deref().unwrap_or("unknown")
                    );
                    continue;
                }

                let kind = match Self::classify_message(message) {
                    MessageKind::Command(cmd) => InboundKind::Command(cmd),
                    MessageKind::Text => InboundKind::Text,
                    MessageKind::Photo { file_id } => match self.download_file(&file_id).await {
                        Ok(bytes) => InboundKind::Photo { bytes },
                        Err(e) => {
                            tracing::error!("Failed to download photo: {e}");
                            let _ = self
                                .send_text(chat_id, "⚠️ Couldn't download that photo, please try again.")
                                .await;
                            continue;
                        }
                    },
                    MessageKind::Document { file_id, file_name } => {
                        match self.download_file(&file_id).await {
                            Ok(bytes) => InboundKind::Document { bytes, file_name },
                            Err(e) => {
                                tracing::error!("Failed to download document: {e}");
                                let _ = self
                                    .send_text(
                                        chat_id,
                                        "⚠️ Couldn't download that file, please try again.",
                                    )
                                    .await;
                                continue;
                            }
                        }
                    }
                    MessageKind::Unsupported => InboundKind::Unsupported,
                };

                let mut event = Inbound::new(chat_id, kind);
                event.first_name = message
                    .get("from")
                    .and_then(|f| f.get("first_name"))
                    .and_then(|n| n.as_str())
                    .map(String::from);
                event.username = username;

                if tx.send(event).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

#[async_trait]
impl Outbound for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });
        self.post_json("sendMessage", &body).await?;
        Ok(())
    }

    async fn send_menu(
        &self,
        chat_id: i64,
        text: &str,
        buttons: Vec<Vec<InlineButton>>,
    ) -> anyhow::Result<i64> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "reply_markup": Self::keyboard_json(buttons)
        });

        let data = self.post_json("sendMessage", &body).await?;
        let message_id = data
            .get("result")
            .and_then(|r| r.get("message_id"))
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| anyhow::anyhow!("Missing message_id in response"))?;

        tracing::debug!(chat_id, message_id, "menu sent");
        Ok(message_id)
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "Markdown"
        });
        self.post_json("editMessageText", &body).await?;
        Ok(())
    }

    async fn edit_menu(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        buttons: Vec<Vec<InlineButton>>,
    ) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "Markdown",
            "reply_markup": Self::keyboard_json(buttons)
        });
        self.post_json("editMessageText", &body).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> anyhow::Result<()> {
        let mut body = serde_json::json!({
            "callback_query_id": callback_id,
            "show_alert": false
        });
        if let Some(t) = text {
            body["text"] = serde_json::Value::String(t.to_string());
        }
        self.post_json("answerCallbackQuery", &body).await?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: Option<&str>,
    ) -> anyhow::Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();

        let file_bytes = tokio::fs::read(path).await?;
        let part = Part::bytes(file_bytes).file_name(file_name.clone());

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);
        if let Some(cap) = caption {
            form = form.text("caption", cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await?;
            anyhow::bail!("Telegram sendDocument failed: {err}");
        }

        tracing::info!(chat_id, file_name, "document sent");
        Ok(())
    }
}
