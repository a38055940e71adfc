//! Channel wiring: the supervised Telegram listener and the event router.
//!
//! One listener task long-polls the Bot API and feeds a single message
//! bus; the router drains it sequentially, so each chat's events are
//! handled one at a time and session state needs no locking.

pub mod telegram;
pub mod traits;

pub use telegram::TelegramClient;
pub use traits::{BotCommand, Inbound, InboundKind, InlineButton, Outbound};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::compress;
use crate::config::Config;
use crate::flow::Engine;
use crate::storage::ScratchStore;

const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;

fn spawn_supervised_listener(
    client: Arc<TelegramClient>,
    tx: mpsc::Sender<Inbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = INITIAL_BACKOFF_SECS;
        loop {
            let result = client.listen(tx.clone()).await;

            if tx.is_closed() {
                break;
            }

            match result {
                Ok(()) => tracing::warn!("Telegram listener exited unexpectedly; restarting"),
                Err(e) => tracing::error!("Telegram listener error: {e}; restarting"),
            }

            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = backoff.saturating_mul(2).min(MAX_BACKOFF_SECS);
        }
    })
}

/// Start the listener and run the conversation router until Ctrl-C.
pub async fn start(config: Config) -> anyhow::Result<()> {
    let client = Arc::new(TelegramClient::new(
        config.bot_token.clone(),
        config.allowed_users.clone(),
    ));
    let outbound: Arc<dyn Outbound> = client.clone();
    let scratch = ScratchStore::new(&config.scratch_root);
    let mut engine = Engine::new(outbound, scratch, config.pdf_tool.clone());

    let (tx, mut rx) = mpsc::channel::<Inbound>(100);
    let listener = spawn_supervised_listener(client, tx);

    tracing::info!("paperpress-bot is running");

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        if let Err(e) = engine.handle(event).await {
                            tracing::error!("handler transport error: {e}");
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    listener.abort();
    Ok(())
}

/// Health checks: bot token validity and compression tool presence.
pub async fn doctor(config: Config) -> anyhow::Result<()> {
    println!("🩺 PaperPress Doctor");
    println!();

    let client = TelegramClient::new(config.bot_token.clone(), config.allowed_users.clone());
    let token_ok = tokio::time::timeout(Duration::from_secs(10), client.health_check())
        .await
        .unwrap_or(false);
    println!(
        "  {} Telegram token",
        if token_ok { "✅" } else { "❌" }
    );

    match compress::locate_pdf_tool(config.pdf_tool.as_deref()) {
        Ok(path) => println!("  ✅ PDF compression tool: {}", path.display()),
        Err(_) => println!(
            "  ⚠️  PDF compression tool ({}) not found; PDF compression will be unavailable",
            compress::PDF_TOOL
        ),
    }

    Ok(())
}
