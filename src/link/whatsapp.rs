//! `whatsapp-rust` backed linker.
//!
//! Each link gets its own [`Bot`] with a SQLite credential store inside the
//! session's auth directory. The bot is started in pair-code mode for the
//! submitted number, so the first interesting callback is
//! `Event::PairingCode`; once the user enters the code on their phone the
//! library completes pairing, reconnects and emits `Event::Connected`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use wacore::types::events::Event;
use wacore_binary::jid::Jid;
use waproto::whatsapp::device_props::PlatformType;
use whatsapp_rust::bot::Bot;
use whatsapp_rust::pair_code::PairCodeOptions;
use whatsapp_rust::Client;
use whatsapp_rust_sqlite_storage::SqliteStore;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;

use super::{CloseReason, LinkEvent, LinkHandle, LinkRequest, LinkedDevice, Linker};
use crate::error::LinkError;
use crate::phone::PhoneNumber;

/// Name of the credential store inside each auth directory.
pub const STORE_FILE: &str = "session.db";

/// Linker that drives the WhatsApp Web multi-device protocol.
#[derive(Debug, Clone, Default)]
pub struct WhatsAppLinker {
    /// Override for the websocket endpoint (useful against a proxy)
    ws_url: Option<String>,
}

impl WhatsAppLinker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to a custom websocket endpoint instead of the default one.
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }
}

#[async_trait]
impl Linker for WhatsAppLinker {
    async fn link(&self, request: LinkRequest) -> Result<LinkHandle, LinkError> {
        let db_path = request.auth_dir.join(STORE_FILE);
        let store = SqliteStore::new(db_path.to_string_lossy().as_ref())
            .await
            .map_err(|e| LinkError::Store(e.to_string()))?;
        let backend = Arc::new(store);

        let mut transport_factory = TokioWebSocketTransportFactory::new();
        if let Some(ref url) = self.ws_url {
            transport_factory = transport_factory.with_url(url.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let phone = request.phone.clone();

        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(transport_factory)
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some(request.device_name.clone()),
                None,
                Some(PlatformType::Desktop),
            )
            .with_pair_code(PairCodeOptions {
                phone_number: request.phone.digits().to_string(),
                ..Default::default()
            })
            .on_event(move |event, _client| {
                let tx = tx.clone();
                let phone = phone.clone();
                async move {
                    if let Some(link_event) = translate_event(&phone, event) {
                        // Receiver gone means the session was already torn down.
                        let _ = tx.send(link_event);
                    }
                }
            })
            .build()
            .await
            .map_err(|e| LinkError::Connect(e.to_string()))?;

        let client = bot.client();
        let run = bot
            .run()
            .await
            .map_err(|e| LinkError::Connect(e.to_string()))?;

        debug!(phone = %request.phone, "WhatsApp client started");

        Ok(LinkHandle {
            device: Arc::new(WhatsAppDevice {
                client,
                run: Mutex::new(Some(run)),
            }),
            events: rx,
        })
    }
}

/// Map library events onto the subset the pairing flow cares about.
fn translate_event(phone: &PhoneNumber, event: Event) -> Option<LinkEvent> {
    match event {
        Event::PairingCode { code, .. } => Some(LinkEvent::PairingCode(code.to_string())),
        Event::PairSuccess(_) => {
            info!(phone = %phone, "WhatsApp pairing accepted, waiting for connection");
            None
        }
        Event::Connected(_) => Some(LinkEvent::Connected),
        Event::LoggedOut(_) => Some(LinkEvent::Closed(CloseReason::LoggedOut)),
        Event::StreamError(err) => Some(LinkEvent::Closed(CloseReason::Error(format!(
            "{:?}",
            err
        )))),
        // The bot reconnects on its own (pairing always forces one restart).
        Event::Disconnected(_) => {
            debug!(phone = %phone, "WhatsApp socket disconnected");
            None
        }
        _ => None,
    }
}

/// A running bot for one session.
struct WhatsAppDevice {
    client: Arc<Client>,
    run: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl LinkedDevice for WhatsAppDevice {
    async fn send_text(&self, to: &PhoneNumber, text: &str) -> Result<(), LinkError> {
        if self.run.lock().await.is_none() {
            return Err(LinkError::NotConnected);
        }

        let jid: Jid = to
            .jid()
            .parse()
            .map_err(|e| LinkError::InvalidRecipient(format!("{}: {}", to, e)))?;

        let message = waproto::whatsapp::Message {
            conversation: Some(text.to_string()),
            ..Default::default()
        };

        let message_id = self
            .client
            .send_message(jid, message)
            .await
            .map_err(|e| LinkError::Send(e.to_string()))?;

        debug!(to = %to, message_id = %message_id, "WhatsApp message sent");
        Ok(())
    }

    async fn close(&self) {
        if let Some(handle) = self.run.lock().await.take() {
            handle.abort();
        } else {
            debug!("WhatsApp client already closed");
        }
    }
}
