//! Device linking abstraction.
//!
//! The messaging protocol itself (handshake, key exchange, pairing-code
//! crypto, multi-device sync) lives in an external client library. This
//! module defines the narrow seam the pairing service talks to:
//!
//! ```text
//! ┌──────────────────────┐   link()    ┌──────────────────────┐
//! │    PairingService    │ ──────────► │    Linker (trait)    │
//! │                      │ ◄────────── │                      │
//! └──────────────────────┘  LinkHandle └──────────┬───────────┘
//!            ▲                                    │
//!            │ LinkEvent stream                   ▼
//!            │                         ┌──────────────────────┐
//!            └──────────────────────── │   WhatsAppLinker     │
//!                                      │ (whatsapp-rust Bot)  │
//!                                      └──────────────────────┘
//! ```
//!
//! A [`LinkHandle`] pairs a [`LinkedDevice`] (outgoing operations) with an
//! event receiver (incoming callbacks from the client).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::LinkError;
use crate::phone::PhoneNumber;

#[cfg(feature = "whatsapp")]
mod whatsapp;

#[cfg(feature = "whatsapp")]
pub use whatsapp::WhatsAppLinker;

// =============================================================================
// Events
// =============================================================================

/// Why a link was closed by the remote side or the client library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The device was explicitly logged out
    LoggedOut,

    /// Any other terminal failure (stream error, rejected connection)
    Error(String),
}

/// Callbacks surfaced by the protocol client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A raw (unformatted) pairing code for the user to enter on their phone
    PairingCode(String),

    /// The linked device is online and its credentials are in the store
    Connected,

    /// The connection ended for good
    Closed(CloseReason),
}

// =============================================================================
// Traits
// =============================================================================

/// Parameters for starting a new link.
#[derive(Debug, Clone)]
pub struct LinkRequest {
    /// Number the pairing code is requested for
    pub phone: PhoneNumber,

    /// Directory where the client keeps its credential store
    pub auth_dir: PathBuf,

    /// Name shown for this device in the phone's linked-devices list
    pub device_name: String,
}

/// Outgoing operations on a started link.
#[async_trait]
pub trait LinkedDevice: Send + Sync {
    /// Send a plain text message to the given user.
    async fn send_text(&self, to: &PhoneNumber, text: &str) -> Result<(), LinkError>;

    /// Tear the connection down. Safe to call more than once.
    async fn close(&self);
}

/// A started link: the device handle plus its event stream.
pub struct LinkHandle {
    pub device: Arc<dyn LinkedDevice>,
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Factory for links.
///
/// Implementations start a protocol client configured to request a pairing
/// code for `request.phone` and forward its callbacks as [`LinkEvent`]s.
#[async_trait]
pub trait Linker: Send + Sync {
    async fn link(&self, request: LinkRequest) -> Result<LinkHandle, LinkError>;
}

/// Split a raw pairing code into dash-separated groups of four characters.
///
/// `"ABCD1234"` becomes `"ABCD-1234"`; codes that don't divide evenly keep
/// the short group last.
pub fn format_pairing_code(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    if chars.is_empty() {
        return String::new();
    }

    chars
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}
