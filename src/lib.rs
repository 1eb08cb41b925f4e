//! # WhatsApp Pairing Broker
//!
//! An HTTP service that links WhatsApp devices using pairing codes.
//!
//! A client submits a phone number; the service starts a protocol client that
//! requests a pairing code for it, returns the code, waits for the user to
//! enter it on their phone, then packs the linked device's credentials into a
//! portable session string. The string is available from the status endpoint
//! and is also sent to the user's own WhatsApp account.
//!
//! ## Architecture
//!
//! - [`phone`] - Phone number normalization
//! - [`link`] - Seam to the WhatsApp protocol client (`whatsapp-rust`)
//! - [`session`] - Session registry, identifiers and session-string codec
//! - [`pairing`] - The pairing flow, delivery and expiry sweep
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wa_pairing_broker::{create_router, PairingConfig, PairingService, RouterConfig, WhatsAppLinker};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = Arc::new(PairingService::new(
//!         WhatsAppLinker::new(),
//!         PairingConfig::new("./tmp"),
//!     ));
//!     let router = create_router(service, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod link;
pub mod pairing;
pub mod phone;
pub mod server;
pub mod session;

// Re-export commonly used types
pub use config::{Cli, Command, DecodeConfig, ServeConfig};
pub use error::{CodecError, LinkError, PairingError, PhoneError};
pub use link::{
    format_pairing_code, CloseReason, LinkEvent, LinkHandle, LinkRequest, LinkedDevice, Linker,
};
#[cfg(feature = "whatsapp")]
pub use link::WhatsAppLinker;
pub use pairing::{
    delivery_messages, spawn_sweeper, PairingConfig, PairingService, PairingTicket, StatusReport,
};
pub use phone::PhoneNumber;
pub use server::{create_router, AppState, RouterConfig};
pub use session::{
    decode_session_string, encode_auth_dir, generate_session_id, restore_auth_dir, SessionEntry,
    SessionRegistry, SessionSnapshot, SessionStatus,
};
