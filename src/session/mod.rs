//! Pairing session bookkeeping.
//!
//! - [`id`] generates session identifiers
//! - [`registry`] tracks live sessions in memory and finds expired ones
//! - [`codec`] packs a linked device's credential files into a portable
//!   session string (and back)

pub mod codec;
pub mod id;
pub mod registry;

pub use codec::{decode_session_string, encode_auth_dir, restore_auth_dir};
pub use id::{generate_session_id, SESSION_ID_LEN};
pub use registry::{SessionEntry, SessionRegistry, SessionSnapshot, SessionStatus};
