//! Pairing orchestration.
//!
//! The [`PairingService`] is the entry point for the HTTP layer:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        PairingService                           │
//! │                                                                 │
//! │  request_code()          watch (spawned)          sweep         │
//! │  1. validate phone       Connected:               every N min:  │
//! │  2. new id + dir           encode credentials       drop expired│
//! │  3. start link             mark connected           close device│
//! │  4. await code             deliver to WhatsApp      rm dir      │
//! │  5. register + watch       close after linger                   │
//! │                          Closed: mark failed                    │
//! │           │                     │                      │        │
//! │           ▼                     ▼                      ▼        │
//! │     ┌──────────┐        ┌─────────────────┐    ┌─────────────┐  │
//! │     │  Linker  │        │ SessionRegistry │    │ auth dirs   │  │
//! │     └──────────┘        └─────────────────┘    └─────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod messages;
pub mod service;

pub use messages::delivery_messages;
pub use service::{spawn_sweeper, PairingConfig, PairingService, PairingTicket, StatusReport};
