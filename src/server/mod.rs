//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │    POST /request-code        GET /session-status/{session_id}   │
//! │                                                                 │
//! │  ┌──────────────────────────┐   ┌────────────────────────────┐  │
//! │  │        handlers          │   │          routes            │  │
//! │  │ (requests, error JSON)   │   │  (router, CORS, tracing)   │  │
//! │  └──────────────────────────┘   └────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, ping_handler, request_code_handler, session_status_handler, AppState,
    FailureResponse, HealthResponse, RequestCodeBody, RequestCodeResponse,
};
pub use routes::{create_router, RouterConfig};
