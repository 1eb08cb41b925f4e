//! Configuration management for the pairing broker.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `PAIR_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Commands
//!
//! - `serve` (default) - Run the HTTP service
//! - `decode` - Restore a session string into credential files
//!
//! # Environment Variables
//!
//! - `PAIR_HOST` - Server bind address (default: 0.0.0.0)
//! - `PORT` - Server port (default: 3000)
//! - `PAIR_WORK_DIR` - Parent directory for per-session credentials (default: ./tmp)
//! - `PAIR_SESSION_TTL` - Seconds before a session is swept (default: 600)
//! - `PAIR_SWEEP_INTERVAL` - Seconds between sweeps (default: 600)
//! - `PAIR_CODE_TIMEOUT` - Seconds to wait for a pairing code (default: 60)
//! - `PAIR_CREDS_FLUSH_MS` - Delay before packing credentials (default: 3000)
//! - `PAIR_MESSAGE_GAP_MS` - Delay between delivered messages (default: 1500)
//! - `PAIR_LINGER` - Seconds the device stays connected after delivery (default: 15)
//! - `PAIR_BRAND` - Brand name used in delivered messages
//! - `PAIR_WS_URL` - Override for the WhatsApp websocket endpoint
//! - `PAIR_CORS_ORIGINS` - Allowed CORS origins (comma-separated)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::pairing::service::{
    DEFAULT_BRAND, DEFAULT_CODE_TIMEOUT, DEFAULT_CREDS_FLUSH_DELAY, DEFAULT_LINGER,
    DEFAULT_MESSAGE_GAP, DEFAULT_SESSION_TTL,
};
use crate::pairing::PairingConfig;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default parent directory for session credentials.
pub const DEFAULT_WORK_DIR: &str = "./tmp";

/// Default sweep period in seconds (10 minutes).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 600;

/// Default output directory for `decode`.
pub const DEFAULT_DECODE_DIR: &str = "./session";

// =============================================================================
// CLI Arguments
// =============================================================================

/// WhatsApp pairing broker.
///
/// Issues pairing codes for WhatsApp numbers, waits for the linked device to
/// come online and hands back a portable session string.
#[derive(Parser, Debug, Clone)]
#[command(name = "wa-pairing-broker")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arguments for the implicit `serve` command.
    #[command(flatten)]
    pub serve: ServeConfig,
}

impl Cli {
    /// Resolve the command to run; no subcommand means `serve`.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP pairing service.
    Serve(ServeConfig),

    /// Restore a session string into a directory of credential files.
    Decode(DecodeConfig),
}

/// Options for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "PAIR_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,

    // =========================================================================
    // Session Configuration
    // =========================================================================
    /// Parent directory for per-session credential stores.
    #[arg(long, default_value = DEFAULT_WORK_DIR, env = "PAIR_WORK_DIR")]
    pub work_dir: PathBuf,

    /// Seconds a session is kept before the sweep removes it.
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL.as_secs(), env = "PAIR_SESSION_TTL")]
    pub session_ttl: u64,

    /// Seconds between expiry sweeps.
    #[arg(long, default_value_t = DEFAULT_SWEEP_INTERVAL_SECS, env = "PAIR_SWEEP_INTERVAL")]
    pub sweep_interval: u64,

    // =========================================================================
    // Pairing Flow
    // =========================================================================
    /// Seconds to wait for the client to produce a pairing code.
    #[arg(long, default_value_t = DEFAULT_CODE_TIMEOUT.as_secs(), env = "PAIR_CODE_TIMEOUT")]
    pub code_timeout: u64,

    /// Milliseconds to wait after connecting before packing credentials.
    #[arg(
        long,
        default_value_t = DEFAULT_CREDS_FLUSH_DELAY.as_millis() as u64,
        env = "PAIR_CREDS_FLUSH_MS"
    )]
    pub creds_flush_ms: u64,

    /// Milliseconds between delivered messages.
    #[arg(
        long,
        default_value_t = DEFAULT_MESSAGE_GAP.as_millis() as u64,
        env = "PAIR_MESSAGE_GAP_MS"
    )]
    pub message_gap_ms: u64,

    /// Seconds the device stays connected after delivery.
    #[arg(long, default_value_t = DEFAULT_LINGER.as_secs(), env = "PAIR_LINGER")]
    pub linger: u64,

    /// Brand name used in delivered messages.
    #[arg(long, default_value = DEFAULT_BRAND, env = "PAIR_BRAND")]
    pub brand: String,

    /// Override for the WhatsApp websocket endpoint.
    #[arg(long, env = "PAIR_WS_URL")]
    pub ws_url: Option<String>,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "PAIR_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.work_dir.as_os_str().is_empty() {
            return Err("work_dir must not be empty. Set --work-dir or PAIR_WORK_DIR".to_string());
        }

        if self.session_ttl == 0 {
            return Err("session_ttl must be greater than 0".to_string());
        }
        if self.sweep_interval == 0 {
            return Err("sweep_interval must be greater than 0".to_string());
        }
        if self.code_timeout == 0 {
            return Err("code_timeout must be greater than 0".to_string());
        }

        // A session must outlive the wait for its own code
        if self.session_ttl <= self.code_timeout {
            return Err(format!(
                "session_ttl ({}s) must be longer than code_timeout ({}s)",
                self.session_ttl, self.code_timeout
            ));
        }

        if self.brand.trim().is_empty() {
            return Err("brand must not be empty".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    /// Build the pairing flow settings.
    pub fn pairing_config(&self) -> PairingConfig {
        PairingConfig::new(self.work_dir.clone())
            .with_session_ttl(Duration::from_secs(self.session_ttl))
            .with_code_timeout(Duration::from_secs(self.code_timeout))
            .with_creds_flush_delay(Duration::from_millis(self.creds_flush_ms))
            .with_message_gap(Duration::from_millis(self.message_gap_ms))
            .with_linger(Duration::from_secs(self.linger))
            .with_brand(self.brand.clone())
    }
}

/// Options for the `decode` command.
#[derive(Args, Debug, Clone)]
pub struct DecodeConfig {
    /// Session string to restore.
    #[arg(env = "SESSION_DATA")]
    pub session: String,

    /// Directory to write the credential files into.
    #[arg(short, long, default_value = DEFAULT_DECODE_DIR)]
    pub out_dir: PathBuf,
}

// =============================================================================
// Tests
// =============================================================================
