use thiserror::Error;

/// Errors produced while validating a submitted phone number
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    /// No phone number was submitted (absent, null or empty)
    #[error("Phone number is required!")]
    Missing,

    /// The number has too few or too many digits once non-digits are stripped
    #[error("Invalid phone number: expected 7-15 digits, got {digits}")]
    InvalidLength { digits: usize },

    /// The JSON value is neither a string nor a number
    #[error("Invalid phone number: unsupported value type")]
    UnsupportedType,
}

/// Errors that can occur when packing or unpacking a session string
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Reading the credential directory failed
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    /// Writing a restored credential file failed
    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },

    /// Outer or per-file base64 layer is malformed
    #[error("Invalid base64: {0}")]
    Base64(String),

    /// The decoded payload is not a JSON object of strings
    #[error("Invalid session payload: {0}")]
    Json(String),

    /// A file name would escape the target directory
    #[error("Unsafe file name in session payload: {0}")]
    UnsafeName(String),
}

/// Errors raised by the messaging-protocol collaborator
#[derive(Debug, Clone, Error)]
pub enum LinkError {
    /// The credential store could not be opened
    #[error("Credential store error: {0}")]
    Store(String),

    /// The client could not be built or started
    #[error("Connection error: {0}")]
    Connect(String),

    /// The recipient could not be turned into a protocol address
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Sending a message failed
    #[error("Send failed: {0}")]
    Send(String),

    /// The device is not (or no longer) connected
    #[error("Device not connected")]
    NotConnected,
}

/// Errors returned by the pairing service to HTTP callers
#[derive(Debug, Clone, Error)]
pub enum PairingError {
    /// Phone validation failed
    #[error(transparent)]
    Phone(#[from] PhoneError),

    /// The request body could not be parsed
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// No pairing code arrived (timeout, rejected number, closed link)
    #[error("Pairing code unavailable: {reason}")]
    CodeUnavailable { reason: String },

    /// The per-session working directory could not be prepared
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// The link could not be started
    #[error("Link error: {0}")]
    Link(#[from] LinkError),
}

impl PairingError {
    /// The message shown to end users; internal details stay in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            PairingError::Phone(PhoneError::Missing) | PairingError::InvalidBody(_) => {
                "Phone number is required!"
            }
            PairingError::Phone(_) => "Invalid phone number!",
            PairingError::CodeUnavailable { .. } => {
                "Failed to generate code. Make sure the number is registered on WhatsApp!"
            }
            PairingError::Workspace(_) | PairingError::Link(_) => "Server error. Please try again!",
        }
    }
}
