//! Pairing service: issues codes, follows links to completion, and expires
//! stale sessions.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::PairingError;
use crate::link::{
    format_pairing_code, CloseReason, LinkEvent, LinkHandle, LinkRequest, LinkedDevice, Linker,
};
use crate::phone::PhoneNumber;
use crate::session::{
    encode_auth_dir, generate_session_id, SessionEntry, SessionRegistry, SessionStatus,
};

use super::messages::delivery_messages;

// =============================================================================
// Configuration
// =============================================================================

/// Default lifetime of a session before the sweep removes it (10 minutes).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(10 * 60);

/// Default time to wait for the client to produce a pairing code.
pub const DEFAULT_CODE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default pause between the connection opening and reading the credentials.
pub const DEFAULT_CREDS_FLUSH_DELAY: Duration = Duration::from_millis(3000);

/// Default pause between delivered messages.
pub const DEFAULT_MESSAGE_GAP: Duration = Duration::from_millis(1500);

/// Default time the device stays connected after delivery.
pub const DEFAULT_LINGER: Duration = Duration::from_secs(15);

/// Default brand name used in delivered messages.
pub const DEFAULT_BRAND: &str = "ALMEER XMD";

/// Attempts at finding an unused session ID before giving up.
const MAX_ID_ATTEMPTS: usize = 8;

/// Timing and presentation settings for the pairing flow.
#[derive(Debug, Clone)]
pub struct PairingConfig {
    /// Parent directory of the per-session auth directories
    pub work_dir: PathBuf,

    /// Sessions older than this are removed by the sweep
    pub session_ttl: Duration,

    /// How long `request_code` waits for a pairing code
    pub code_timeout: Duration,

    /// Wait before packing credentials once connected
    pub creds_flush_delay: Duration,

    /// Pause between delivered messages
    pub message_gap: Duration,

    /// How long the device stays connected after delivery
    pub linger: Duration,

    /// Brand name shown in delivered messages
    pub brand: String,
}

impl PairingConfig {
    /// Create a configuration with default timings under `work_dir`.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            session_ttl: DEFAULT_SESSION_TTL,
            code_timeout: DEFAULT_CODE_TIMEOUT,
            creds_flush_delay: DEFAULT_CREDS_FLUSH_DELAY,
            message_gap: DEFAULT_MESSAGE_GAP,
            linger: DEFAULT_LINGER,
            brand: DEFAULT_BRAND.to_string(),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_code_timeout(mut self, timeout: Duration) -> Self {
        self.code_timeout = timeout;
        self
    }

    pub fn with_creds_flush_delay(mut self, delay: Duration) -> Self {
        self.creds_flush_delay = delay;
        self
    }

    pub fn with_message_gap(mut self, gap: Duration) -> Self {
        self.message_gap = gap;
        self
    }

    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }
}

// =============================================================================
// Results
// =============================================================================

/// A freshly issued pairing code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingTicket {
    pub session_id: String,

    /// Code formatted as dash-separated groups of four (`ABCD-EFGH`)
    pub code: String,
}

/// Externally visible state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusReport {
    NotFound,
    Pending,
    Failed,
    Connected {
        #[serde(skip_serializing_if = "Option::is_none")]
        session: Option<String>,
    },
}

// =============================================================================
// PairingService
// =============================================================================

/// Orchestrates pairing sessions on top of a [`Linker`].
pub struct PairingService<L: Linker> {
    linker: L,
    registry: Arc<SessionRegistry>,
    config: Arc<PairingConfig>,
}

impl<L: Linker> PairingService<L> {
    pub fn new(linker: L, config: PairingConfig) -> Self {
        Self {
            linker,
            registry: Arc::new(SessionRegistry::new()),
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    /// Start a link for `phone` and wait for its pairing code.
    ///
    /// On success the session is registered as pending and a background
    /// task follows the link until the device comes online or fails.
    pub async fn request_code(&self, phone: PhoneNumber) -> Result<PairingTicket, PairingError> {
        let (session_id, auth_dir) = self.claim_session_dir().await?;

        let LinkHandle { device, mut events } = match self
            .linker
            .link(LinkRequest {
                phone: phone.clone(),
                auth_dir: auth_dir.clone(),
                device_name: self.config.brand.clone(),
            })
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                remove_dir_quietly(&auth_dir).await;
                return Err(e.into());
            }
        };

        let entry = SessionEntry::new(Arc::clone(&device), phone.clone(), auth_dir.clone());
        let cancel = entry.cancel.clone();
        if !self.registry.insert(session_id.clone(), entry).await {
            // The directory claim makes this unreachable short of external tampering
            device.close().await;
            remove_dir_quietly(&auth_dir).await;
            return Err(PairingError::Workspace(format!(
                "session {} registered twice",
                session_id
            )));
        }

        // Discards the session if the caller goes away while we wait
        let guard = PendingSession {
            registry: Arc::clone(&self.registry),
            session_id: Some(session_id.clone()),
        };

        let waited =
            time::timeout(self.config.code_timeout, next_pairing_code(&mut events)).await;
        guard.disarm();

        let raw_code = match waited {
            Ok(Ok(code)) => code,
            Ok(Err(reason)) => return Err(self.abandon(&session_id, reason).await),
            Err(_) => {
                let reason = format!("no pairing code within {:?}", self.config.code_timeout);
                return Err(self.abandon(&session_id, reason).await);
            }
        };

        let code = format_pairing_code(&raw_code);
        info!(
            session_id = %session_id,
            phone = %phone,
            code = %code,
            "Pairing code issued"
        );

        tokio::spawn(watch_link(
            Arc::clone(&self.registry),
            Arc::clone(&self.config),
            session_id.clone(),
            phone,
            device,
            events,
            cancel,
        ));

        Ok(PairingTicket { session_id, code })
    }

    /// Report the state of a session.
    pub async fn status(&self, session_id: &str) -> StatusReport {
        match self.registry.snapshot(session_id).await {
            None => StatusReport::NotFound,
            Some(snapshot) => match snapshot.status {
                SessionStatus::Pending => StatusReport::Pending,
                SessionStatus::Failed => StatusReport::Failed,
                SessionStatus::Connected => StatusReport::Connected {
                    session: snapshot.session,
                },
            },
        }
    }

    /// Remove every session older than the TTL, closing its device and
    /// deleting its auth directory. Returns the number removed.
    pub async fn sweep_expired(&self) -> usize {
        let expired = self
            .registry
            .drain_expired(Instant::now(), self.config.session_ttl)
            .await;
        let count = expired.len();

        for (session_id, entry) in expired {
            info!(
                session_id = %session_id,
                status = entry.status.as_str(),
                "Cleaned up session"
            );
            discard(entry).await;
        }

        count
    }

    /// Pick an unused session ID and atomically create its auth directory.
    async fn claim_session_dir(&self) -> Result<(String, PathBuf), PairingError> {
        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| {
                PairingError::Workspace(format!("{}: {}", self.config.work_dir.display(), e))
            })?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let session_id = generate_session_id();
            if self.registry.contains(&session_id).await {
                continue;
            }

            let auth_dir = self.config.work_dir.join(&session_id);
            match tokio::fs::create_dir(&auth_dir).await {
                Ok(()) => return Ok((session_id, auth_dir)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(PairingError::Workspace(format!(
                        "{}: {}",
                        auth_dir.display(),
                        e
                    )))
                }
            }
        }

        Err(PairingError::Workspace(
            "could not allocate a session id".to_string(),
        ))
    }

    /// Tear down a session whose code never arrived.
    async fn abandon(&self, session_id: &str, reason: String) -> PairingError {
        warn!(session_id = %session_id, reason = %reason, "Pairing code unavailable");

        if let Some(entry) = self.registry.remove(session_id).await {
            discard(entry).await;
        }

        PairingError::CodeUnavailable { reason }
    }
}

/// Stop a removed session's link watcher, close its device and delete its
/// credential files.
async fn discard(entry: SessionEntry) {
    entry.cancel.cancel();
    entry.device.close().await;
    remove_dir_quietly(&entry.auth_dir).await;
}

/// Discards a registered session unless disarmed, covering a
/// `request_code` future dropped while it waits for the code.
struct PendingSession {
    registry: Arc<SessionRegistry>,
    session_id: Option<String>,
}

impl PendingSession {
    fn disarm(mut self) {
        self.session_id = None;
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        let Some(session_id) = self.session_id.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let registry = Arc::clone(&self.registry);
        runtime.spawn(async move {
            if let Some(entry) = registry.remove(&session_id).await {
                debug!(session_id = %session_id, "Pairing request cancelled, session discarded");
                discard(entry).await;
            }
        });
    }
}

/// Run the sweep every `every`, starting one period from now.
pub fn spawn_sweeper<L>(service: Arc<PairingService<L>>, every: Duration) -> JoinHandle<()>
where
    L: Linker + 'static,
{
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + every, every);
        loop {
            ticker.tick().await;
            let removed = service.sweep_expired().await;
            if removed > 0 {
                debug!(removed, "Session sweep finished");
            }
        }
    })
}

// =============================================================================
// Link Watcher
// =============================================================================

/// Wait for the first pairing code on a fresh link.
async fn next_pairing_code(events: &mut UnboundedReceiver<LinkEvent>) -> Result<String, String> {
    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::PairingCode(code) => return Ok(code),
            LinkEvent::Closed(CloseReason::LoggedOut) => {
                return Err("link logged out before a code was issued".to_string())
            }
            LinkEvent::Closed(CloseReason::Error(reason)) => return Err(reason),
            LinkEvent::Connected => {
                debug!("Ignoring connection event before pairing code");
            }
        }
    }

    Err("link closed before a code was issued".to_string())
}

/// Follow a pending link until it connects, fails, or its session is gone.
async fn watch_link(
    registry: Arc<SessionRegistry>,
    config: Arc<PairingConfig>,
    session_id: String,
    phone: PhoneNumber,
    device: Arc<dyn LinkedDevice>,
    mut events: UnboundedReceiver<LinkEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(session_id = %session_id, "Session discarded, no longer watching link");
                return;
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let Some(snapshot) = registry.snapshot(&session_id).await else {
            debug!(session_id = %session_id, "Session removed, no longer watching link");
            return;
        };

        match event {
            LinkEvent::PairingCode(code) => {
                debug!(session_id = %session_id, code = %format_pairing_code(&code), "Pairing code refreshed");
            }
            LinkEvent::Connected if snapshot.status == SessionStatus::Connected => {
                debug!(session_id = %session_id, "Reconnected after delivery");
            }
            LinkEvent::Connected => {
                info!(session_id = %session_id, phone = %phone, "WhatsApp connected");
                complete_link(
                    &registry,
                    &config,
                    &session_id,
                    &phone,
                    device.as_ref(),
                    &cancel,
                )
                .await;
                return;
            }
            LinkEvent::Closed(CloseReason::LoggedOut) => {
                info!(session_id = %session_id, phone = %phone, "Link logged out");
            }
            LinkEvent::Closed(CloseReason::Error(reason)) => {
                if registry.mark_failed(&session_id).await {
                    warn!(session_id = %session_id, phone = %phone, reason = %reason, "Link failed");
                }
            }
        }
    }

    debug!(session_id = %session_id, "Link event stream ended");
}

/// Pack the credentials, publish the session string, deliver it, and close
/// the device after the linger period.
async fn complete_link(
    registry: &SessionRegistry,
    config: &PairingConfig,
    session_id: &str,
    phone: &PhoneNumber,
    device: &dyn LinkedDevice,
    cancel: &CancellationToken,
) {
    if !pause(config.creds_flush_delay, cancel).await {
        return;
    }

    let Some(auth_dir) = registry.auth_dir(session_id).await else {
        debug!(session_id = %session_id, "Session removed before credentials were packed");
        return;
    };

    let encoded = tokio::task::spawn_blocking(move || encode_auth_dir(&auth_dir)).await;
    let session = match encoded {
        Ok(Ok(session)) => session,
        Ok(Err(e)) => {
            error!(session_id = %session_id, error = %e, "Failed to pack session credentials");
            registry.mark_failed(session_id).await;
            device.close().await;
            return;
        }
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Credential packing task failed");
            registry.mark_failed(session_id).await;
            device.close().await;
            return;
        }
    };

    if !registry.mark_connected(session_id, session.clone()).await {
        debug!(session_id = %session_id, "Session removed before it could be marked connected");
        device.close().await;
        return;
    }

    deliver_session(config, session_id, phone, device, &session, cancel).await;

    if pause(config.linger, cancel).await {
        device.close().await;
    }
}

/// Send the session string to the user's own account.
///
/// Delivery is best effort: the string is already available through the
/// status endpoint, so a send failure only stops the remaining messages.
async fn deliver_session(
    config: &PairingConfig,
    session_id: &str,
    phone: &PhoneNumber,
    device: &dyn LinkedDevice,
    session: &str,
    cancel: &CancellationToken,
) {
    for (i, text) in delivery_messages(&config.brand, session).iter().enumerate() {
        if i > 0 && !pause(config.message_gap, cancel).await {
            return;
        }
        if let Err(e) = device.send_text(phone, text).await {
            error!(
                session_id = %session_id,
                phone = %phone,
                error = %e,
                "Failed to send session to WhatsApp"
            );
            return;
        }
    }

    info!(session_id = %session_id, phone = %phone, "Session string sent to WhatsApp");
}

/// Sleep for `period`; false if the session was discarded meanwhile.
async fn pause(period: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = time::sleep(period) => true,
    }
}

async fn remove_dir_quietly(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != ErrorKind::NotFound {
            debug!(dir = %dir.display(), error = %e, "Failed to remove auth directory");
        }
    }
}
