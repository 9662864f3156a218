//! Session registry: the single owner of every session's lifetime.
//!
//! At most one running session exists per key. Stopping is advisory: it
//! flips the session's stop token and the session's own tasks remove the
//! entry at their next checkpoint. Removal is guarded by the session's id so
//! a session that is still draining never evicts the one that replaced it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use hd_domain::config::Config;
use hd_domain::error::{Error, Result};
use hd_domain::recipient::{Recipient, TargetNormalizer};
use hd_domain::session_key;
use hd_domain::transport::{Transport, TransportHandle};

use crate::broadcast::Pacing;
use crate::credentials::CredentialStore;
use crate::log_sink::LogSink;
use crate::machine;
use crate::reconnect::ReconnectPolicy;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session config & state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a session broadcasts, fixed at start.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub targets: Vec<Recipient>,
    pub templates: Vec<String>,
    pub prefix: String,
    pub interval_secs: u64,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.templates.is_empty() {
            return Err(Error::ConfigInvalid(
                "at least one message template is required".into(),
            ));
        }
        if self.targets.is_empty() {
            return Err(Error::ConfigInvalid(
                "at least one recipient is required".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    AwaitingAuth,
    Connected,
    Reconnecting,
    LoggedOut,
    Stopped,
    Failed,
    Abandoned,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::LoggedOut | Self::Stopped | Self::Failed | Self::Abandoned
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub key: String,
    pub connected: bool,
    pub running: bool,
    pub state: Option<SessionState>,
    pub cursor: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl SessionStatus {
    fn absent(key: &str) -> Self {
        Self {
            key: key.to_owned(),
            connected: false,
            running: false,
            state: None,
            cursor: 0,
            session_id: None,
            started_at: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum TransportSlot {
    Empty,
    Active(Arc<dyn TransportHandle>),
    /// The broadcast loop has finished; nothing may be installed again.
    Sealed,
}

/// Shared state of one session, read by its machine and broadcast loop.
pub struct SessionHandle {
    pub key: String,
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub config: SessionConfig,
    stop: CancellationToken,
    connected: AtomicBool,
    cursor: AtomicUsize,
    state: Mutex<SessionState>,
    transport: Mutex<TransportSlot>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    fn new(key: &str, config: SessionConfig) -> Self {
        Self {
            key: key.to_owned(),
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            config,
            stop: CancellationToken::new(),
            connected: AtomicBool::new(false),
            cursor: AtomicUsize::new(0),
            state: Mutex::new(SessionState::Initializing),
            transport: Mutex::new(TransportSlot::Empty),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.stop.is_cancelled()
    }

    /// Request the session to wind down at its next checkpoint.
    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        self.stop.cancelled().await
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    pub(crate) fn set_cursor(&self, cursor: usize) {
        self.cursor.store(cursor, Ordering::Release);
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Move to `next` unless a terminal state has already been recorded.
    pub(crate) fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = next;
        }
    }

    pub(crate) fn transport(&self) -> Option<Arc<dyn TransportHandle>> {
        match &*self.transport.lock() {
            TransportSlot::Active(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    /// Install a fresh connection. Fails once the slot has been sealed.
    pub(crate) fn install_transport(&self, handle: Arc<dyn TransportHandle>) -> bool {
        let mut slot = self.transport.lock();
        if matches!(*slot, TransportSlot::Sealed) {
            return false;
        }
        *slot = TransportSlot::Active(handle);
        true
    }

    /// Take the current connection, leaving the slot empty for a reconnect.
    pub(crate) fn clear_transport(&self) -> Option<Arc<dyn TransportHandle>> {
        let mut slot = self.transport.lock();
        match std::mem::replace(&mut *slot, TransportSlot::Empty) {
            TransportSlot::Active(handle) => Some(handle),
            TransportSlot::Sealed => {
                *slot = TransportSlot::Sealed;
                None
            }
            TransportSlot::Empty => None,
        }
    }

    /// Take the current connection and refuse any later install.
    pub(crate) fn seal_transport(&self) -> Option<Arc<dyn TransportHandle>> {
        match std::mem::replace(&mut *self.transport.lock(), TransportSlot::Sealed) {
            TransportSlot::Active(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            key: self.key.clone(),
            connected: self.is_connected(),
            running: self.is_running(),
            state: Some(self.state()),
            cursor: self.cursor(),
            session_id: Some(self.id),
            started_at: Some(self.started_at),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Collaborators
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a session's tasks need besides their own handle.
pub struct SessionContext {
    pub transport: Arc<dyn Transport>,
    pub credentials: Arc<CredentialStore>,
    pub logs: Arc<LogSink>,
    pub normalizer: TargetNormalizer,
    pub pacing: Pacing,
    pub reconnect: ReconnectPolicy,
}

impl SessionContext {
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            credentials: Arc::new(CredentialStore::new(config.credentials.root.clone())),
            logs: Arc::new(LogSink::new(config.broadcast.log_capacity)),
            normalizer: TargetNormalizer::from_config(&config.broadcast),
            pacing: Pacing::from_config(&config.broadcast),
            reconnect: ReconnectPolicy::from_config(&config.reconnect),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionRegistry {
    ctx: SessionContext,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            ctx,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn logs(&self) -> &Arc<LogSink> {
        &self.ctx.logs
    }

    /// Register a new session and launch its machine. Returns as soon as the
    /// session is registered; connecting happens in the background.
    ///
    /// An entry whose stop was already requested but has not yet drained is
    /// replaced.
    pub fn start(self: &Arc<Self>, key: &str, config: SessionConfig) -> Result<Arc<SessionHandle>> {
        session_key::validate(key)?;
        config.validate()?;

        let handle = {
            let mut sessions = self.sessions.write();
            if sessions.get(key).is_some_and(|s| s.is_running()) {
                return Err(Error::AlreadyRunning(key.to_owned()));
            }
            let handle = Arc::new(SessionHandle::new(key, config));
            sessions.insert(key.to_owned(), handle.clone());
            handle
        };

        tracing::debug!(
            session_key = %key,
            session_id = %handle.id,
            targets = handle.config.targets.len(),
            templates = handle.config.templates.len(),
            "session registered"
        );
        tokio::spawn(machine::run(self.clone(), handle.clone()));
        Ok(handle)
    }

    /// Ask a running session to stop.
    pub fn stop(&self, key: &str) -> Result<()> {
        let handle = self
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_owned()))?;
        if handle.is_running() {
            handle.request_stop();
            self.ctx.logs.append(key, "Session stopped by user.");
        }
        Ok(())
    }

    /// Ask every running session to stop. Returns how many were signalled.
    pub fn stop_all(&self) -> usize {
        let handles: Vec<_> = self.sessions.read().values().cloned().collect();
        let mut count = 0;
        for handle in handles.iter().filter(|h| h.is_running()) {
            handle.request_stop();
            self.ctx.logs.append(&handle.key, "Session stopped (shutdown).");
            count += 1;
        }
        count
    }

    pub fn status(&self, key: &str) -> SessionStatus {
        self.get(key)
            .map(|h| h.status())
            .unwrap_or_else(|| SessionStatus::absent(key))
    }

    /// Status of every registered session, sorted by key.
    pub fn list(&self) -> Vec<SessionStatus> {
        let mut out: Vec<_> = self.sessions.read().values().map(|h| h.status()).collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    pub fn get(&self, key: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Remove `key` only if it still belongs to session `id`.
    pub fn remove_if_current(&self, key: &str, id: Uuid) -> bool {
        let mut sessions = self.sessions.write();
        if sessions.get(key).is_some_and(|s| s.id == id) {
            sessions.remove(key);
            true
        } else {
            false
        }
    }

    /// Final teardown of a session: log out and close its connection
    /// (errors ignored), drop the registry entry, record the end.
    pub(crate) async fn retire(&self, handle: &SessionHandle) {
        handle.request_stop();
        handle.set_connected(false);
        if let Some(conn) = handle.seal_transport() {
            if let Err(e) = conn.logout().await {
                tracing::debug!(session_key = %handle.key, error = %e, "logout failed");
            }
            if let Err(e) = conn.close().await {
                tracing::debug!(session_key = %handle.key, error = %e, "close failed");
            }
        }
        handle.set_state(SessionState::Stopped);
        self.remove_if_current(&handle.key, handle.id);
        self.ctx.logs.append(&handle.key, "Session ended.");
    }

    /// Wait until every session has removed itself, up to `timeout`.
    /// Returns `false` if sessions were still registered when time ran out.
    pub async fn wait_drained(&self, timeout: Duration) -> bool {
        let poll = async {
            while !self.is_empty() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn registry(root: &std::path::Path) -> Arc<SessionRegistry> {
        let mut config = Config::default();
        config.credentials.root = root.to_path_buf();
        let transport = Arc::new(ScriptedTransport::new());
        Arc::new(SessionRegistry::new(SessionContext::from_config(
            &config, transport,
        )))
    }

    fn one_target() -> SessionConfig {
        SessionConfig {
            targets: vec![Recipient::User("919876543210".into())],
            templates: vec!["hi".into()],
            prefix: String::new(),
            interval_secs: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_empty_templates_and_targets() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());

        let mut cfg = one_target();
        cfg.templates.clear();
        assert!(matches!(reg.start("s1", cfg), Err(Error::ConfigInvalid(_))));

        let mut cfg = one_target();
        cfg.targets.clear();
        assert!(matches!(reg.start("s1", cfg), Err(Error::ConfigInvalid(_))));
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_invalid_key() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        assert!(matches!(
            reg.start("../evil", one_target()),
            Err(Error::InvalidKey(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected_and_leaves_first_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let first = reg.start("s1", one_target()).unwrap();

        let err = reg.start("s1", one_target()).unwrap_err();
        assert!(matches!(err, Error::AlreadyRunning(_)));
        assert_eq!(reg.get("s1").unwrap().id, first.id);
        assert!(first.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_unknown_key_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        assert!(matches!(reg.stop("ghost"), Err(Error::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn absent_status_reports_disconnected() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let status = reg.status("ghost");
        assert!(!status.connected);
        assert!(!status.running);
        assert!(status.state.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_is_guarded_by_session_id() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let first = reg.start("s1", one_target()).unwrap();
        first.request_stop();

        // A stopping entry may be replaced before it drains.
        let second = reg.start("s1", one_target()).unwrap();
        assert!(!reg.remove_if_current("s1", first.id));
        assert_eq!(reg.get("s1").unwrap().id, second.id);
        assert!(reg.remove_if_current("s1", second.id));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_signals_every_session() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = registry(tmp.path());
        let a = reg.start("a", one_target()).unwrap();
        let b = reg.start("b", one_target()).unwrap();

        assert_eq!(reg.stop_all(), 2);
        assert!(!a.is_running());
        assert!(!b.is_running());
        assert!(reg.wait_drained(Duration::from_secs(30)).await);
    }

    #[test]
    fn sealed_slot_refuses_install() {
        let handle = SessionHandle::new("s1", one_target());
        let conn: Arc<dyn TransportHandle> = Arc::new(crate::testing::NullHandle);
        assert!(handle.install_transport(conn.clone()));
        assert!(handle.clear_transport().is_some());
        assert!(handle.clear_transport().is_none());

        assert!(handle.seal_transport().is_none());
        assert!(!handle.install_transport(conn));
        assert!(handle.transport().is_none());
    }

    #[test]
    fn terminal_state_is_sticky() {
        let handle = SessionHandle::new("s1", one_target());
        handle.set_state(SessionState::LoggedOut);
        handle.set_state(SessionState::Stopped);
        assert_eq!(handle.state(), SessionState::LoggedOut);
    }
}
