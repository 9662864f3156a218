//! In-memory transport for tests.
//!
//! [`ScriptedTransport`] records every send, lets a test inject transport
//! events into the most recent connection, and fails sends to chosen
//! addresses.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use hd_domain::error::{Error, Result};
use hd_domain::transport::{
    CredentialState, MessageId, Transport, TransportEvent, TransportHandle,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub connection: usize,
    pub address: String,
    pub text: String,
}

#[derive(Default)]
struct Script {
    open_on_connect: bool,
    connections: Vec<mpsc::Sender<TransportEvent>>,
    credentials_seen: Vec<CredentialState>,
    connect_failures: VecDeque<String>,
    failing: HashSet<String>,
    sent: Vec<SentMessage>,
    closed: HashSet<usize>,
    logouts: usize,
    closes: usize,
}

#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Every connection reports `Open` as soon as it is made.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                open_on_connect: true,
                ..Default::default()
            })),
        }
    }

    /// Connections stay unopened until the test emits `Open`.
    pub fn manual() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    pub fn fail_address(&self, address: &str) {
        self.script.lock().failing.insert(address.to_owned());
    }

    pub fn fail_next_connect(&self, message: &str) {
        self.script
            .lock()
            .connect_failures
            .push_back(message.to_owned());
    }

    /// Deliver `event` to the most recent connection. Returns `false` if there
    /// is no connection or its session no longer listens.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let sender = self.script.lock().connections.last().cloned();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    pub async fn close_connection(&self, code: Option<u16>) -> bool {
        self.emit(TransportEvent::Close { code }).await
    }

    pub fn connect_count(&self) -> usize {
        self.script.lock().connections.len()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.script.lock().sent.clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<SentMessage> {
        self.script
            .lock()
            .sent
            .iter()
            .filter(|m| m.address == address)
            .cloned()
            .collect()
    }

    /// Credentials handed to each `connect`, in order.
    pub fn credentials_seen(&self) -> Vec<CredentialState> {
        self.script.lock().credentials_seen.clone()
    }

    pub fn logout_count(&self) -> usize {
        self.script.lock().logouts
    }

    pub fn close_count(&self) -> usize {
        self.script.lock().closes
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn connect(
        &self,
        _key: &str,
        credentials: CredentialState,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn TransportHandle>> {
        let (connection, open) = {
            let mut script = self.script.lock();
            if let Some(message) = script.connect_failures.pop_front() {
                return Err(Error::Transport(message));
            }
            script.credentials_seen.push(credentials);
            script.connections.push(events.clone());
            (script.connections.len() - 1, script.open_on_connect)
        };
        if open {
            let _ = events.send(TransportEvent::Open).await;
        }
        Ok(Arc::new(ScriptedHandle {
            connection,
            script: self.script.clone(),
        }))
    }
}

struct ScriptedHandle {
    connection: usize,
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl TransportHandle for ScriptedHandle {
    async fn send(&self, address: &str, text: &str) -> Result<MessageId> {
        let mut script = self.script.lock();
        if script.closed.contains(&self.connection) {
            return Err(Error::send_failed(address, "connection closed"));
        }
        if script.failing.contains(address) {
            return Err(Error::send_failed(address, "recipient rejected"));
        }
        script.sent.push(SentMessage {
            connection: self.connection,
            address: address.to_owned(),
            text: text.to_owned(),
        });
        Ok(MessageId(format!("msg-{}", script.sent.len())))
    }

    async fn logout(&self) -> Result<()> {
        self.script.lock().logouts += 1;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut script = self.script.lock();
        script.closes += 1;
        script.closed.insert(self.connection);
        Ok(())
    }
}

/// A handle that accepts everything and does nothing.
pub struct NullHandle;

#[async_trait]
impl TransportHandle for NullHandle {
    async fn send(&self, _address: &str, _text: &str) -> Result<MessageId> {
        Ok(MessageId("null".into()))
    }

    async fn logout(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
