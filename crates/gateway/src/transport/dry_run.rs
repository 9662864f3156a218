//! Transport that opens instantly and only logs what it would send.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use hd_domain::error::Result;
use hd_domain::transport::{
    CredentialState, MessageId, Transport, TransportEvent, TransportHandle,
};

pub struct DryRunTransport;

#[async_trait]
impl Transport for DryRunTransport {
    fn name(&self) -> &str {
        "dry_run"
    }

    async fn connect(
        &self,
        key: &str,
        _credentials: CredentialState,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn TransportHandle>> {
        let _ = events.send(TransportEvent::Open).await;
        Ok(Arc::new(DryRunHandle {
            key: key.to_owned(),
            _events: events,
        }))
    }
}

struct DryRunHandle {
    key: String,
    /// Held so the session never sees its event stream end.
    _events: mpsc::Sender<TransportEvent>,
}

#[async_trait]
impl TransportHandle for DryRunHandle {
    async fn send(&self, address: &str, text: &str) -> Result<MessageId> {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            session_key = %self.key,
            to = %address,
            chars = text.chars().count(),
            message_id = %id,
            "dry-run send"
        );
        Ok(MessageId(id))
    }

    async fn logout(&self) -> Result<()> {
        tracing::info!(session_key = %self.key, "dry-run logout");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!(session_key = %self.key, "dry-run close");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_immediately_and_sends_with_fresh_ids() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = DryRunTransport
            .connect("s1", CredentialState::default(), tx)
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(TransportEvent::Open));

        let a = handle.send("1@s.whatsapp.net", "hi").await.unwrap();
        let b = handle.send("1@s.whatsapp.net", "hi").await.unwrap();
        assert_ne!(a, b);

        handle.logout().await.unwrap();
        handle.close().await.unwrap();
    }
}
