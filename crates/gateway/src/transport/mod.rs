//! Concrete [`Transport`] implementations selected by `[transport] kind`.

pub mod bridge;
pub mod dry_run;

use std::sync::Arc;

use hd_domain::config::{TransportConfig, TransportKind};
use hd_domain::transport::Transport;

pub use bridge::BridgeTransport;
pub use dry_run::DryRunTransport;

pub fn build(config: &TransportConfig) -> anyhow::Result<Arc<dyn Transport>> {
    let transport: Arc<dyn Transport> = match config.kind {
        TransportKind::Bridge => Arc::new(BridgeTransport::new(&config.bridge)?),
        TransportKind::DryRun => {
            tracing::warn!("dry_run transport selected, messages are logged and never delivered");
            Arc::new(DryRunTransport)
        }
    };
    tracing::info!(transport = transport.name(), "transport ready");
    Ok(transport)
}
