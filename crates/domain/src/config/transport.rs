use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// HTTP + WebSocket bridge to a sidecar that speaks the chat protocol.
    #[default]
    Bridge,
    /// Logs every send and never touches the network.
    DryRun,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Base URL of the bridge's HTTP API (e.g. `http://127.0.0.1:3290`).
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// WebSocket base for event streams. Derived from `base_url` when unset.
    #[serde(default)]
    pub events_url: Option<String>,
    #[serde(default = "d_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Environment variable holding a bearer token for the bridge.
    #[serde(default)]
    pub token_env: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            events_url: None,
            request_timeout_secs: d_timeout_secs(),
            token_env: None,
        }
    }
}

impl BridgeConfig {
    /// WebSocket base URL: the explicit `events_url`, or `base_url` with its
    /// scheme swapped to `ws`/`wss`.
    pub fn resolved_events_url(&self) -> String {
        if let Some(url) = &self.events_url {
            return url.trim_end_matches('/').to_owned();
        }
        let base = self.base_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_owned()
        }
    }
}

fn d_base_url() -> String {
    "http://127.0.0.1:3290".into()
}
fn d_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_url_derived_from_base() {
        let mut cfg = BridgeConfig::default();
        assert_eq!(cfg.resolved_events_url(), "ws://127.0.0.1:3290");

        cfg.base_url = "https://bridge.example.com/".into();
        assert_eq!(cfg.resolved_events_url(), "wss://bridge.example.com");
    }

    #[test]
    fn explicit_events_url_wins() {
        let cfg = BridgeConfig {
            events_url: Some("ws://events:9000/".into()),
            ..Default::default()
        };
        assert_eq!(cfg.resolved_events_url(), "ws://events:9000");
    }

    #[test]
    fn kind_parses_snake_case() {
        let cfg: TransportConfig = toml::from_str(r#"kind = "dry_run""#).unwrap();
        assert_eq!(cfg.kind, TransportKind::DryRun);
    }
}
