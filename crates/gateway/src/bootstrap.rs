//! AppState construction extracted from `main.rs`.
//!
//! This is the composition root: the transport, credential store, log sink
//! and session registry are built here once and handed to the HTTP layer.

use std::sync::Arc;

use anyhow::Context;

use hd_domain::config::{Config, ConfigSeverity};
use hd_sessions::{SessionContext, SessionRegistry};

use crate::api::auth;
use crate::state::AppState;
use crate::transport;

/// Validate config, build the transport and session registry, and return a
/// fully-wired [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Credential root ──────────────────────────────────────────────
    std::fs::create_dir_all(&config.credentials.root).with_context(|| {
        format!(
            "creating credential root {}",
            config.credentials.root.display()
        )
    })?;
    tracing::info!(path = %config.credentials.root.display(), "credential store ready");

    // ── Transport & sessions ─────────────────────────────────────────
    let transport = transport::build(&config.transport).context("initializing transport")?;
    let registry = Arc::new(SessionRegistry::new(SessionContext::from_config(
        &config, transport,
    )));
    tracing::info!(
        log_capacity = config.broadcast.log_capacity,
        reconnect_delay_secs = config.reconnect.delay_secs,
        "session registry ready"
    );

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = auth::token_hash_from_env(&config.server.api_token_env);

    Ok(AppState::new(config, registry, api_token_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hd_domain::config::TransportKind;

    #[test]
    fn refuses_config_with_errors() {
        let mut config = Config::default();
        config.broadcast.log_capacity = 0;
        let err = build_app_state(Arc::new(config)).err().unwrap();
        assert!(err.to_string().contains("config validation failed"));
    }

    #[test]
    fn builds_dry_run_state_and_creates_root() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.transport.kind = TransportKind::DryRun;
        config.credentials.root = tmp.path().join("creds");
        config.server.api_token_env = "HD_TEST_TOKEN_THAT_IS_NEVER_SET".into();

        let state = build_app_state(Arc::new(config)).unwrap();
        assert!(tmp.path().join("creds").is_dir());
        assert!(state.registry.is_empty());
        assert!(state.api_token_hash.is_none());
    }
}
