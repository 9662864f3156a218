#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hd_domain::config::Config;
use hd_sessions::testing::ScriptedTransport;
use hd_sessions::{SessionConfig, SessionContext, SessionRegistry};
use tempfile::TempDir;

pub struct Harness {
    pub registry: Arc<SessionRegistry>,
    pub transport: ScriptedTransport,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_transport(ScriptedTransport::new())
    }

    pub fn manual() -> Self {
        Self::with_transport(ScriptedTransport::manual())
    }

    fn with_transport(transport: ScriptedTransport) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.credentials.root = dir.path().to_path_buf();
        let ctx = SessionContext::from_config(&config, Arc::new(transport.clone()));
        Self {
            registry: Arc::new(SessionRegistry::new(ctx)),
            transport,
            dir,
        }
    }

    /// Session config for raw user numbers, normalized the way the API does.
    pub fn users(&self, numbers: &[&str], templates: &[&str], interval_secs: u64) -> SessionConfig {
        let normalizer = &self.registry.context().normalizer;
        SessionConfig {
            targets: numbers
                .iter()
                .filter_map(|n| normalizer.normalize_user(n))
                .collect(),
            templates: templates.iter().map(|t| t.to_string()).collect(),
            prefix: String::new(),
            interval_secs,
        }
    }

    pub fn logs(&self, key: &str) -> Vec<String> {
        self.registry
            .logs()
            .read(key)
            .into_iter()
            .map(|e| e.text)
            .collect()
    }

    pub fn logged(&self, key: &str, needle: &str) -> bool {
        self.logs(key).iter().any(|l| l.contains(needle))
    }
}

/// Poll `cond` on the paused clock, failing after 60 virtual seconds.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..6000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 60s of virtual time");
}

pub async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}
