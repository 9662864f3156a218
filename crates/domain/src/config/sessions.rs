use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Broadcast
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Addressing and pacing rules shared by every broadcast session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Country code prepended to bare 10-digit numbers (and 11-digit numbers
    /// with a leading trunk `0`).
    #[serde(default = "d_country_code")]
    pub default_country_code: String,

    /// Domain suffix appended to unqualified user identifiers.
    #[serde(default = "d_user_suffix")]
    pub user_suffix: String,

    /// Domain suffix appended to unqualified group identifiers.
    #[serde(default = "d_group_suffix")]
    pub group_suffix: String,

    /// Delay after each send to a user, in milliseconds.
    #[serde(default = "d_user_pacing_ms")]
    pub user_pacing_ms: u64,

    /// Delay after each send to a group, in milliseconds.
    #[serde(default = "d_group_pacing_ms")]
    pub group_pacing_ms: u64,

    /// Interval used when a start request carries none (or an unparsable one).
    #[serde(default = "d_interval_secs")]
    pub default_interval_secs: u64,

    /// Entries retained per session log before the oldest is evicted.
    #[serde(default = "d_log_capacity")]
    pub log_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            default_country_code: d_country_code(),
            user_suffix: d_user_suffix(),
            group_suffix: d_group_suffix(),
            user_pacing_ms: d_user_pacing_ms(),
            group_pacing_ms: d_group_pacing_ms(),
            default_interval_secs: d_interval_secs(),
            log_capacity: d_log_capacity(),
        }
    }
}

impl BroadcastConfig {
    pub fn user_pacing(&self) -> Duration {
        Duration::from_millis(self.user_pacing_ms)
    }

    pub fn group_pacing(&self) -> Duration {
        Duration::from_millis(self.group_pacing_ms)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reconnect
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fixed-delay reconnect rules. There is no attempt cap; retries end only
/// when the credential store for the session is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "d_reconnect_delay_secs")]
    pub delay_secs: u64,

    /// Close code the transport reports when the account was logged out.
    #[serde(default = "d_logged_out_code")]
    pub logged_out_code: u16,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_secs: d_reconnect_delay_secs(),
            logged_out_code: d_logged_out_code(),
        }
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Credential store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Directory holding one sub-directory of credential files per session key.
    #[serde(default = "d_credentials_root")]
    pub root: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            root: d_credentials_root(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_country_code() -> String {
    "91".into()
}
fn d_user_suffix() -> String {
    "@s.whatsapp.net".into()
}
fn d_group_suffix() -> String {
    "@g.us".into()
}
fn d_user_pacing_ms() -> u64 {
    450
}
fn d_group_pacing_ms() -> u64 {
    500
}
fn d_interval_secs() -> u64 {
    5
}
fn d_log_capacity() -> usize {
    200
}
fn d_reconnect_delay_secs() -> u64 {
    5
}
fn d_logged_out_code() -> u16 {
    401
}
fn d_credentials_root() -> PathBuf {
    PathBuf::from("./data/credentials")
}
