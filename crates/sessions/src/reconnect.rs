//! What to do when a session's transport connection closes.

use std::time::Duration;

use hd_domain::config::ReconnectConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// The account was logged out; the session is retired.
    LoggedOut,
    /// The credential store is gone; the session is retired.
    Abandon,
    /// Wait, then run the full connect sequence again.
    RetryAfter(Duration),
}

/// Fixed-delay reconnect with no attempt cap. Removing a session's credential
/// store is how an operator ends a retry loop.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    logged_out_code: u16,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn new(delay: Duration, logged_out_code: u16) -> Self {
        Self {
            delay,
            logged_out_code,
        }
    }

    pub fn from_config(cfg: &ReconnectConfig) -> Self {
        Self::new(cfg.delay(), cfg.logged_out_code)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn decide(&self, close_code: Option<u16>, store_exists: bool) -> ReconnectDecision {
        if close_code == Some(self.logged_out_code) {
            ReconnectDecision::LoggedOut
        } else if !store_exists {
            ReconnectDecision::Abandon
        } else {
            ReconnectDecision::RetryAfter(self.delay)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logged_out_code_is_terminal_even_with_store() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.decide(Some(401), true), ReconnectDecision::LoggedOut);
        assert_eq!(policy.decide(Some(401), false), ReconnectDecision::LoggedOut);
    }

    #[test]
    fn other_codes_retry_after_fixed_delay() {
        let policy = ReconnectPolicy::default();
        let expected = ReconnectDecision::RetryAfter(Duration::from_secs(5));
        assert_eq!(policy.decide(Some(428), true), expected);
        assert_eq!(policy.decide(Some(515), true), expected);
        assert_eq!(policy.decide(None, true), expected);
    }

    #[test]
    fn missing_store_abandons() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.decide(Some(500), false), ReconnectDecision::Abandon);
        assert_eq!(policy.decide(None, false), ReconnectDecision::Abandon);
    }

    #[test]
    fn custom_logged_out_code() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), 440);
        assert_eq!(policy.decide(Some(440), true), ReconnectDecision::LoggedOut);
        assert!(matches!(
            policy.decide(Some(401), true),
            ReconnectDecision::RetryAfter(_)
        ));
    }
}
