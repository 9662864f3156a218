//! The rate-limited broadcast loop.
//!
//! One loop per session. Each cycle sends the current template to every
//! recipient in order, pausing after each send, then waits the session
//! interval and advances to the next template. A failed send is logged and
//! the cycle moves on. Stop requests are honoured only at checkpoints: after
//! a recipient's send and pause, and after the interval wait.

use std::sync::Arc;
use std::time::Duration;

use hd_domain::config::BroadcastConfig;
use hd_domain::error::{Error, Result};
use hd_domain::recipient::Recipient;
use hd_domain::transport::MessageId;

use crate::registry::{SessionHandle, SessionRegistry};

/// Delay after each send, by recipient kind.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub user: Duration,
    pub group: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self::from_config(&BroadcastConfig::default())
    }
}

impl Pacing {
    pub fn from_config(cfg: &BroadcastConfig) -> Self {
        Self {
            user: cfg.user_pacing(),
            group: cfg.group_pacing(),
        }
    }

    pub fn after(&self, recipient: &Recipient) -> Duration {
        if recipient.is_group() {
            self.group
        } else {
            self.user
        }
    }
}

/// Message text for one cycle: prefix and template joined by a space, trimmed.
pub fn compose(prefix: &str, template: &str) -> String {
    format!("{prefix} {template}").trim().to_owned()
}

pub(crate) async fn run(registry: Arc<SessionRegistry>, handle: Arc<SessionHandle>) {
    let ctx = registry.context();
    let cfg = &handle.config;
    let key = handle.key.as_str();

    let plan: Vec<(String, Duration)> = cfg
        .targets
        .iter()
        .map(|r| (ctx.normalizer.to_address(r), ctx.pacing.after(r)))
        .collect();
    let interval = Duration::from_secs(cfg.interval_secs.max(1));
    let mut cursor = handle.cursor() % cfg.templates.len();

    'cycles: while handle.is_running() {
        let text = compose(&cfg.prefix, &cfg.templates[cursor]);

        for (address, pause) in &plan {
            match send(&handle, address, &text).await {
                Ok(id) => ctx.logs.append(key, format!("Sent -> {address} (id: {id})")),
                Err(e) => ctx
                    .logs
                    .append(key, format!("Failed -> {address} | {}", failure_reason(&e))),
            }
            tokio::time::sleep(*pause).await;
            if !handle.is_running() {
                break 'cycles;
            }
        }

        tokio::time::sleep(interval).await;
        cursor = (cursor + 1) % cfg.templates.len();
        handle.set_cursor(cursor);
    }

    registry.retire(&handle).await;
}

async fn send(handle: &SessionHandle, address: &str, text: &str) -> Result<MessageId> {
    match handle.transport() {
        Some(conn) => conn.send(address, text).await,
        None => Err(Error::send_failed(address, "transport not connected")),
    }
}

fn failure_reason(err: &Error) -> String {
    match err {
        Error::SendFailed { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_trims_empty_prefix() {
        assert_eq!(compose("", "hello"), "hello");
        assert_eq!(compose("Team:", "hello"), "Team: hello");
        assert_eq!(compose("  ", "  hello  "), "hello");
    }

    #[test]
    fn groups_pause_longer_than_users() {
        let pacing = Pacing::default();
        assert_eq!(
            pacing.after(&Recipient::User("1".into())),
            Duration::from_millis(450)
        );
        assert_eq!(
            pacing.after(&Recipient::Group("1".into())),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn send_failure_reason_is_bare_message() {
        let err = Error::send_failed("a@b", "not on the network");
        assert_eq!(failure_reason(&err), "not on the network");
        let err = Error::Transport("socket reset".into());
        assert_eq!(failure_reason(&err), "transport: socket reset");
    }
}
