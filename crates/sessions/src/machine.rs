//! Per-session connection supervisor.
//!
//! The machine owns the connection lifecycle: acquire credentials, connect,
//! react to transport events, and on close either reconnect after a fixed
//! delay or retire the session. Reconnects are iterations of one loop, never
//! recursive restarts. The broadcast loop is launched once, after the first
//! successful connect, and keeps its cursor across reconnects.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::Instrument;

use hd_domain::error::Result;
use hd_domain::transport::{TransportEvent, TransportHandle};

use crate::broadcast;
use crate::reconnect::ReconnectDecision;
use crate::registry::{SessionContext, SessionHandle, SessionRegistry, SessionState};

const EVENT_BUFFER: usize = 64;

/// How one connection ended, from the machine's point of view.
enum ConnectionEnd {
    StopRequested,
    Closed(Option<u16>),
}

pub(crate) async fn run(registry: Arc<SessionRegistry>, handle: Arc<SessionHandle>) {
    let span = tracing::info_span!("session", session_key = %handle.key, session_id = %handle.id);
    supervise(registry, handle).instrument(span).await
}

async fn supervise(registry: Arc<SessionRegistry>, handle: Arc<SessionHandle>) {
    let ctx = registry.context();
    let key = handle.key.as_str();
    let mut loop_started = false;
    let mut attempt: u32 = 0;

    while handle.is_running() {
        handle.set_state(SessionState::Initializing);
        ctx.logs.append(key, format!("Initializing session \"{key}\"..."));

        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let conn = match connect(ctx, key, attempt == 0, tx).await {
            Ok(conn) => conn,
            Err(e) if attempt == 0 => {
                ctx.logs.append(key, format!("Fatal startup error: {e}"));
                tracing::error!(error = %e, "session startup failed");
                handle.set_state(SessionState::Failed);
                handle.request_stop();
                break;
            }
            // A failed reconnect counts as a close with no code.
            Err(e) => {
                ctx.logs.append(key, format!("Reconnect failed: {e}"));
                tracing::warn!(error = %e, "reconnect attempt failed");
                if wait_to_retry(ctx, &handle, None).await {
                    continue;
                }
                break;
            }
        };
        attempt += 1;

        if !handle.is_running() || !handle.install_transport(conn.clone()) {
            let _ = conn.close().await;
            break;
        }

        if !loop_started {
            tokio::spawn(
                broadcast::run(registry.clone(), handle.clone()).in_current_span(),
            );
            loop_started = true;
            ctx.logs.append(
                key,
                "Session started. Waiting for connection / pairing.",
            );
        }

        let code = match pump_events(ctx, &handle, &mut rx).await {
            ConnectionEnd::StopRequested => break,
            ConnectionEnd::Closed(code) => code,
        };

        handle.set_connected(false);
        if let Some(old) = handle.clear_transport() {
            let _ = old.close().await;
        }
        ctx.logs.append(key, format!("Connection closed. code={}", fmt_code(code)));

        if !wait_to_retry(ctx, &handle, code).await {
            break;
        }
    }

    // Without a broadcast loop nobody else will tear the session down.
    if !loop_started {
        registry.retire(&handle).await;
    }
}

/// Consult the reconnect policy after a connection ended (or a reconnect
/// attempt failed) and sleep out the delay. Returns `true` when the machine
/// should connect again.
async fn wait_to_retry(ctx: &SessionContext, handle: &SessionHandle, code: Option<u16>) -> bool {
    let key = handle.key.as_str();
    match ctx.reconnect.decide(code, ctx.credentials.exists(key)) {
        ReconnectDecision::LoggedOut => {
            ctx.logs.append(
                key,
                "Session logged out. Remove the credential store and upload new credentials to re-pair.",
            );
            retire_as(handle, SessionState::LoggedOut);
            false
        }
        ReconnectDecision::Abandon => {
            ctx.logs
                .append(key, "Credential store removed; not reconnecting.");
            retire_as(handle, SessionState::Abandoned);
            false
        }
        ReconnectDecision::RetryAfter(delay) => {
            handle.set_state(SessionState::Reconnecting);
            ctx.logs.append(
                key,
                format!("Attempting reconnect in {} seconds...", delay.as_secs()),
            );
            tokio::select! {
                _ = handle.stopped() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
            if !ctx.credentials.exists(key) {
                ctx.logs
                    .append(key, "Credential store removed; not reconnecting.");
                retire_as(handle, SessionState::Abandoned);
                return false;
            }
            true
        }
    }
}

fn retire_as(handle: &SessionHandle, state: SessionState) {
    handle.set_state(state);
    handle.request_stop();
}

fn fmt_code(code: Option<u16>) -> String {
    code.map_or_else(|| "none".to_owned(), |c| c.to_string())
}

/// Load credentials and open a connection. Only the first attempt may create
/// the credential directory; later attempts require it to still exist.
async fn connect(
    ctx: &SessionContext,
    key: &str,
    first_attempt: bool,
    events: mpsc::Sender<TransportEvent>,
) -> Result<Arc<dyn TransportHandle>> {
    let store = ctx.credentials.clone();
    let owned_key = key.to_owned();
    let credentials = tokio::task::spawn_blocking(move || {
        if first_attempt {
            store.ensure(&owned_key)?;
        }
        store.load(&owned_key)
    })
    .await
    .map_err(|e| hd_domain::Error::Fatal(format!("credential load task failed: {e}")))??;

    tracing::debug!(
        transport = ctx.transport.name(),
        files = credentials.files.len(),
        "connecting"
    );
    ctx.transport.connect(key, credentials, events).await
}

async fn pump_events(
    ctx: &SessionContext,
    handle: &SessionHandle,
    rx: &mut mpsc::Receiver<TransportEvent>,
) -> ConnectionEnd {
    let key = handle.key.as_str();
    loop {
        let event = tokio::select! {
            _ = handle.stopped() => return ConnectionEnd::StopRequested,
            event = rx.recv() => event,
        };

        match event {
            // The transport dropped its sender without reporting a close.
            None => return ConnectionEnd::Closed(None),
            Some(TransportEvent::Close { code }) => return ConnectionEnd::Closed(code),
            Some(TransportEvent::Open) => {
                handle.set_connected(true);
                handle.set_state(SessionState::Connected);
                ctx.logs.append(key, "Connected successfully.");
            }
            Some(TransportEvent::PairingChallenge { code }) => {
                if handle.state() == SessionState::Initializing {
                    handle.set_state(SessionState::AwaitingAuth);
                }
                tracing::info!(pairing_code = %code, "pairing challenge");
                ctx.logs.append(
                    key,
                    "Pairing challenge received; complete pairing on the device (code in server logs).",
                );
            }
            Some(TransportEvent::CredentialsUpdated(state)) => {
                let store = ctx.credentials.clone();
                let owned_key = key.to_owned();
                let saved =
                    tokio::task::spawn_blocking(move || store.persist(&owned_key, &state)).await;
                match saved {
                    Ok(Ok(())) => tracing::debug!("credentials persisted"),
                    Ok(Err(e)) => ctx.logs.append(key, format!("Credential save failed: {e}")),
                    Err(e) => ctx.logs.append(key, format!("Credential save failed: {e}")),
                }
            }
            Some(TransportEvent::Incoming { from, id }) => {
                ctx.logs
                    .append(key, format!("Incoming message from {from} (id: {id})"));
            }
            Some(TransportEvent::Receipt { id, status }) => {
                ctx.logs.append(key, format!("Receipt -> {id} {status}"));
            }
        }
    }
}
