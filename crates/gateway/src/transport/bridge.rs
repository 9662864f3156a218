//! Transport backed by a protocol sidecar (the "bridge").
//!
//! The bridge owns the chat protocol. Herald drives it over JSON/HTTP and
//! consumes connection events over a WebSocket:
//!
//! - `POST {base}/sessions/{key}/connect` `{credentials}` → `{handle}`
//! - `WS   {events}/sessions/{key}/events?handle=…` → JSON frames tagged by `type`
//! - `POST {base}/sessions/{key}/messages` `{handle, to, text}` → `{id}`
//! - `POST {base}/sessions/{key}/logout` / `close` `{handle}`
//!
//! Credential file contents travel hex-encoded.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use hd_domain::config::BridgeConfig;
use hd_domain::error::{Error, Result};
use hd_domain::transport::{
    CredentialState, MessageId, Transport, TransportEvent, TransportHandle,
};

type EventStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Serialize)]
struct ConnectRequest<'a> {
    credentials: BTreeMap<&'a str, String>,
}

#[derive(Deserialize)]
struct ConnectResponse {
    handle: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    handle: &'a str,
    to: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Serialize)]
struct HandleRequest<'a> {
    handle: &'a str,
}

/// One frame on the bridge's event stream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeFrame {
    Open,
    Close {
        #[serde(default)]
        code: Option<u16>,
    },
    Pairing {
        #[serde(default)]
        code: String,
    },
    Credentials {
        files: BTreeMap<String, String>,
    },
    Incoming {
        from: String,
        #[serde(default)]
        id: String,
    },
    Receipt {
        id: String,
        #[serde(default)]
        status: String,
    },
}

impl BridgeFrame {
    fn into_event(self) -> Result<TransportEvent> {
        Ok(match self {
            Self::Open => TransportEvent::Open,
            Self::Close { code } => TransportEvent::Close { code },
            Self::Pairing { code } => TransportEvent::PairingChallenge { code },
            Self::Credentials { files } => {
                let mut decoded = BTreeMap::new();
                for (name, hex_bytes) in files {
                    let bytes = hex::decode(&hex_bytes).map_err(|e| {
                        Error::Transport(format!("credential file {name}: {e}"))
                    })?;
                    decoded.insert(name, bytes);
                }
                TransportEvent::CredentialsUpdated(CredentialState { files: decoded })
            }
            Self::Incoming { from, id } => TransportEvent::Incoming { from, id },
            Self::Receipt { id, status } => TransportEvent::Receipt { id, status },
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
    events_url: String,
    token: Option<String>,
}

impl BridgeClient {
    fn endpoint(&self, key: &str, action: &str) -> String {
        format!("{}/sessions/{key}/{action}", self.base_url)
    }

    /// POST `body` as JSON. Non-2xx statuses are errors carrying the
    /// bridge's response text.
    async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> std::result::Result<reqwest::Response, String> {
        let mut req = self.http.post(url).json(body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("bridge returned {status}: {}", text.trim()));
        }
        Ok(resp)
    }

    async fn open_events(&self, key: &str, handle: &str) -> Result<EventStream> {
        let mut url = reqwest::Url::parse(&format!("{}/sessions/{key}/events", self.events_url))
            .map_err(|e| Error::Transport(format!("invalid events url: {e}")))?;
        url.query_pairs_mut().append_pair("handle", handle);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Transport(format!("events request: {e}")))?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::Transport(format!("bridge token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::Transport(format!("events stream: {e}")))?;
        Ok(stream)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct BridgeTransport {
    client: Arc<BridgeClient>,
}

impl BridgeTransport {
    pub fn new(config: &BridgeConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("building bridge HTTP client: {e}"))?;

        let token = config
            .token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.is_empty());

        tracing::info!(
            base_url = %config.base_url,
            authenticated = token.is_some(),
            "bridge transport configured"
        );

        Ok(Self {
            client: Arc::new(BridgeClient {
                http,
                base_url: config.base_url.trim_end_matches('/').to_owned(),
                events_url: config.resolved_events_url(),
                token,
            }),
        })
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    fn name(&self) -> &str {
        "bridge"
    }

    async fn connect(
        &self,
        key: &str,
        credentials: CredentialState,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn TransportHandle>> {
        let body = ConnectRequest {
            credentials: credentials
                .files
                .iter()
                .map(|(name, bytes)| (name.as_str(), hex::encode(bytes)))
                .collect(),
        };
        let url = self.client.endpoint(key, "connect");
        let resp = self
            .client
            .post(&url, &body)
            .await
            .map_err(|e| Error::Transport(format!("connect: {e}")))?;
        let ConnectResponse { handle } = resp
            .json()
            .await
            .map_err(|e| Error::Transport(format!("connect response: {e}")))?;

        let stream = match self.client.open_events(key, &handle).await {
            Ok(stream) => stream,
            Err(e) => {
                let close_url = self.client.endpoint(key, "close");
                let _ = self
                    .client
                    .post(&close_url, &HandleRequest { handle: &handle })
                    .await;
                return Err(e);
            }
        };

        tracing::debug!(session_key = %key, handle = %handle, "bridge connection open");
        let reader = tokio::spawn(read_events(stream, events, key.to_owned()));

        Ok(Arc::new(BridgeHandle {
            client: self.client.clone(),
            key: key.to_owned(),
            handle,
            reader: Mutex::new(Some(reader)),
        }))
    }
}

/// Forward bridge frames to the session until a close frame or the end of
/// the stream. An end without a close frame is reported as `Close` with no
/// code.
async fn read_events(mut stream: EventStream, events: mpsc::Sender<TransportEvent>, key: String) {
    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(session_key = %key, error = %e, "bridge event stream error");
                break;
            }
        };

        let event = match serde_json::from_str::<BridgeFrame>(&text)
            .map_err(Error::from)
            .and_then(BridgeFrame::into_event)
        {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(session_key = %key, error = %e, "ignoring malformed bridge frame");
                continue;
            }
        };

        let is_close = matches!(event, TransportEvent::Close { .. });
        if events.send(event).await.is_err() || is_close {
            return;
        }
    }
    let _ = events.send(TransportEvent::Close { code: None }).await;
}

struct BridgeHandle {
    client: Arc<BridgeClient>,
    key: String,
    handle: String,
    reader: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl TransportHandle for BridgeHandle {
    async fn send(&self, address: &str, text: &str) -> Result<MessageId> {
        let url = self.client.endpoint(&self.key, "messages");
        let body = SendRequest {
            handle: &self.handle,
            to: address,
            text,
        };
        let resp = self
            .client
            .post(&url, &body)
            .await
            .map_err(|e| Error::send_failed(address, e))?;
        let SendResponse { id } = resp
            .json()
            .await
            .map_err(|e| Error::send_failed(address, format!("bad response: {e}")))?;
        Ok(MessageId(id))
    }

    async fn logout(&self) -> Result<()> {
        let url = self.client.endpoint(&self.key, "logout");
        self.client
            .post(&url, &HandleRequest { handle: &self.handle })
            .await
            .map(|_| ())
            .map_err(|e| Error::Transport(format!("logout: {e}")))
    }

    async fn close(&self) -> Result<()> {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        let url = self.client.endpoint(&self.key, "close");
        self.client
            .post(&url, &HandleRequest { handle: &self.handle })
            .await
            .map(|_| ())
            .map_err(|e| Error::Transport(format!("close: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(json: &str) -> Result<TransportEvent> {
        serde_json::from_str::<BridgeFrame>(json)
            .map_err(Error::from)
            .and_then(BridgeFrame::into_event)
    }

    #[test]
    fn parses_lifecycle_frames() {
        assert_eq!(frame(r#"{"type":"open"}"#).unwrap(), TransportEvent::Open);
        assert_eq!(
            frame(r#"{"type":"close","code":401}"#).unwrap(),
            TransportEvent::Close { code: Some(401) }
        );
        assert_eq!(
            frame(r#"{"type":"close"}"#).unwrap(),
            TransportEvent::Close { code: None }
        );
        assert_eq!(
            frame(r#"{"type":"pairing","code":"2@abc"}"#).unwrap(),
            TransportEvent::PairingChallenge {
                code: "2@abc".into()
            }
        );
    }

    #[test]
    fn credentials_are_hex_decoded() {
        let event = frame(r#"{"type":"credentials","files":{"creds.json":"7b7d"}}"#).unwrap();
        match event {
            TransportEvent::CredentialsUpdated(state) => {
                assert_eq!(state.files["creds.json"], b"{}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn bad_hex_is_rejected() {
        let err = frame(r#"{"type":"credentials","files":{"a":"zz"}}"#).unwrap_err();
        assert!(err.to_string().contains("credential file a"));
    }

    #[test]
    fn unknown_frame_type_is_an_error() {
        assert!(frame(r#"{"type":"presence"}"#).is_err());
    }

    #[test]
    fn endpoints_join_under_base() {
        let transport = BridgeTransport::new(&BridgeConfig {
            base_url: "http://bridge:9000/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            transport.client.endpoint("s1", "messages"),
            "http://bridge:9000/sessions/s1/messages"
        );
        assert_eq!(transport.client.events_url, "ws://bridge:9000");
    }
}
