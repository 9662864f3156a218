/// Shared error type used across all Herald crates.
///
/// The first group of variants is the session taxonomy: request-validation
/// errors (`AlreadyRunning`, `NotFound`, `ConfigInvalid`, `InvalidKey`) are the
/// only ones that ever reach a caller synchronously. The rest stay inside the
/// owning session and surface through its log.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("session {0} is already running")]
    AlreadyRunning(String),

    #[error("no active session named {0}")]
    NotFound(String),

    #[error("invalid session config: {0}")]
    ConfigInvalid(String),

    #[error("invalid session key: {0}")]
    InvalidKey(String),

    #[error("send to {address} failed: {message}")]
    SendFailed { address: String, message: String },

    #[error("transport closed (code: {code:?})")]
    TransportClosed { code: Option<u16> },

    #[error("session {0} logged out")]
    LoggedOut(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a per-recipient send failure.
    pub fn send_failed(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SendFailed {
            address: address.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_failed_message_names_address() {
        let err = Error::send_failed("91999@s.whatsapp.net", "rate limited");
        assert_eq!(
            err.to_string(),
            "send to 91999@s.whatsapp.net failed: rate limited"
        );
    }

    #[test]
    fn transport_closed_without_code() {
        let err = Error::TransportClosed { code: None };
        assert_eq!(err.to_string(), "transport closed (code: None)");
    }
}
