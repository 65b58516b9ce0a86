use thiserror::Error;
use tokio_tungstenite::tungstenite;
use tts_core::CodecError;

/// Client error types
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Request to TTS server timed out")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("TTS server returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] CodecError),

    #[error("Input stream is closed")]
    InputClosed,
}

impl TtsError {
    /// Errors that end a stream. Protocol errors on inbound frames do not.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TtsError::Protocol(_))
    }
}

impl From<tungstenite::Error> for TtsError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            // Status errors belong to the chunked path; a refused upgrade is a connect failure
            tungstenite::Error::Http(resp) => {
                let status = resp.status();
                TtsError::Connection(format!(
                    "WebSocket upgrade rejected with status {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("")
                ))
            }
            other => TtsError::Connection(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for TtsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TtsError::Timeout
        } else if let Some(status) = e.status() {
            TtsError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            TtsError::Connection(e.to_string())
        }
    }
}
