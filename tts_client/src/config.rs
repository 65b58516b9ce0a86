// Client options and connection settings

use std::time::Duration;

/// HTTP path of the single-request endpoint.
pub const CHUNKED_PATH: &str = "/v1/audio/speech/stream";
/// WebSocket path of the streaming endpoint.
pub const STREAM_WS_PATH: &str = "/v1/audio/speech/stream/ws";
/// Total time budget of a chunked request.
pub const CHUNKED_TOTAL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtsOptions {
    pub voice: String,
    pub language: String,
    pub base_url: String,
}

impl Default for TtsOptions {
    fn default() -> Self {
        Self {
            voice: "tara".to_string(),
            language: "en".to_string(),
            base_url: "http://localhost:9090".to_string(),
        }
    }
}

impl TtsOptions {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let voice = std::env::var("TTS_VOICE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.voice);

        let language = std::env::var("TTS_LANGUAGE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.language);

        let base_url = std::env::var("TTS_BASE_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.base_url);

        Self {
            voice,
            language,
            base_url,
        }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `http://` becomes `ws://`, `https://` becomes `wss://`.
    pub fn ws_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.replacen("http", "ws", 1), path)
    }

    pub fn apply(&mut self, update: OptionsUpdate) {
        if let Some(voice) = update.voice {
            self.voice = voice;
        }
        if let Some(language) = update.language {
            self.language = language;
        }
    }
}

/// Partial option update. Only fields that are `Some` are overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsUpdate {
    pub voice: Option<String>,
    pub language: Option<String>,
}

impl OptionsUpdate {
    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Per-request connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    pub timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectOptions {
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("TTS_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}
