//! Client for a local streaming text-to-speech server.
//!
//! [`LocalTts`] hands out two kinds of synthesis requests:
//!
//! - [`SynthesizeStream`]: incremental text in, segmented PCM out, over a
//!   duplex WebSocket session
//! - [`ChunkedStream`]: one complete text per HTTP request
//!
//! ```no_run
//! # async fn demo() -> Result<(), tts_client::TtsError> {
//! use tts_client::{ConnectOptions, LocalTts, TtsOptions};
//! use tts_core::PcmBuffer;
//!
//! let tts = LocalTts::new(TtsOptions::default())?;
//! let stream = tts.stream(ConnectOptions::default());
//! stream.push_text("Hello world.")?;
//! stream.end_input()?;
//!
//! let mut audio = PcmBuffer::new();
//! stream.run(&mut audio).await?;
//! # Ok(())
//! # }
//! ```
pub mod chunked;
pub mod config;
mod demux;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod session;
pub mod stream;
pub mod validation;

use std::sync::{Arc, RwLock, RwLockReadGuard};

use tracing::info;
use tts_core::{SentenceTokenizer, NUM_CHANNELS, SAMPLE_RATE};

pub use chunked::ChunkedStream;
pub use config::{ConnectOptions, OptionsUpdate, TtsOptions};
pub use error::TtsError;
pub use metrics::{MetricsSnapshot, StreamTimings, TtsMetrics};
pub use registry::StreamRegistry;
pub use session::{DuplexSession, SessionConnector, WsConnector};
pub use stream::{StreamAbortHandle, StreamOutcome, StreamState, SynthesizeStream, TextInput, TextWriter};

use crate::config::STREAM_WS_PATH;
use crate::validation::validate_options;

/// Entry point: owns options, the connector, and every stream it created.
pub struct LocalTts {
    opts: Arc<RwLock<TtsOptions>>,
    connector: Arc<dyn SessionConnector>,
    tokenizer: SentenceTokenizer,
    http: reqwest::Client,
    streams: StreamRegistry,
    metrics: TtsMetrics,
}

impl LocalTts {
    pub fn new(opts: TtsOptions) -> Result<Self, TtsError> {
        validate_options(&opts)?;
        let connector = Arc::new(WsConnector::new(opts.ws_url(STREAM_WS_PATH)));

        Ok(Self {
            opts: Arc::new(RwLock::new(opts)),
            connector,
            tokenizer: SentenceTokenizer::default(),
            http: reqwest::Client::new(),
            streams: StreamRegistry::new(),
            metrics: TtsMetrics::new(),
        })
    }

    /// Replace the session transport, e.g. with an in-memory one.
    pub fn with_connector(mut self, connector: Arc<dyn SessionConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: SentenceTokenizer) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    fn read_opts(&self) -> RwLockReadGuard<'_, TtsOptions> {
        self.opts.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn options(&self) -> TtsOptions {
        self.read_opts().clone()
    }

    /// Overwrite the fields present in `update`. Streams already created
    /// keep the options they were created with.
    pub fn update_options(&self, update: OptionsUpdate) -> Result<(), TtsError> {
        let mut next = self.options();
        next.apply(update);
        validate_options(&next)?;

        *self.opts.write().unwrap_or_else(|e| e.into_inner()) = next;
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    pub fn num_channels(&self) -> u16 {
        NUM_CHANNELS
    }

    /// Create a streaming request. Nothing is sent until it is run.
    pub fn stream(&self, conn_options: ConnectOptions) -> SynthesizeStream {
        let mut stream = SynthesizeStream::new(
            self.options(),
            conn_options,
            self.connector.clone(),
            self.tokenizer,
            self.metrics.clone(),
        );
        let registration = self.streams.register(stream.id(), stream.abort_handle());
        stream.set_registration(registration);
        stream
    }

    /// Create a single-request synthesis of `text`.
    pub fn synthesize(&self, text: impl Into<String>, conn_options: ConnectOptions) -> ChunkedStream {
        ChunkedStream::new(
            text,
            self.options(),
            conn_options,
            self.http.clone(),
            self.metrics.clone(),
        )
    }

    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    pub fn metrics(&self) -> &TtsMetrics {
        &self.metrics
    }

    /// Abort every stream this client created and wait for the running
    /// ones to finish.
    pub async fn close(&self) {
        let handles = self.streams.handles();
        if !handles.is_empty() {
            info!("Closing {} active stream(s)", handles.len());
        }

        for handle in &handles {
            handle.abort();
        }
        for handle in &handles {
            // Idle streams never started and have nothing to wait for
            if handle.state() != StreamState::Idle {
                handle.closed().await;
            }
        }
        self.streams.clear();
    }
}
