//! Single-request synthesis over HTTP with a chunked audio response.
use std::sync::atomic::Ordering;

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info};
use tts_core::{short_id, AudioEmitter, EmitterConfig};

use crate::config::{ConnectOptions, TtsOptions, CHUNKED_PATH, CHUNKED_TOTAL_TIMEOUT};
use crate::error::TtsError;
use crate::metrics::TtsMetrics;
use crate::validation::validate_text;

#[derive(Serialize)]
struct ChunkedRequest<'a> {
    input: &'a str,
    voice: &'a str,
}

/// Synthesizes one complete text. Not segmented: the whole response is
/// a single unframed audio stream.
pub struct ChunkedStream {
    text: String,
    opts: TtsOptions,
    conn_options: ConnectOptions,
    client: reqwest::Client,
    metrics: TtsMetrics,
}

impl ChunkedStream {
    pub fn new(
        text: impl Into<String>,
        opts: TtsOptions,
        conn_options: ConnectOptions,
        client: reqwest::Client,
        metrics: TtsMetrics,
    ) -> Self {
        Self {
            text: text.into(),
            opts,
            conn_options,
            client,
            metrics,
        }
    }

    pub async fn run(self, emitter: &mut dyn AudioEmitter) -> Result<(), TtsError> {
        validate_text(&self.text)?;
        self.metrics.chunked_requests.fetch_add(1, Ordering::Relaxed);

        let url = self.opts.http_url(CHUNKED_PATH);
        debug!("POST {url} ({} chars)", self.text.chars().count());

        let request = self
            .client
            .post(&url)
            .timeout(CHUNKED_TOTAL_TIMEOUT)
            .json(&ChunkedRequest {
                input: &self.text,
                voice: &self.opts.voice,
            });

        let response = tokio::time::timeout(self.conn_options.timeout, request.send())
            .await
            .map_err(|_| TtsError::Timeout)??
            .error_for_status()?;

        let request_id = short_id();
        emitter.initialize(EmitterConfig::pcm(request_id.as_str(), false));

        let mut body = response.bytes_stream();
        let mut total = 0usize;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            total += chunk.len();
            self.metrics.record_audio(chunk.len());
            emitter.push(&chunk);
        }
        emitter.flush();

        info!("Chunked request {request_id} finished: {total} bytes of audio");
        Ok(())
    }
}
