//! Streaming synthesis over one duplex session.
//!
//! A [`SynthesizeStream`] runs three activities against a single
//! connection:
//!
//! - ingest: forwards caller text and flush/end signals to the segmenter
//! - send: turns each sentence into a synthesis request, then sends the
//!   terminal request
//! - receive: demuxes server frames into emitter segments
//!
//! The first activity to fail cancels the other two; all three are
//! awaited before the session is closed and the open segment ended.
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use tts_core::{
    encode_request, short_id, AudioEmitter, EmitterConfig, Frame, SegmenterHandle, SentenceStream,
    SentenceTokenizer, SynthesisRequest,
};

use crate::config::{ConnectOptions, TtsOptions};
use crate::demux::SegmentDemuxer;
use crate::error::TtsError;
use crate::metrics::{StreamTimings, TtsMetrics};
use crate::registry::Registration;
use crate::session::{DuplexSession, SessionConnector};

/// Caller-to-stream input, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextInput {
    Text(String),
    /// Emit buffered text now, without ending the stream.
    Flush,
    EndInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Aborted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Streaming,
    Draining,
    Closed(StreamOutcome),
}

impl StreamState {
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed(_))
    }
}

/// Cloneable text input of a stream.
#[derive(Debug, Clone)]
pub struct TextWriter {
    tx: mpsc::UnboundedSender<TextInput>,
    timings: StreamTimings,
}

impl TextWriter {
    pub fn push_text(&self, text: impl Into<String>) -> Result<(), TtsError> {
        self.timings.mark_first_push();
        self.send(TextInput::Text(text.into()))
    }

    pub fn flush(&self) -> Result<(), TtsError> {
        self.send(TextInput::Flush)
    }

    pub fn end_input(&self) -> Result<(), TtsError> {
        self.send(TextInput::EndInput)
    }

    fn send(&self, input: TextInput) -> Result<(), TtsError> {
        self.tx.send(input).map_err(|_| TtsError::InputClosed)
    }
}

/// Aborts a stream from outside and observes its state.
#[derive(Debug, Clone)]
pub struct StreamAbortHandle {
    cancel: Arc<watch::Sender<bool>>,
    state: watch::Receiver<StreamState>,
}

impl StreamAbortHandle {
    pub fn abort(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Resolves once the stream is closed, or was dropped without running.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| s.is_closed()).await;
    }
}

/// A single-use streaming synthesis request.
pub struct SynthesizeStream {
    id: String,
    opts: TtsOptions,
    conn_options: ConnectOptions,
    connector: Arc<dyn SessionConnector>,
    tokenizer: SentenceTokenizer,
    writer: TextWriter,
    input_rx: mpsc::UnboundedReceiver<TextInput>,
    timings: StreamTimings,
    cancel: Arc<watch::Sender<bool>>,
    state: watch::Sender<StreamState>,
    metrics: TtsMetrics,
    registration: Option<Registration>,
}

impl SynthesizeStream {
    pub fn new(
        opts: TtsOptions,
        conn_options: ConnectOptions,
        connector: Arc<dyn SessionConnector>,
        tokenizer: SentenceTokenizer,
        metrics: TtsMetrics,
    ) -> Self {
        let (tx, input_rx) = mpsc::unbounded_channel();
        let timings = StreamTimings::default();
        let (cancel, _) = watch::channel(false);
        let (state, _) = watch::channel(StreamState::Idle);

        Self {
            id: short_id(),
            opts,
            conn_options,
            connector,
            tokenizer,
            writer: TextWriter {
                tx,
                timings: timings.clone(),
            },
            input_rx,
            timings,
            cancel: Arc::new(cancel),
            state,
            metrics,
            registration: None,
        }
    }

    pub(crate) fn set_registration(&mut self, registration: Registration) {
        self.registration = Some(registration);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &TtsOptions {
        &self.opts
    }

    pub fn writer(&self) -> TextWriter {
        self.writer.clone()
    }

    pub fn push_text(&self, text: impl Into<String>) -> Result<(), TtsError> {
        self.writer.push_text(text)
    }

    pub fn flush(&self) -> Result<(), TtsError> {
        self.writer.flush()
    }

    pub fn end_input(&self) -> Result<(), TtsError> {
        self.writer.end_input()
    }

    pub fn abort_handle(&self) -> StreamAbortHandle {
        StreamAbortHandle {
            cancel: self.cancel.clone(),
            state: self.state.subscribe(),
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    pub fn timings(&self) -> StreamTimings {
        self.timings.clone()
    }

    /// Run the stream to completion, driving `emitter`.
    ///
    /// Input ends at `end_input`, or once every [`TextWriter`] has been
    /// dropped. An aborted stream returns `Ok(())` without flushing the
    /// emitter.
    pub async fn run(self, emitter: &mut dyn AudioEmitter) -> Result<(), TtsError> {
        let SynthesizeStream {
            id,
            opts,
            conn_options,
            connector,
            tokenizer,
            writer,
            input_rx,
            timings,
            cancel,
            state,
            metrics,
            mut registration,
        } = self;
        // From here on only the caller's writers keep the input open
        drop(writer);

        metrics.streams_started.fetch_add(1, Ordering::Relaxed);
        state.send_replace(StreamState::Connecting);

        let mut cancel_rx = cancel.subscribe();
        let connected = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => None,
            res = connector.connect(conn_options.timeout) => Some(res),
        };

        let session = match connected {
            None => {
                info!("Stream {id} aborted before connecting");
                conclude(&state, &metrics, &mut registration, StreamOutcome::Aborted);
                return Ok(());
            }
            Some(Err(e)) => {
                warn!("Stream {id} failed to connect: {e}");
                conclude(&state, &metrics, &mut registration, StreamOutcome::Failed);
                return Err(e);
            }
            Some(Ok(session)) => session,
        };

        let request_id = short_id();
        emitter.initialize(EmitterConfig::pcm(request_id.as_str(), true));
        state.send_replace(StreamState::Streaming);
        info!("Stream {id} connected (request {request_id}, voice {})", opts.voice);

        let (segmenter, sentences) = tokenizer.stream();
        let mut demux = SegmentDemuxer::new(emitter, timings.clone(), metrics.clone());
        let first_error: OnceLock<TtsError> = OnceLock::new();
        let cancelled_activities = {
            let session = session.as_ref();
            tokio::join!(
                supervise("ingest", forward_input(input_rx, segmenter), &cancel, &first_error),
                supervise(
                    "send",
                    send_sentences(session, sentences, &opts.voice, &timings, &metrics),
                    &cancel,
                    &first_error,
                ),
                supervise("receive", receive_frames(session, &mut demux), &cancel, &first_error),
            )
        };

        state.send_replace(StreamState::Draining);
        let error = first_error.into_inner();
        // An abort that lands after every activity finished does not count
        let aborted = error.is_none()
            && matches!(cancelled_activities, (true, _, _) | (_, true, _) | (_, _, true));

        demux.finish();
        if error.is_none() && !aborted {
            demux.flush();
        }
        session.close().await;

        let outcome = match (&error, aborted) {
            (Some(_), _) => StreamOutcome::Failed,
            (None, true) => StreamOutcome::Aborted,
            (None, false) => StreamOutcome::Completed,
        };
        info!("Stream {id} closed: {outcome:?}");
        conclude(&state, &metrics, &mut registration, outcome);

        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn conclude(
    state: &watch::Sender<StreamState>,
    metrics: &TtsMetrics,
    registration: &mut Option<Registration>,
    outcome: StreamOutcome,
) {
    let counter = match outcome {
        StreamOutcome::Completed => &metrics.streams_completed,
        StreamOutcome::Aborted => &metrics.streams_aborted,
        StreamOutcome::Failed => &metrics.streams_failed,
    };
    counter.fetch_add(1, Ordering::Relaxed);

    if let Some(mut registration) = registration.take() {
        registration.release();
    }
    state.send_replace(StreamState::Closed(outcome));
}

async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    if cancel_rx.wait_for(|cancelled| *cancelled).await.is_err() {
        // The stream owns the sender; without it there is nobody left to cancel
        std::future::pending::<()>().await;
    }
}

/// Runs one activity until it finishes or the stream is cancelled.
///
/// The first failing activity records its error and cancels the rest.
/// Returns true when the activity was cut short by cancellation.
async fn supervise<F>(name: &str, activity: F, cancel: &watch::Sender<bool>, first_error: &OnceLock<TtsError>) -> bool
where
    F: Future<Output = Result<(), TtsError>>,
{
    let mut cancel_rx = cancel.subscribe();
    let result = tokio::select! {
        biased;
        _ = cancelled(&mut cancel_rx) => {
            debug!("{name} activity cancelled");
            return true;
        }
        res = activity => res,
    };

    if let Err(e) = result {
        warn!("{name} activity failed: {e}");
        let _ = first_error.set(e);
        cancel.send_replace(true);
    }
    false
}

async fn forward_input(
    mut input_rx: mpsc::UnboundedReceiver<TextInput>,
    segmenter: SegmenterHandle,
) -> Result<(), TtsError> {
    while let Some(input) = input_rx.recv().await {
        match input {
            TextInput::Text(text) => segmenter.push_text(&text),
            TextInput::Flush => segmenter.flush(),
            TextInput::EndInput => break,
        }
    }
    segmenter.end_input();
    Ok(())
}

fn encode(request: &SynthesisRequest) -> Result<String, TtsError> {
    encode_request(request).map_err(|e| TtsError::Connection(e.to_string()))
}

async fn send_sentences(
    session: &dyn DuplexSession,
    mut sentences: SentenceStream,
    voice: &str,
    timings: &StreamTimings,
    metrics: &TtsMetrics,
) -> Result<(), TtsError> {
    while let Some(sentence) = sentences.next().await {
        let request = SynthesisRequest::token(voice, &sentence, short_id());
        if timings.mark_started() {
            debug!("Synthesis started");
        }
        debug!("Sending segment {} ({} chars)", request.segment_id, sentence.len());
        session.send(encode(&request)?).await?;
        metrics.record_request();
    }

    session.send(encode(&SynthesisRequest::terminal(voice))?).await?;
    metrics.record_request();
    debug!("Sent terminal request");
    Ok(())
}

async fn receive_frames(session: &dyn DuplexSession, demux: &mut SegmentDemuxer<'_>) -> Result<(), TtsError> {
    loop {
        match session.receive().await {
            Ok(Frame::Close) => {
                debug!("TTS server closed the stream");
                return Ok(());
            }
            Ok(frame) => demux.handle(frame),
            Err(e) if !e.is_fatal() => warn!("Ignoring malformed message from TTS server: {e}"),
            Err(e) => return Err(e),
        }
    }
}
