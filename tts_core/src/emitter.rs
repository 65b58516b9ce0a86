//! Audio sinks driven by the synthesis streams.
use std::path::Path;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{short_id, AUDIO_FRAME_SIZE_MS, BYTES_PER_SAMPLE, NUM_CHANNELS, PCM_MIME_TYPE, SAMPLE_RATE};

/// Format announced to an emitter before any audio arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmitterConfig {
    pub request_id: String,
    pub sample_rate: u32,
    pub num_channels: u16,
    pub mime_type: String,
    pub frame_size_ms: u32,
    pub streaming: bool,
}

impl EmitterConfig {
    /// Raw PCM at the protocol's fixed rate and layout.
    pub fn pcm(request_id: impl Into<String>, streaming: bool) -> Self {
        Self {
            request_id: request_id.into(),
            sample_rate: SAMPLE_RATE,
            num_channels: NUM_CHANNELS,
            mime_type: PCM_MIME_TYPE.to_string(),
            frame_size_ms: AUDIO_FRAME_SIZE_MS,
            streaming,
        }
    }

    /// Size in bytes of one `frame_size_ms` frame.
    pub fn frame_bytes(&self) -> usize {
        let samples = self.sample_rate as usize * self.frame_size_ms as usize / 1000;
        samples * self.num_channels as usize * BYTES_PER_SAMPLE
    }
}

/// Downstream sink for synthesized audio.
///
/// Streaming producers call `start_segment` before the first `push` of a
/// segment and `end_segment` exactly once per started segment.
pub trait AudioEmitter: Send {
    fn initialize(&mut self, config: EmitterConfig);
    fn start_segment(&mut self, segment_id: &str);
    fn push(&mut self, data: &[u8]);
    fn end_segment(&mut self);
    fn flush(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    pub id: String,
    pub pcm: Vec<u8>,
}

/// Collects audio in memory, one entry per segment.
#[derive(Debug, Default)]
pub struct PcmBuffer {
    config: Option<EmitterConfig>,
    segments: Vec<AudioSegment>,
    open: bool,
    flush_count: usize,
}

impl PcmBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<&EmitterConfig> {
        self.config.as_ref()
    }

    pub fn segments(&self) -> &[AudioSegment] {
        &self.segments
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count
    }

    pub fn total_bytes(&self) -> usize {
        self.segments.iter().map(|s| s.pcm.len()).sum()
    }

    /// All segments concatenated in order.
    pub fn pcm(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_bytes());
        for segment in &self.segments {
            out.extend_from_slice(&segment.pcm);
        }
        out
    }

    pub fn duration_ms(&self) -> u64 {
        let (sample_rate, channels) = self
            .config
            .as_ref()
            .map(|c| (c.sample_rate, c.num_channels))
            .unwrap_or((SAMPLE_RATE, NUM_CHANNELS));
        let samples = self.total_bytes() / (BYTES_PER_SAMPLE * channels as usize);
        (samples as f64 / sample_rate as f64 * 1000.0) as u64
    }

    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let (sample_rate, channels) = self
            .config
            .as_ref()
            .map(|c| (c.sample_rate, c.num_channels))
            .unwrap_or((SAMPLE_RATE, NUM_CHANNELS));
        crate::wav::write_wav(path, &self.pcm(), sample_rate, channels)
    }
}

impl AudioEmitter for PcmBuffer {
    fn initialize(&mut self, config: EmitterConfig) {
        self.config = Some(config);
    }

    fn start_segment(&mut self, segment_id: &str) {
        if self.open {
            warn!("start_segment({segment_id}) while a segment is open, previous segment left unterminated");
        }
        self.segments.push(AudioSegment {
            id: segment_id.to_string(),
            pcm: Vec::new(),
        });
        self.open = true;
    }

    fn push(&mut self, data: &[u8]) {
        if !self.open {
            // Non-streaming producers never start segments
            let streaming = self.config.as_ref().map(|c| c.streaming).unwrap_or(false);
            if streaming {
                warn!("Audio pushed outside of a segment, opening an implicit one");
            }
            self.start_segment(&short_id());
        }
        if let Some(segment) = self.segments.last_mut() {
            segment.pcm.extend_from_slice(data);
        }
    }

    fn end_segment(&mut self) {
        if !self.open {
            warn!("end_segment without an open segment");
        }
        self.open = false;
    }

    fn flush(&mut self) {
        self.open = false;
        self.flush_count += 1;
    }
}

/// Events forwarded by [`ChannelEmitter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioEvent {
    Initialized(EmitterConfig),
    SegmentStarted(String),
    Audio(Vec<u8>),
    SegmentEnded,
    Flushed,
}

/// Forwards every emitter call over an unbounded channel.
///
/// In framed mode audio is re-chunked into `frame_size_ms` frames; the
/// remainder is sent when the segment ends or the emitter is flushed.
#[derive(Debug)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<AudioEvent>,
    framed: bool,
    frame_bytes: usize,
    pending: Vec<u8>,
}

impl ChannelEmitter {
    pub fn new(tx: mpsc::UnboundedSender<AudioEvent>) -> Self {
        Self {
            tx,
            framed: false,
            frame_bytes: 0,
            pending: Vec::new(),
        }
    }

    pub fn framed(tx: mpsc::UnboundedSender<AudioEvent>) -> Self {
        Self {
            framed: true,
            ..Self::new(tx)
        }
    }

    /// Emitter plus the receiving end of its event channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AudioEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: AudioEvent) {
        // A dropped receiver only means nobody is listening anymore
        let _ = self.tx.send(event);
    }

    fn drain_pending(&mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.send(AudioEvent::Audio(rest));
        }
    }
}

impl AudioEmitter for ChannelEmitter {
    fn initialize(&mut self, config: EmitterConfig) {
        self.frame_bytes = config.frame_bytes();
        self.send(AudioEvent::Initialized(config));
    }

    fn start_segment(&mut self, segment_id: &str) {
        self.send(AudioEvent::SegmentStarted(segment_id.to_string()));
    }

    fn push(&mut self, data: &[u8]) {
        if !self.framed || self.frame_bytes == 0 {
            self.send(AudioEvent::Audio(data.to_vec()));
            return;
        }

        self.pending.extend_from_slice(data);
        while self.pending.len() >= self.frame_bytes {
            let frame: Vec<u8> = self.pending.drain(..self.frame_bytes).collect();
            self.send(AudioEvent::Audio(frame));
        }
    }

    fn end_segment(&mut self) {
        self.drain_pending();
        self.send(AudioEvent::SegmentEnded);
    }

    fn flush(&mut self) {
        self.drain_pending();
        self.send(AudioEvent::Flushed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bytes_for_protocol_defaults() {
        let config = EmitterConfig::pcm("req", true);
        assert_eq!(config.frame_bytes(), 960);
        assert_eq!(config.mime_type, "audio/pcm");
        assert_eq!(config.sample_rate, 24_000);
    }

    #[test]
    fn test_pcm_buffer_keeps_segments_in_order() {
        let mut buf = PcmBuffer::new();
        buf.initialize(EmitterConfig::pcm("req", true));
        buf.start_segment("a");
        buf.push(&[1, 2]);
        buf.push(&[3, 4]);
        buf.end_segment();
        buf.start_segment("b");
        buf.push(&[5, 6]);
        buf.end_segment();
        buf.flush();

        assert_eq!(buf.segments().len(), 2);
        assert_eq!(buf.segments()[0].id, "a");
        assert_eq!(buf.segments()[0].pcm, vec![1, 2, 3, 4]);
        assert_eq!(buf.pcm(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(buf.flush_count(), 1);
    }

    #[test]
    fn test_pcm_buffer_start_while_open_begins_new_segment() {
        let mut buf = PcmBuffer::new();
        buf.initialize(EmitterConfig::pcm("r", true));
        buf.start_segment("a");
        buf.push(&[1, 0]);
        buf.start_segment("b");
        buf.push(&[2, 0]);
        buf.end_segment();

        let ids: Vec<&str> = buf.segments().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(buf.segments()[0].pcm, vec![1, 0]);
        assert_eq!(buf.segments()[1].pcm, vec![2, 0]);
    }

    #[test]
    fn test_pcm_buffer_implicit_segment_for_chunked_audio() {
        let mut buf = PcmBuffer::new();
        buf.initialize(EmitterConfig::pcm("req", false));
        buf.push(&[0; 480]);
        buf.push(&[0; 480]);
        buf.flush();

        assert_eq!(buf.segments().len(), 1);
        assert_eq!(buf.total_bytes(), 960);
        assert_eq!(buf.duration_ms(), 20);
    }

    #[test]
    fn test_channel_emitter_forwards_calls() {
        let (mut emitter, mut rx) = ChannelEmitter::channel();
        emitter.start_segment("s1");
        emitter.push(&[9, 9]);
        emitter.end_segment();
        emitter.flush();

        assert_eq!(rx.try_recv().unwrap(), AudioEvent::SegmentStarted("s1".into()));
        assert_eq!(rx.try_recv().unwrap(), AudioEvent::Audio(vec![9, 9]));
        assert_eq!(rx.try_recv().unwrap(), AudioEvent::SegmentEnded);
        assert_eq!(rx.try_recv().unwrap(), AudioEvent::Flushed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_framed_emitter_slices_audio() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut emitter = ChannelEmitter::framed(tx);
        emitter.initialize(EmitterConfig::pcm("req", true));
        emitter.start_segment("s1");
        emitter.push(&vec![1u8; 1500]);
        emitter.push(&vec![2u8; 500]);
        emitter.end_segment();

        assert!(matches!(rx.try_recv().unwrap(), AudioEvent::Initialized(_)));
        assert!(matches!(rx.try_recv().unwrap(), AudioEvent::SegmentStarted(_)));
        let sizes: Vec<usize> = std::iter::from_fn(|| match rx.try_recv() {
            Ok(AudioEvent::Audio(frame)) => Some(frame.len()),
            _ => None,
        })
        .collect();
        // 2000 bytes: two full 960-byte frames and an 80-byte tail at segment end
        assert_eq!(sizes, vec![960, 960, 80]);
    }
}
