//! Maps inbound frames onto emitter segment boundaries.
use tracing::{debug, info, warn};
use tts_core::{short_id, AudioEmitter, ControlKind, Frame};

use crate::metrics::{StreamTimings, TtsMetrics};

/// Tracks the single open segment of a stream's output.
///
/// The first open signal (a `start` control frame or an audio chunk)
/// wins; further starts are ignored while a segment is open. `end`
/// control frames do not close the segment, only [`finish`] does.
///
/// [`finish`]: SegmentDemuxer::finish
pub(crate) struct SegmentDemuxer<'a> {
    emitter: &'a mut dyn AudioEmitter,
    open_segment: Option<String>,
    timings: StreamTimings,
    metrics: TtsMetrics,
}

impl<'a> SegmentDemuxer<'a> {
    pub(crate) fn new(emitter: &'a mut dyn AudioEmitter, timings: StreamTimings, metrics: TtsMetrics) -> Self {
        Self {
            emitter,
            open_segment: None,
            timings,
            metrics,
        }
    }

    pub(crate) fn handle(&mut self, frame: Frame) {
        match frame {
            Frame::Binary(data) => self.push_audio(&data),
            Frame::Control(msg) => match msg.kind {
                ControlKind::Start => {
                    let id = msg.segment_id.unwrap_or_else(short_id);
                    self.open(id);
                }
                ControlKind::End => {}
                ControlKind::Unknown(kind) => {
                    warn!("Unknown text message from TTS server: type={kind}");
                }
            },
            Frame::Close => {}
        }
    }

    fn open(&mut self, id: String) -> bool {
        if let Some(open) = &self.open_segment {
            debug!("Ignoring start of segment {id}, segment {open} is still open");
            return false;
        }
        debug!("Starting segment {id}");
        self.emitter.start_segment(&id);
        self.open_segment = Some(id);
        true
    }

    fn push_audio(&mut self, data: &[u8]) {
        if self.open_segment.is_none() {
            self.open(short_id());
        }

        if let Some(ttfa) = self.timings.mark_first_audio() {
            info!("Time to first audio chunk: {:.2} ms", ttfa.as_secs_f64() * 1000.0);
            self.metrics.time_to_first_audio.record(ttfa.as_millis() as u64);
        }

        self.metrics.record_audio(data.len());
        self.emitter.push(data);
    }

    pub(crate) fn open_segment(&self) -> Option<&str> {
        self.open_segment.as_deref()
    }

    /// End the open segment, if any. Safe to call more than once.
    pub(crate) fn finish(&mut self) {
        if let Some(id) = self.open_segment.take() {
            debug!("Ending segment {id}");
            self.emitter.end_segment();
        }
    }

    pub(crate) fn flush(&mut self) {
        self.emitter.flush();
    }
}
