//! Protocol building blocks for the streaming TTS client.
//!
//! Everything in here is transport-agnostic: the wire codec for the
//! duplex synthesis protocol, the incremental sentence segmenter that
//! feeds it, and the audio emitters that receive the decoded PCM.
pub mod codec;
pub mod emitter;
pub mod segmenter;
pub mod wav;

pub use codec::{
    decode_control, decode_frame, encode_request, CodecError, ControlKind, ControlMessage, Frame,
    FrameKind, SynthesisRequest, FINAL_SEGMENT_ID,
};
pub use emitter::{AudioEmitter, AudioEvent, AudioSegment, ChannelEmitter, EmitterConfig, PcmBuffer};
pub use segmenter::{SegmenterHandle, SentenceBuffer, SentenceStream, SentenceTokenizer};

/// Output sample rate of the synthesis server. Not negotiated.
pub const SAMPLE_RATE: u32 = 24_000;
/// The server always produces mono audio.
pub const NUM_CHANNELS: u16 = 1;
/// Frame duration handed to emitters that slice audio.
pub const AUDIO_FRAME_SIZE_MS: u32 = 20;
/// Raw little-endian 16-bit PCM.
pub const PCM_MIME_TYPE: &str = "audio/pcm";
/// Bytes per sample of the PCM stream
pub const BYTES_PER_SAMPLE: usize = 2;

/// Short random identifier used for request and segment ids.
pub fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}
