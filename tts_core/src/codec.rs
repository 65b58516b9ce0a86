//! Wire codec for the duplex synthesis protocol.
//!
//! Outgoing requests are JSON text frames. Incoming frames are either raw
//! PCM (binary) or small JSON control messages such as
//! `{"type": "start", "segment_id": "..."}`.
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Segment id carried by the terminal request.
pub const FINAL_SEGMENT_ID: &str = "final";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Control frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("Malformed control frame ({reason}): {raw}")]
    Malformed { reason: String, raw: String },
}

/// A single synthesis request sent to the server.
///
/// Field order is the serialization order, so encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub voice: String,
    pub input: String,
    #[serde(rename = "continue")]
    pub continue_input: bool,
    pub segment_id: String,
}

impl SynthesisRequest {
    /// Request for one sentence token of an ongoing utterance.
    pub fn token(voice: &str, sentence: &str, segment_id: String) -> Self {
        Self {
            voice: voice.to_string(),
            input: format!("{sentence} "),
            continue_input: true,
            segment_id,
        }
    }

    /// End-of-input marker. Sent exactly once per stream, after every token.
    pub fn terminal(voice: &str) -> Self {
        Self {
            voice: voice.to_string(),
            input: String::new(),
            continue_input: false,
            segment_id: FINAL_SEGMENT_ID.to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !self.continue_input && self.input.is_empty()
    }
}

pub fn encode_request(req: &SynthesisRequest) -> Result<String, CodecError> {
    Ok(serde_json::to_string(req)?)
}

/// Wire type of a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    Start,
    End,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub kind: ControlKind,
    pub segment_id: Option<String>,
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Vec<u8>),
    Control(ControlMessage),
    Close,
}

#[derive(Deserialize)]
struct RawControl {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    segment_id: Option<String>,
}

pub fn decode_frame(kind: FrameKind, payload: &[u8]) -> Result<Frame, CodecError> {
    match kind {
        FrameKind::Binary => Ok(Frame::Binary(payload.to_vec())),
        FrameKind::Close => Ok(Frame::Close),
        FrameKind::Text => {
            let text = std::str::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8)?;
            decode_control(text).map(Frame::Control)
        }
    }
}

pub fn decode_control(text: &str) -> Result<ControlMessage, CodecError> {
    let raw: RawControl = serde_json::from_str(text).map_err(|e| CodecError::Malformed {
        reason: e.to_string(),
        raw: text.to_string(),
    })?;

    let kind = match raw.kind.as_str() {
        "start" => ControlKind::Start,
        "end" => ControlKind::End,
        _ => ControlKind::Unknown(raw.kind),
    };

    Ok(ControlMessage {
        kind,
        segment_id: raw.segment_id,
    })
}
