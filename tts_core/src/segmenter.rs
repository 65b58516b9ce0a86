//! Incremental sentence segmentation for streaming synthesis.
//!
//! Text arrives in arbitrary fragments (typically LLM tokens). The
//! segmenter buffers it and yields sentence-sized pieces as soon as a
//! boundary is certain, so the first sentence can be synthesized while
//! the rest of the reply is still being generated.
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;

const DEFAULT_MIN_SENTENCE_LEN: usize = 20;

/// Sentence tokenizer settings.
#[derive(Debug, Clone, Copy)]
pub struct SentenceTokenizer {
    /// Sentences shorter than this (in chars) are merged with the next one.
    pub min_sentence_len: usize,
}

impl Default for SentenceTokenizer {
    fn default() -> Self {
        Self {
            min_sentence_len: DEFAULT_MIN_SENTENCE_LEN,
        }
    }
}

impl SentenceTokenizer {
    pub fn new(min_sentence_len: usize) -> Self {
        Self { min_sentence_len }
    }

    /// Start a new incremental stream.
    ///
    /// The handle feeds text in; the stream yields sentences in order and
    /// terminates after `end_input` (or once every handle is dropped).
    pub fn stream(&self) -> (SegmenterHandle, SentenceStream) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let mut buffer = SentenceBuffer::new(self.min_sentence_len);

        let inner = async_stream::stream! {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Push(text) => {
                        for sentence in buffer.push(&text) {
                            yield sentence;
                        }
                    }
                    Command::Flush => {
                        if let Some(sentence) = buffer.flush() {
                            yield sentence;
                        }
                    }
                    Command::EndInput => break,
                }
            }
            if let Some(sentence) = buffer.flush() {
                yield sentence;
            }
        };

        (
            SegmenterHandle { tx },
            SentenceStream {
                inner: Box::pin(inner),
            },
        )
    }
}

enum Command {
    Push(String),
    Flush,
    EndInput,
}

/// Input side of a sentence stream.
#[derive(Debug, Clone)]
pub struct SegmenterHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Push(text) => f.debug_tuple("Push").field(text).finish(),
            Command::Flush => f.write_str("Flush"),
            Command::EndInput => f.write_str("EndInput"),
        }
    }
}

impl SegmenterHandle {
    pub fn push_text(&self, text: &str) {
        if self.tx.send(Command::Push(text.to_string())).is_err() {
            tracing::debug!("Sentence stream already finished, dropping pushed text");
        }
    }

    /// Emit whatever is buffered now, without waiting for a boundary.
    pub fn flush(&self) {
        let _ = self.tx.send(Command::Flush);
    }

    pub fn end_input(&self) {
        let _ = self.tx.send(Command::EndInput);
    }
}

/// Output side of a sentence stream. Consumed exactly once.
pub struct SentenceStream {
    inner: Pin<Box<dyn Stream<Item = String> + Send>>,
}

impl Stream for SentenceStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Synchronous sentence buffer behind [`SentenceStream`].
#[derive(Debug, Default)]
pub struct SentenceBuffer {
    min_sentence_len: usize,
    buffer: String,
    // complete sentences still below the minimum length
    pending: String,
}

impl SentenceBuffer {
    pub fn new(min_sentence_len: usize) -> Self {
        Self {
            min_sentence_len,
            buffer: String::new(),
            pending: String::new(),
        }
    }

    /// Append text and return every sentence that is now complete.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let mut out = Vec::new();
        while let Some(end) = find_boundary(&self.buffer) {
            let sentence = self.buffer[..end].trim().to_string();
            self.buffer.drain(..end);
            if sentence.is_empty() {
                continue;
            }

            if !self.pending.is_empty() {
                self.pending.push(' ');
            }
            self.pending.push_str(&sentence);

            if self.pending.chars().count() >= self.min_sentence_len {
                out.push(std::mem::take(&mut self.pending));
            }
        }
        out
    }

    /// Drain everything buffered, regardless of boundaries or length.
    pub fn flush(&mut self) -> Option<String> {
        let rest = self.buffer.trim();
        if !rest.is_empty() {
            if !self.pending.is_empty() {
                self.pending.push(' ');
            }
            self.pending.push_str(rest);
        }
        self.buffer.clear();

        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.trim().is_empty() && self.pending.is_empty()
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?') || is_cjk_terminator(c)
}

fn is_cjk_terminator(c: char) -> bool {
    matches!(c, '。' | '！' | '？')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '”' | '’' | '」')
}

/// Byte offset just past the first certain sentence end, if any.
///
/// A boundary needs to see the character after the terminator run, so
/// "Hello." alone is not yet a sentence but "Hello. " is.
fn find_boundary(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }

        let mut end = i + c.len_utf8();
        let mut cjk = is_cjk_terminator(c);
        while let Some(&(j, next)) = chars.peek() {
            if is_terminator(next) || is_closer(next) {
                cjk |= is_cjk_terminator(next);
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }

        match chars.peek() {
            Some(&(_, next)) if next.is_whitespace() || cjk => return Some(end),
            _ => {}
        }
    }
    None
}
