// Configuration for the speak binary

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Incremental synthesis over the duplex session
    Stream,
    /// One HTTP request for the whole input
    Chunked,
}

impl Mode {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "chunked" => Mode::Chunked,
            _ => Mode::Stream,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub output: PathBuf,
    pub mode: Mode,
    pub min_sentence_len: usize,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("output.wav"),
            mode: Mode::Stream,
            min_sentence_len: 20,
        }
    }
}

impl CliConfig {
    pub fn from_env() -> Self {
        let output = std::env::var("TTS_OUTPUT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("output.wav"));

        let mode = std::env::var("TTS_MODE")
            .map(|v| Mode::parse(&v))
            .unwrap_or(Mode::Stream);

        let min_sentence_len = std::env::var("TTS_MIN_SENTENCE_LEN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        Self {
            output,
            mode,
            min_sentence_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(Mode::parse("chunked"), Mode::Chunked);
        assert_eq!(Mode::parse(" CHUNKED "), Mode::Chunked);
        assert_eq!(Mode::parse("stream"), Mode::Stream);
        assert_eq!(Mode::parse("anything"), Mode::Stream);
    }

    #[test]
    fn test_defaults() {
        let config = CliConfig::default();
        assert_eq!(config.output, PathBuf::from("output.wav"));
        assert_eq!(config.mode, Mode::Stream);
        assert_eq!(config.min_sentence_len, 20);
    }
}
