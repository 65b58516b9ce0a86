mod config;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{info, warn};
use tts_client::{ConnectOptions, LocalTts, TextInput, TextWriter, TtsOptions};
use tts_core::{PcmBuffer, SentenceTokenizer};

use crate::config::{CliConfig, Mode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    let config = CliConfig::from_env();
    let opts = TtsOptions::from_env();
    let conn_options = ConnectOptions::from_env();
    info!(
        "Synthesizing with voice {} ({}) from {} in {:?} mode",
        opts.voice, opts.language, opts.base_url, config.mode
    );

    let tts = LocalTts::new(opts)?.with_tokenizer(SentenceTokenizer::new(config.min_sentence_len));
    let mut audio = PcmBuffer::new();

    match config.mode {
        Mode::Stream => {
            let stream = tts.stream(conn_options);
            let reader = tokio::spawn(feed_stdin(stream.writer()));
            stream.run(&mut audio).await?;
            if let Err(e) = reader.await? {
                warn!("Stopped reading input: {e}");
            }
        }
        Mode::Chunked => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            tts.synthesize(text, conn_options).run(&mut audio).await?;
        }
    }

    audio.write_wav(&config.output)?;
    info!(
        "Wrote {} ms of audio in {} segment(s) to {}",
        audio.duration_ms(),
        audio.segments().len(),
        config.output.display()
    );

    let snapshot = serde_json::to_string(&tts.metrics().snapshot())?;
    info!("Metrics: {snapshot}");

    tts.close().await;
    Ok(())
}

/// Interpret one line of stdin: a blank line flushes, anything else is
/// text to speak.
fn parse_line(line: &str) -> TextInput {
    let line = line.trim_end();
    if line.trim().is_empty() {
        TextInput::Flush
    } else {
        // Keep words on adjacent lines apart
        TextInput::Text(format!("{line} "))
    }
}

async fn feed_stdin(writer: TextWriter) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            TextInput::Text(text) => writer.push_text(text)?,
            TextInput::Flush => writer.flush()?,
            TextInput::EndInput => break,
        }
    }
    writer.end_input()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("Hello there."), TextInput::Text("Hello there. ".to_string()));
        assert_eq!(parse_line("trailing   \r"), TextInput::Text("trailing ".to_string()));
        assert_eq!(parse_line(""), TextInput::Flush);
        assert_eq!(parse_line("   "), TextInput::Flush);
    }
}
