use std::io::Cursor;
use std::path::Path;

use anyhow::Context;

fn spec(sample_rate: u32, channels: u16) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn samples(pcm: &[u8]) -> impl Iterator<Item = i16> + '_ {
    // Trailing odd byte (a torn sample) is dropped
    pcm.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]]))
}

/// Wrap little-endian 16-bit PCM into an in-memory RIFF/WAV file.
pub fn encode_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> anyhow::Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + pcm.len()));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec(sample_rate, channels))?;
        for s in samples(pcm) {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Write little-endian 16-bit PCM to a WAV file.
pub fn write_wav<P: AsRef<Path>>(path: P, pcm: &[u8], sample_rate: u32, channels: u16) -> anyhow::Result<()> {
    let wav = encode_wav(pcm, sample_rate, channels)?;
    std::fs::write(path.as_ref(), wav)
        .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
    Ok(())
}
