use anyhow::{Context, Result};
use hound::{WavReader, WavSpec, WavWriter};
use std::io::{Cursor, Read};
use tracing::info;

/// A decoded 16-bit WAV recording
pub struct AudioFile {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let reader = WavReader::new(Cursor::new(bytes)).context("Failed to parse WAV data")?;
        Self::from_reader(reader)
    }

    fn from_reader<R: Read>(reader: WavReader<R>) -> Result<Self> {
        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels.max(1) as f64);

        info!(
            "Audio loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Encode PCM16 samples as an in-memory WAV file
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }
        writer.finalize().context("Failed to finalize WAV data")?;
    }

    Ok(cursor.into_inner())
}

/// Decode little-endian PCM16 bytes into samples; a trailing odd byte is dropped
pub fn pcm_bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
