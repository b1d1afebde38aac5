//! 16-bit PCM helpers

use crate::{Error, Result};

/// Interpret little-endian bytes as 16-bit samples
///
/// A trailing odd byte is ignored.
#[must_use]
pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[must_use]
pub fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Wrap mono 16-bit samples in a WAV container
///
/// # Errors
///
/// Returns error if the WAV writer fails
pub fn pcm16_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Read a mono 16-bit WAV file into samples and its sample rate
///
/// # Errors
///
/// Returns error if the data is not 16-bit integer WAV
pub fn wav_to_pcm16(wav: &[u8]) -> Result<(Vec<i16>, u32)> {
    let mut reader = hound::WavReader::new(std::io::Cursor::new(wav))
        .map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(Error::Audio(format!(
            "expected 16-bit integer PCM, got {} bits",
            spec.bits_per_sample
        )));
    }

    let samples = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Audio(e.to_string()))?;

    Ok((samples, spec.sample_rate))
}

/// Level statistics of a capture, logged before upload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioStats {
    pub rms: f32,
    pub mean: f32,
    pub min: i16,
    pub max: i16,
}

impl AudioStats {
    /// Below this RMS a capture is most likely silence
    pub const SILENCE_RMS: f32 = 10.0;

    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn measure(samples: &[i16]) -> Self {
        if samples.is_empty() {
            return Self {
                rms: 0.0,
                mean: 0.0,
                min: 0,
                max: 0,
            };
        }

        let (sum, sum_sq, min, max) = samples.iter().fold(
            (0i64, 0f64, i16::MAX, i16::MIN),
            |(sum, sum_sq, min, max), &s| {
                (
                    sum + i64::from(s),
                    sum_sq + f64::from(s) * f64::from(s),
                    min.min(s),
                    max.max(s),
                )
            },
        );

        let n = samples.len() as f64;
        Self {
            rms: (sum_sq / n).sqrt() as f32,
            mean: (sum as f64 / n) as f32,
            min,
            max,
        }
    }

    #[must_use]
    pub fn is_silence(&self) -> bool {
        self.rms < Self::SILENCE_RMS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le_bytes_roundtrip_drops_odd_tail() {
        let samples = [0i16, 1, -1, i16::MAX, i16::MIN];
        let mut bytes = pcm16_to_le_bytes(&samples);
        assert_eq!(bytes.len(), 10);

        bytes.push(0x7f);
        assert_eq!(pcm16_from_le_bytes(&bytes), samples);
    }

    #[test]
    fn wav_roundtrip() {
        let samples = vec![0i16, 1000, -1000, 32767, -32768];
        let wav = pcm16_to_wav(&samples, 16_000).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + samples.len() * 2);

        let (read, rate) = wav_to_pcm16(&wav).unwrap();
        assert_eq!(rate, 16_000);
        assert_eq!(read, samples);
    }

    #[test]
    fn stats_flag_silence() {
        let quiet = vec![1i16, -1, 2, -2];
        let stats = AudioStats::measure(&quiet);
        assert!(stats.is_silence());
        assert_eq!(stats.min, -2);
        assert_eq!(stats.max, 2);

        let loud = vec![1000i16, -1000, 1000, -1000];
        let stats = AudioStats::measure(&loud);
        assert!(!stats.is_silence());
        assert!((stats.rms - 1000.0).abs() < 0.01);
        assert!(stats.mean.abs() < f32::EPSILON);
    }

    #[test]
    fn stats_of_empty_capture() {
        assert!(AudioStats::measure(&[]).is_silence());
    }
}
