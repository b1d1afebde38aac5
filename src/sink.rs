//! Audio sinks
//!
//! A sink receives decoded audio as borrowed byte slices and answers whether
//! the stream should keep going. Returning [`SinkControl::Stop`] is how a
//! caller cancels a streaming request.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{Error, Result};

/// Sink verdict after each delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    Stop,
}

/// Consumer of decoded audio
///
/// `samples` is only valid for the duration of the call.
pub trait AudioSink {
    fn deliver(&mut self, samples: &[u8]) -> SinkControl;
}

impl<F> AudioSink for F
where
    F: FnMut(&[u8]) -> SinkControl,
{
    fn deliver(&mut self, samples: &[u8]) -> SinkControl {
        self(samples)
    }
}

/// Keeps every delivered byte in memory
#[derive(Debug, Default)]
pub struct CollectSink {
    bytes: Vec<u8>,
    deliveries: usize,
    limit: Option<usize>,
}

impl CollectSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask to stop once at least `bytes` have arrived
    #[must_use]
    pub fn stop_after(bytes: usize) -> Self {
        Self {
            limit: Some(bytes),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of `deliver` calls seen
    #[must_use]
    pub const fn deliveries(&self) -> usize {
        self.deliveries
    }
}

impl AudioSink for CollectSink {
    fn deliver(&mut self, samples: &[u8]) -> SinkControl {
        self.bytes.extend_from_slice(samples);
        self.deliveries += 1;
        match self.limit {
            Some(limit) if self.bytes.len() >= limit => SinkControl::Stop,
            _ => SinkControl::Continue,
        }
    }
}

/// Upper bound on the RIFF prefix searched for the `data` chunk
const MAX_HEADER: usize = 512;

enum Header {
    /// Collecting the first bytes to see whether a RIFF header is present
    Pending(Vec<u8>),
    Passed,
}

/// Writes 16-bit mono PCM to a WAV file
///
/// Delivered bytes are little-endian samples. If the stream itself starts
/// with a RIFF header (as `LINEAR16` speech synthesis output does) the header
/// is dropped and only the `data` chunk payload is written. A sample split
/// across two deliveries is carried over.
pub struct WavSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    header: Header,
    odd: Option<u8>,
    samples: u64,
    error: Option<Error>,
}

impl WavSink {
    /// Create `path`, truncating any existing file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer =
            WavWriter::create(path.as_ref(), spec).map_err(|e| Error::Audio(e.to_string()))?;

        Ok(Self {
            writer: Some(writer),
            header: Header::Pending(Vec::new()),
            odd: None,
            samples: 0,
            error: None,
        })
    }

    /// Samples written so far
    #[must_use]
    pub const fn samples(&self) -> u64 {
        self.samples
    }

    /// Flush and finalize the file
    ///
    /// # Errors
    ///
    /// Returns the first write error seen during streaming, or a finalize
    /// failure
    pub fn finish(mut self) -> Result<u64> {
        if let Header::Pending(prefix) = std::mem::replace(&mut self.header, Header::Passed) {
            // Stream ended before the header question was settled: plain PCM
            self.write_pcm(&prefix);
        }
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if self.odd.is_some() {
            tracing::warn!("dropping trailing half sample");
        }
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
        }
        Ok(self.samples)
    }

    fn write_pcm(&mut self, mut bytes: &[u8]) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        if let Some(low) = self.odd.take() {
            let Some((&high, rest)) = bytes.split_first() else {
                self.odd = Some(low);
                return;
            };
            if let Err(e) = writer.write_sample(i16::from_le_bytes([low, high])) {
                self.error = Some(Error::Audio(e.to_string()));
                return;
            }
            self.samples += 1;
            bytes = rest;
        }

        let mut pairs = bytes.chunks_exact(2);
        for pair in &mut pairs {
            if let Err(e) = writer.write_sample(i16::from_le_bytes([pair[0], pair[1]])) {
                self.error = Some(Error::Audio(e.to_string()));
                return;
            }
            self.samples += 1;
        }
        self.odd = pairs.remainder().first().copied();
    }
}

/// Offset of the `data` chunk payload if `prefix` holds a complete RIFF header
///
/// `Ok(None)` means more bytes are needed.
fn riff_payload_offset(prefix: &[u8]) -> Result<Option<usize>> {
    if prefix.len() < 12 {
        return Ok(None);
    }
    if &prefix[8..12] != b"WAVE" {
        return Err(Error::Audio("RIFF stream is not WAVE".to_string()));
    }

    let mut offset: usize = 12;
    while let Some(header) = offset.checked_add(8).and_then(|end| prefix.get(offset..end)) {
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if &header[..4] == b"data" {
            return Ok(Some(offset + 8));
        }
        let size = usize::try_from(size).map_err(|e| Error::Audio(e.to_string()))?;
        // chunks are word aligned
        offset = offset.saturating_add(size).saturating_add(8 + (size & 1));
    }
    Ok(None)
}

impl AudioSink for WavSink {
    fn deliver(&mut self, samples: &[u8]) -> SinkControl {
        if self.error.is_some() {
            return SinkControl::Stop;
        }

        match std::mem::replace(&mut self.header, Header::Passed) {
            Header::Passed => self.write_pcm(samples),
            Header::Pending(mut prefix) => {
                prefix.extend_from_slice(samples);

                if prefix.len() >= 4 && &prefix[..4] != b"RIFF" {
                    self.write_pcm(&prefix);
                } else {
                    match riff_payload_offset(&prefix) {
                        Ok(Some(offset)) => {
                            tracing::debug!(header_bytes = offset, "skipping embedded WAV header");
                            self.write_pcm(&prefix[offset..]);
                        }
                        Ok(None) if prefix.len() < MAX_HEADER => {
                            self.header = Header::Pending(prefix);
                        }
                        Ok(None) => {
                            self.error = Some(Error::Audio(format!(
                                "no data chunk within {MAX_HEADER} header bytes"
                            )));
                        }
                        Err(e) => self.error = Some(e),
                    }
                }
            }
        }

        if let Some(err) = &self.error {
            tracing::error!(error = %err, "WAV sink failed, stopping stream");
            SinkControl::Stop
        } else {
            SinkControl::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{pcm16_to_le_bytes, pcm16_to_wav, wav_to_pcm16};

    #[test]
    fn closures_are_sinks() {
        let mut total = 0;
        let mut sink = |samples: &[u8]| {
            total += samples.len();
            SinkControl::Continue
        };
        assert_eq!(sink.deliver(b"abc"), SinkControl::Continue);
        assert_eq!(sink.deliver(b"de"), SinkControl::Continue);
        assert_eq!(total, 5);
    }

    #[test]
    fn collect_sink_stops_at_limit() {
        let mut sink = CollectSink::stop_after(4);
        assert_eq!(sink.deliver(b"ab"), SinkControl::Continue);
        assert_eq!(sink.deliver(b"cd"), SinkControl::Stop);
        assert_eq!(sink.bytes(), b"abcd");
        assert_eq!(sink.deliveries(), 2);
    }

    #[test]
    fn wav_sink_writes_raw_pcm_with_odd_splits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let samples: Vec<i16> = vec![0, 1, -1, 1000, -32768, 32767];
        let bytes = pcm16_to_le_bytes(&samples);

        let mut sink = WavSink::create(&path, 24_000).unwrap();
        for piece in bytes.chunks(3) {
            assert_eq!(sink.deliver(piece), SinkControl::Continue);
        }
        assert_eq!(sink.finish().unwrap(), 6);

        let (read, rate) = wav_to_pcm16(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(rate, 24_000);
        assert_eq!(read, samples);
    }

    #[test]
    fn wav_sink_strips_embedded_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let samples: Vec<i16> = (0..100).map(|i| i * 7 - 300).collect();
        let wav = pcm16_to_wav(&samples, 24_000).unwrap();

        let mut sink = WavSink::create(&path, 24_000).unwrap();
        for piece in wav.chunks(5) {
            sink.deliver(piece);
        }
        assert_eq!(sink.finish().unwrap(), 100);

        let (read, _) = wav_to_pcm16(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(read, samples);
    }

    #[test]
    fn wav_sink_rejects_non_wave_riff() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = WavSink::create(dir.path().join("out.wav"), 16_000).unwrap();

        assert_eq!(sink.deliver(b"RIFF\0\0\0\0AVI LIST"), SinkControl::Stop);
        assert!(matches!(sink.finish(), Err(Error::Audio(_))));
    }

    #[test]
    fn riff_offset_needs_whole_header() {
        let wav = pcm16_to_wav(&[1, 2, 3], 16_000).unwrap();
        assert_eq!(riff_payload_offset(&wav[..20]).unwrap(), None);
        assert_eq!(riff_payload_offset(&wav).unwrap(), Some(44));
    }
}
