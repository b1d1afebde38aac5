//! Incremental base64 decoder
//!
//! Accepts the standard alphabet in runs of any length, one symbol at a time
//! if need be, and emits the three bytes of every completed four-symbol group
//! as soon as the group closes. Up to three leftover symbols are carried to
//! the next call. Decoding is canonical: padding only in the last two
//! positions of the final group, no symbols after padding, and zero trailing
//! bits, the same rules as `base64::engine::general_purpose::STANDARD`.

use crate::{Error, Result};

const INVALID: u8 = 0xff;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[allow(clippy::cast_possible_truncation)]
const DECODE_TABLE: [u8; 256] = {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
};

/// Up to three decoded bytes, produced without allocating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decoded {
    bytes: [u8; 3],
    len: u8,
}

impl Decoded {
    const fn new(bytes: [u8; 3], len: u8) -> Self {
        Self { bytes, len }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Streaming base64 decoder state
///
/// [`finish`](Self::finish) consumes the decoder, so end of input can only be
/// signalled once.
#[derive(Debug, Default)]
pub struct Base64Decoder {
    pending: [u8; 4],
    len: u8,
    padding: u8,
    closed: bool,
    position: u64,
    last: u8,
}

impl Base64Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bits held in leftover symbols (0, 6, 12 or 18)
    #[must_use]
    pub fn pending_bits(&self) -> u32 {
        u32::from(self.len) * 6
    }

    /// Symbols consumed so far, padding included
    #[must_use]
    pub const fn symbols_seen(&self) -> u64 {
        self.position
    }

    /// Decode a run of symbols, appending completed groups to `out`
    ///
    /// Returns the number of bytes appended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] on the first symbol that cannot
    /// appear at its position
    pub fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<usize> {
        let before = out.len();
        for &byte in input {
            out.extend_from_slice(self.feed_symbol(byte)?.as_slice());
        }
        Ok(out.len() - before)
    }

    /// Decode one symbol
    ///
    /// Yields three bytes when the symbol closes a full group, one or two
    /// when it is the padding that closes the final group, otherwise nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if the symbol is not valid here
    pub fn feed_symbol(&mut self, byte: u8) -> Result<Decoded> {
        let position = self.position;
        self.position += 1;
        self.last = byte;

        if byte == b'=' {
            if self.closed || self.len < 2 {
                return Err(Error::MalformedInput { position, byte });
            }
            self.padding += 1;
            if self.len + self.padding < 4 {
                return Ok(Decoded::default());
            }
            self.closed = true;
            return self.tail(position, byte);
        }

        if self.closed || self.padding > 0 {
            return Err(Error::MalformedInput { position, byte });
        }

        let value = DECODE_TABLE[usize::from(byte)];
        if value == INVALID {
            return Err(Error::MalformedInput { position, byte });
        }

        self.pending[usize::from(self.len)] = value;
        self.len += 1;
        if self.len < 4 {
            return Ok(Decoded::default());
        }

        self.len = 0;
        let [a, b, c, d] = self.pending;
        Ok(Decoded::new(
            [
                (a << 2) | (b >> 4),
                ((b & 0x0f) << 4) | (c >> 2),
                ((c & 0x03) << 6) | d,
            ],
            3,
        ))
    }

    /// Signal end of input and flush the final one or two bytes
    ///
    /// A two- or three-symbol remainder is accepted without explicit padding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] for a single leftover symbol or
    /// incomplete padding
    pub fn finish(self) -> Result<Decoded> {
        if self.closed {
            return Ok(Decoded::default());
        }

        let position = self.position.saturating_sub(1);
        if self.padding > 0 {
            return Err(Error::MalformedInput {
                position,
                byte: self.last,
            });
        }

        match self.len {
            0 => Ok(Decoded::default()),
            1 => Err(Error::MalformedInput {
                position,
                byte: self.last,
            }),
            _ => self.tail(position, self.last),
        }
    }

    /// Bytes of a final group holding two or three symbols
    fn tail(&self, position: u64, byte: u8) -> Result<Decoded> {
        let [a, b, c, _] = self.pending;
        let decoded = if self.len == 2 {
            if b & 0x0f != 0 {
                return Err(Error::MalformedInput { position, byte });
            }
            Decoded::new([(a << 2) | (b >> 4), 0, 0], 1)
        } else {
            if c & 0x03 != 0 {
                return Err(Error::MalformedInput { position, byte });
            }
            Decoded::new([(a << 2) | (b >> 4), ((b & 0x0f) << 4) | (c >> 2), 0], 2)
        };
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use ::base64::Engine;
    use ::base64::engine::general_purpose::STANDARD;

    use super::*;

    fn decode_in_runs(input: &[u8], run: usize) -> Result<Vec<u8>> {
        let mut decoder = Base64Decoder::new();
        let mut out = Vec::new();
        for chunk in input.chunks(run.max(1)) {
            decoder.feed(chunk, &mut out)?;
        }
        out.extend_from_slice(decoder.finish()?.as_slice());
        Ok(out)
    }

    #[test]
    fn matches_standard_decoder_for_every_run_length() {
        let payloads: [&[u8]; 5] = [b"", b"H", b"He", b"Hello", b"\x00\xff\x10 binary\x80pcm"];

        for payload in payloads {
            let encoded = STANDARD.encode(payload);
            let expected = STANDARD.decode(&encoded).unwrap();
            for run in 1..=encoded.len().max(1) {
                assert_eq!(
                    decode_in_runs(encoded.as_bytes(), run).unwrap(),
                    expected,
                    "input {encoded:?} in runs of {run}"
                );
            }
        }
    }

    #[test]
    fn hello_example() {
        assert_eq!(decode_in_runs(b"SGVsbG8=", 3).unwrap(), b"Hello");
    }

    #[test]
    fn emits_only_complete_groups() {
        let mut decoder = Base64Decoder::new();
        let mut out = Vec::new();

        assert_eq!(decoder.feed(b"SGV", &mut out).unwrap(), 0);
        assert_eq!(decoder.pending_bits(), 18);
        assert_eq!(decoder.feed(b"sbG", &mut out).unwrap(), 3);
        assert_eq!(out, b"Hel");
        assert_eq!(decoder.pending_bits(), 12);
    }

    #[test]
    fn implicit_padding_is_accepted() {
        assert_eq!(decode_in_runs(b"SGVsbG8", 2).unwrap(), b"Hello");
        assert_eq!(decode_in_runs(b"SGVsbA", 4).unwrap(), b"Hell");
    }

    #[test]
    fn rejects_symbol_outside_alphabet() {
        let err = decode_in_runs(b"SGV*bG8=", 8).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedInput {
                position: 3,
                byte: b'*'
            }
        ));
    }

    #[test]
    fn rejects_invalid_padding_length() {
        for input in [&b"SGVsbG8=="[..], b"SGVsb", b"S===", b"SG=", b"=AAA", b"SGVsbG8=AAAA"] {
            assert!(
                matches!(decode_in_runs(input, 1), Err(Error::MalformedInput { .. })),
                "{:?} should be rejected",
                String::from_utf8_lossy(input)
            );
            assert!(STANDARD.decode(input).is_err());
        }
    }

    #[test]
    fn rejects_non_canonical_trailing_bits() {
        assert!(decode_in_runs(b"SGVsbG9=", 8).is_err());
        assert!(decode_in_runs(b"SB==", 8).is_err());
    }

    #[test]
    fn finish_on_fresh_decoder_is_empty() {
        assert!(Base64Decoder::new().finish().unwrap().is_empty());
    }
}
