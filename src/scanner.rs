//! Chunked JSON field scanner
//!
//! Finds the string value of one field in a JSON body that arrives in chunks
//! of any size and hands every content byte onward as soon as it is seen,
//! without buffering the document. Chunk boundaries may fall anywhere,
//! including inside the field name or an escape sequence.
//!
//! Matching is a plain prefix counter against `"name"`: when a partial match
//! breaks, the counter restarts at zero and only the breaking byte is
//! re-examined as a possible new start. Between the name and the opening
//! quote of the value any JSON whitespace and a single `:` are accepted.

use std::ops::ControlFlow;

use crate::memory::ByteCursor;
use crate::{Error, Result};

/// Coarse scanner progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Still looking for the field
    Searching,
    /// Inside the value, streaming content bytes
    InValue,
    /// Closing quote seen; later bytes are ignored
    Done,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Searching { matched: usize },
    Separator { colon: bool },
    InValue(Escape),
    Done,
}

#[derive(Debug, Clone, Copy)]
enum Escape {
    None,
    Backslash,
    Unicode { digits: u8, value: u32 },
}

enum Emit {
    Nothing,
    Byte(u8),
    Char(char),
    Close,
}

/// Streaming locator for one string field
#[derive(Debug)]
pub struct FieldScanner {
    key: Vec<u8>,
    phase: Phase,
    offset: u64,
    value_len: u64,
}

impl FieldScanner {
    /// Scanner for the string field `field`
    #[must_use]
    pub fn new(field: &str) -> Self {
        let mut key = Vec::with_capacity(field.len() + 2);
        key.push(b'"');
        key.extend_from_slice(field.as_bytes());
        key.push(b'"');

        Self {
            key,
            phase: Phase::Searching { matched: 0 },
            offset: 0,
            value_len: 0,
        }
    }

    /// Field name being searched for
    #[must_use]
    pub fn field(&self) -> &str {
        std::str::from_utf8(&self.key[1..self.key.len() - 1]).unwrap_or_default()
    }

    #[must_use]
    pub const fn state(&self) -> ScanState {
        match self.phase {
            Phase::Searching { .. } | Phase::Separator { .. } => ScanState::Searching,
            Phase::InValue(_) => ScanState::InValue,
            Phase::Done => ScanState::Done,
        }
    }

    /// Body bytes examined so far
    #[must_use]
    pub const fn bytes_scanned(&self) -> u64 {
        self.offset
    }

    /// Unescaped value bytes handed onward so far
    #[must_use]
    pub const fn value_len(&self) -> u64 {
        self.value_len
    }

    /// Scan one chunk, calling `on_byte` for each unescaped value byte
    ///
    /// Returns early, leaving the rest of the chunk unexamined, when
    /// `on_byte` breaks or the value closes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedJson`] for an invalid `\u` escape, or any
    /// error produced by `on_byte`
    pub fn feed<F>(&mut self, chunk: &[u8], mut on_byte: F) -> Result<ScanState>
    where
        F: FnMut(u8) -> Result<ControlFlow<()>>,
    {
        if matches!(self.phase, Phase::Done) {
            return Ok(ScanState::Done);
        }

        let mut cursor = ByteCursor::new(chunk);

        while let Some(byte) = cursor.next_byte() {
            self.offset += 1;

            match self.phase {
                Phase::Done => break,
                Phase::Searching { matched } => self.phase = self.advance_match(matched, byte),
                Phase::Separator { colon } => match byte {
                    b' ' | b'\t' | b'\n' | b'\r' => {}
                    b':' if !colon => self.phase = Phase::Separator { colon: true },
                    b'"' if colon => {
                        tracing::debug!(
                            field = self.field(),
                            offset = self.offset,
                            "located target field"
                        );
                        self.phase = Phase::InValue(Escape::None);
                    }
                    _ => self.phase = self.advance_match(0, byte),
                },
                Phase::InValue(escape) => {
                    let emit = self.step_value(escape, byte)?;
                    let flow = match emit {
                        Emit::Nothing => ControlFlow::Continue(()),
                        Emit::Byte(b) => self.emit(b, &mut on_byte)?,
                        Emit::Char(c) => {
                            let mut utf8 = [0u8; 4];
                            let mut flow = ControlFlow::Continue(());
                            for &b in c.encode_utf8(&mut utf8).as_bytes() {
                                flow = self.emit(b, &mut on_byte)?;
                                if flow.is_break() {
                                    break;
                                }
                            }
                            flow
                        }
                        Emit::Close => {
                            tracing::debug!(
                                field = self.field(),
                                value_bytes = self.value_len,
                                "target field complete"
                            );
                            self.phase = Phase::Done;
                            ControlFlow::Break(())
                        }
                    };
                    if flow.is_break() {
                        break;
                    }
                }
            }
        }

        Ok(self.state())
    }

    /// Confirm the value was captured completely at end of stream
    ///
    /// # Errors
    ///
    /// Returns [`Error::TruncatedResponse`] unless the closing quote was seen
    pub fn finish(&self) -> Result<()> {
        match self.phase {
            Phase::Done => Ok(()),
            Phase::Searching { .. } | Phase::Separator { .. } => {
                Err(Error::TruncatedResponse(format!(
                    "field `{}` not found in {} bytes",
                    self.field(),
                    self.offset
                )))
            }
            Phase::InValue(_) => Err(Error::TruncatedResponse(format!(
                "value of `{}` unterminated after {} bytes",
                self.field(),
                self.value_len
            ))),
        }
    }

    fn emit<F>(&mut self, byte: u8, on_byte: &mut F) -> Result<ControlFlow<()>>
    where
        F: FnMut(u8) -> Result<ControlFlow<()>>,
    {
        self.value_len += 1;
        on_byte(byte)
    }

    fn advance_match(&self, matched: usize, byte: u8) -> Phase {
        if byte == self.key[matched] {
            let matched = matched + 1;
            if matched == self.key.len() {
                Phase::Separator { colon: false }
            } else {
                Phase::Searching { matched }
            }
        } else if byte == self.key[0] {
            Phase::Searching { matched: 1 }
        } else {
            Phase::Searching { matched: 0 }
        }
    }

    fn step_value(&mut self, escape: Escape, byte: u8) -> Result<Emit> {
        let emit = match escape {
            Escape::None => match byte {
                b'"' => Emit::Close,
                b'\\' => {
                    self.phase = Phase::InValue(Escape::Backslash);
                    Emit::Nothing
                }
                _ => Emit::Byte(byte),
            },
            Escape::Backslash => {
                self.phase = Phase::InValue(Escape::None);
                match byte {
                    b'"' | b'\\' | b'/' => Emit::Byte(byte),
                    b'b' => Emit::Byte(0x08),
                    b'f' => Emit::Byte(0x0c),
                    b'n' => Emit::Byte(b'\n'),
                    b'r' => Emit::Byte(b'\r'),
                    b't' => Emit::Byte(b'\t'),
                    b'u' => {
                        self.phase = Phase::InValue(Escape::Unicode {
                            digits: 0,
                            value: 0,
                        });
                        Emit::Nothing
                    }
                    other => {
                        return Err(Error::MalformedJson {
                            offset: self.offset - 1,
                            reason: format!("invalid escape `\\{}`", char::from(other)),
                        });
                    }
                }
            }
            Escape::Unicode { digits, value } => {
                let Some(nibble) = char::from(byte).to_digit(16) else {
                    return Err(Error::MalformedJson {
                        offset: self.offset - 1,
                        reason: "invalid \\u escape".to_string(),
                    });
                };
                let value = (value << 4) | nibble;
                if digits + 1 < 4 {
                    self.phase = Phase::InValue(Escape::Unicode {
                        digits: digits + 1,
                        value,
                    });
                    Emit::Nothing
                } else {
                    self.phase = Phase::InValue(Escape::None);
                    Emit::Char(char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER))
                }
            }
        };
        Ok(emit)
    }
}
