//! Audio payload codecs
//!
//! Base64 for the JSON-embedded audio fields, plus 16-bit PCM / WAV helpers.

mod base64;
mod pcm;

pub use self::base64::{Base64Decoder, Decoded};
pub use pcm::{AudioStats, pcm16_from_le_bytes, pcm16_to_le_bytes, pcm16_to_wav, wav_to_pcm16};
