//! Record codec
//!
//! Turns a typed record into exactly one line of bytes and back. The line
//! terminator is owned by the writer, never by the codec.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{KeylineError, Result};

/// Encodes records into single lines and decodes them back
pub trait RecordCodec<T>: Send + Sync {
    /// Append the encoded record to `buf`. Must not emit a `\n` byte.
    fn encode_into(&self, record: &T, buf: &mut Vec<u8>) -> Result<()>;

    /// Decode one line (terminator already stripped)
    fn decode(&self, line: &[u8]) -> Result<T>;
}

/// Compact JSON via serde_json
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> RecordCodec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode_into(&self, record: &T, buf: &mut Vec<u8>) -> Result<()> {
        serde_json::to_writer(buf, record).map_err(|e| KeylineError::Encode(e.to_string()))
    }

    fn decode(&self, line: &[u8]) -> Result<T> {
        // Offset is filled in by the caller, which knows where the line started
        serde_json::from_slice(line).map_err(|e| KeylineError::Decode {
            offset: 0,
            reason: e.to_string(),
        })
    }
}

/// Decode `line` and stamp any decode error with the line's offset
pub(crate) fn decode_at<T, C>(codec: &C, line: &[u8], offset: u64) -> Result<T>
where
    C: RecordCodec<T> + ?Sized,
{
    codec.decode(line).map_err(|e| match e {
        KeylineError::Decode { reason, .. } => KeylineError::Decode { offset, reason },
        other => other,
    })
}
