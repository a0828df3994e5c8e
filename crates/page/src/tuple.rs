//! Index tuples and the storage encodings of their key components.
//!
//! The verifier treats key component values as opaque byte strings; what it
//! does understand is the incidental storage form a component was written
//! in. The same logical value can be stored inline, with a short header, or
//! compressed, depending on decisions made at insert time. Fingerprinting
//! compares logical content, so it canonicalizes all of these to `Inline`.

use common::{PageId, RecordId};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use thiserror::Error;

/// One entry on a page: a boundary (pivot) tuple or a leaf entry.
///
/// Leaf entries carry a table reference in `heap` and a full-arity `key`.
/// Boundary tuples may truncate trailing key components and usually have no
/// heap reference; internal ones carry the child block in `child`. On a
/// half-dead leaf's high key, `child` holds the pending top parent of an
/// interrupted multi-level deletion instead of a downlink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTuple {
    pub heap: Option<RecordId>,
    pub child: Option<PageId>,
    pub key: Vec<KeyDatum>,
}

impl IndexTuple {
    /// Number of comparable key components present.
    pub fn key_arity(&self) -> u16 {
        self.key.len() as u16
    }

    /// True when every component is already in canonical form, making
    /// normalization a no-op.
    pub fn is_canonical(&self) -> bool {
        self.key.iter().all(|d| matches!(d, KeyDatum::Inline(_)))
    }
}

/// Storage encoding of one opaque key component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyDatum {
    /// Canonical form: the logical bytes, stored plainly.
    Inline(Vec<u8>),
    /// Short-header form; logically identical bytes under a different
    /// header, legal only for values under 256 bytes.
    Short(Vec<u8>),
    /// Run-length compressed form.
    Compressed { raw_len: u32, data: Vec<u8> },
    /// Overflow reference. Never legal in a tuple that reaches
    /// fingerprinting or comparison; resolving it is the storage layer's
    /// business, not the verifier's.
    External { pointer: u64, raw_len: u32 },
}

/// Failure to resolve a datum's logical bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatumError {
    #[error("external datum (overflow pointer {pointer}) cannot be resolved here")]
    External { pointer: u64 },
    #[error("short-form datum of {len} bytes exceeds short header range")]
    OversizedShort { len: usize },
    #[error("compressed datum corrupt: {0}")]
    BadCompression(String),
}

impl KeyDatum {
    /// The logical value bytes, decompressing when necessary.
    pub fn logical_bytes(&self) -> Result<Cow<'_, [u8]>, DatumError> {
        match self {
            KeyDatum::Inline(bytes) => Ok(Cow::Borrowed(bytes)),
            KeyDatum::Short(bytes) => {
                if bytes.len() > u8::MAX as usize {
                    return Err(DatumError::OversizedShort { len: bytes.len() });
                }
                Ok(Cow::Borrowed(bytes))
            }
            KeyDatum::Compressed { raw_len, data } => {
                Ok(Cow::Owned(rle_decompress(*raw_len, data)?))
            }
            KeyDatum::External { pointer, .. } => Err(DatumError::External { pointer: *pointer }),
        }
    }

    /// Canonical (`Inline`) form of this datum.
    pub fn canonicalize(&self) -> Result<KeyDatum, DatumError> {
        Ok(KeyDatum::Inline(self.logical_bytes()?.into_owned()))
    }
}

/// Decode `(run_length, value)` byte pairs, insisting on exactly `raw_len`
/// output bytes.
fn rle_decompress(raw_len: u32, data: &[u8]) -> Result<Vec<u8>, DatumError> {
    if data.len() % 2 != 0 {
        return Err(DatumError::BadCompression(format!(
            "odd compressed length {}",
            data.len()
        )));
    }
    let mut out = Vec::with_capacity(raw_len as usize);
    for pair in data.chunks_exact(2) {
        let run = pair[0] as usize;
        if run == 0 {
            return Err(DatumError::BadCompression("zero-length run".into()));
        }
        if out.len() + run > raw_len as usize {
            return Err(DatumError::BadCompression(format!(
                "runs overflow declared length {raw_len}"
            )));
        }
        out.resize(out.len() + run, pair[1]);
    }
    if out.len() != raw_len as usize {
        return Err(DatumError::BadCompression(format!(
            "runs produce {} bytes, declared {raw_len}",
            out.len()
        )));
    }
    Ok(out)
}

/// Run-length compress `raw` into `(run, value)` pairs. Used by test
/// fixtures to produce the non-canonical encodings the verifier must
/// normalize away.
pub fn rle_compress(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut iter = raw.iter().peekable();
    while let Some(&value) = iter.next() {
        let mut run = 1u8;
        while run < u8::MAX && iter.peek() == Some(&&value) {
            iter.next();
            run += 1;
        }
        out.push(run);
        out.push(value);
    }
    out
}
