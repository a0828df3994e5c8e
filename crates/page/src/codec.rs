//! Fixed-width binary codec for page structures.
//!
//! Everything on a page is encoded with bincode's legacy (fixed-int,
//! little-endian) configuration so that headers and slots occupy known byte
//! ranges. Decoding never trusts its input: every function bound-checks the
//! region it reads and reports failures instead of panicking.

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_into_slice, encode_to_vec};
use common::{CheckError, CheckResult, PageId};

use crate::{HEADER_BYTES, MetaPage, PAGE_SIZE, PageHeader, SLOT_BYTES, Slot};
use crate::tuple::IndexTuple;

pub(crate) fn bincode_config() -> impl Config {
    config::legacy()
}

pub fn decode_header(block: PageId, bytes: &[u8]) -> CheckResult<PageHeader> {
    if bytes.len() < HEADER_BYTES {
        return Err(CheckError::Format {
            block,
            detail: format!("page shorter than header ({} bytes)", bytes.len()),
        });
    }
    let (header, read): (PageHeader, usize) =
        decode_from_slice(&bytes[..HEADER_BYTES], bincode_config()).map_err(|e| {
            CheckError::Format {
                block,
                detail: format!("page header undecodable: {e}"),
            }
        })?;
    debug_assert_eq!(read, HEADER_BYTES);
    Ok(header)
}

pub fn encode_header(header: &PageHeader, bytes: &mut [u8]) {
    let written = encode_into_slice(header, &mut bytes[..HEADER_BYTES], bincode_config())
        .expect("page header encoding is infallible");
    debug_assert_eq!(written, HEADER_BYTES);
}

pub fn slot_region(slot: u16) -> std::ops::Range<usize> {
    let start = HEADER_BYTES + slot as usize * SLOT_BYTES;
    start..start + SLOT_BYTES
}

pub fn decode_slot(block: PageId, bytes: &[u8], slot: u16) -> CheckResult<Slot> {
    let region = slot_region(slot);
    if region.end > bytes.len() {
        return Err(CheckError::Format {
            block,
            detail: format!("slot {slot} extends past end of page"),
        });
    }
    let (decoded, read): (Slot, usize) = decode_from_slice(&bytes[region], bincode_config())
        .map_err(|e| CheckError::Format {
            block,
            detail: format!("slot {slot} undecodable: {e}"),
        })?;
    debug_assert_eq!(read, SLOT_BYTES);
    Ok(decoded)
}

pub fn encode_slot(slot_val: &Slot, bytes: &mut [u8], slot: u16) {
    let region = slot_region(slot);
    let written = encode_into_slice(slot_val, &mut bytes[region], bincode_config())
        .expect("slot encoding is infallible");
    debug_assert_eq!(written, SLOT_BYTES);
}

/// Decode a tuple from a slot's payload, returning the number of payload
/// bytes the encoding actually consumed.  Callers compare that against the
/// slot's stored length to detect torn writes.
pub fn decode_tuple(block: PageId, payload: &[u8]) -> CheckResult<(IndexTuple, usize)> {
    decode_from_slice(payload, bincode_config()).map_err(|e| CheckError::Format {
        block,
        detail: format!("index tuple undecodable: {e}"),
    })
}

pub fn encode_tuple(tuple: &IndexTuple) -> Vec<u8> {
    encode_to_vec(tuple, bincode_config()).expect("tuple encoding is infallible")
}

pub fn decode_meta(block: PageId, bytes: &[u8]) -> CheckResult<MetaPage> {
    let end = bytes.len().min(PAGE_SIZE);
    if HEADER_BYTES >= end {
        return Err(CheckError::Format {
            block,
            detail: "page too short for meta payload".into(),
        });
    }
    let (meta, _): (MetaPage, usize) =
        decode_from_slice(&bytes[HEADER_BYTES..end], bincode_config()).map_err(|e| {
            CheckError::Format {
                block,
                detail: format!("meta payload undecodable: {e}"),
            }
        })?;
    Ok(meta)
}

pub fn encode_meta(meta: &MetaPage, bytes: &mut [u8]) {
    let encoded = encode_to_vec(meta, bincode_config()).expect("meta encoding is infallible");
    bytes[HEADER_BYTES..HEADER_BYTES + encoded.len()].copy_from_slice(&encoded);
}
