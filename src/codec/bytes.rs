//! Fixed-width integer packing for the time fields.
//!
//! All values are big-endian. The 16-bit and 32-bit forms are the low-order
//! bits of an NTP seconds timestamp.

use crate::error::CodecError;

const SIXTEEN_BIT_SPAN: u64 = 1 << 16;

/// Largest timestamp the 32-bit wire field can carry.
pub const MAX_TIME32: u64 = u32::MAX as u64;

/// Low 16 bits of an NTP seconds timestamp.
pub fn truncate_to_16_bits(ntp_seconds: u64) -> u16 {
    (ntp_seconds & 0xFFFF) as u16
}

/// Low 32 bits of an NTP seconds timestamp, big-endian.
pub fn time32_from_ntp(ntp_seconds: u64) -> [u8; 4] {
    ((ntp_seconds & 0xFFFF_FFFF) as u32).to_be_bytes()
}

/// Widen a 4-byte big-endian timestamp to 64 bits.
pub fn ntp_from_time32(time32: [u8; 4]) -> u64 {
    u64::from(u32::from_be_bytes(time32))
}

pub fn time16_to_bytes(time16: u16) -> [u8; 2] {
    time16.to_be_bytes()
}

pub fn time16_from_bytes(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// Rebuild a full timestamp from its 16 low-order bits, borrowing the
/// high-order bits of `reference_ntp`.
///
/// The candidate closest to the reference wins, so a sender timestamp
/// captured just before a 16-bit rollover still lands next to the
/// receiver timestamp taken just after it.
pub fn reconstitute_ntp_timestamp(time16: u16, reference_ntp: u64) -> u64 {
    let candidate = (reference_ntp & !0xFFFF) | u64::from(time16);
    [
        candidate.checked_sub(SIXTEEN_BIT_SPAN),
        Some(candidate),
        candidate.checked_add(SIXTEEN_BIT_SPAN),
    ]
    .into_iter()
    .flatten()
    .min_by_key(|c| c.abs_diff(reference_ntp))
    .unwrap_or(candidate)
}

/// Distance between two 16-bit truncated timestamps, modulo 2^16.
pub fn wrapped_distance_16(a: u16, b: u16) -> u16 {
    let forward = a.wrapping_sub(b);
    forward.min(forward.wrapping_neg())
}

/// Copy a slice into a fixed-size array, reporting the field on mismatch.
pub fn fixed<const N: usize>(field: &'static str, bytes: &[u8]) -> Result<[u8; N], CodecError> {
    bytes.try_into().map_err(|_| CodecError::InvalidLength {
        field,
        expected: N,
        actual: bytes.len(),
    })
}
