//! Bounded string reads from untrusted memory.
//!
//! Copies NUL-terminated strings of unknown length from a caller-designated
//! address into a fixed-capacity destination. Every access goes through the
//! platform's bounded read primitive, so an arbitrary (or adversarial)
//! source address can fail the copy but never the calling kernel path.

use axerrno::{AxError, AxResult};

use crate::platform::{self, AddrSpace};

/// Substitute value written when the source string cannot be read.
pub const FALLBACK_NAME: &[u8] = b"unknown\0";

/// Copy a NUL-terminated string from `src` into `dst`.
///
/// At most `dst.len() - 1` bytes are copied; `dst` is always NUL-terminated
/// at the end of the copied data, even on truncation. Bytes past the
/// terminator are left untouched.
///
/// # Arguments
/// * `src` - Source address in the given address space.
/// * `space` - Whether `src` is a user-space or kernel-space address.
/// * `dst` - Destination buffer; its length is the capacity bound.
///
/// # Returns
/// The number of bytes copied, excluding the terminator. Fails with
/// [`AxError::BadAddress`] if the source is inaccessible, including a
/// string that runs into an unreadable page before its terminator.
pub fn read_str_bounded(src: usize, space: AddrSpace, dst: &mut [u8]) -> AxResult<usize> {
    if dst.is_empty() {
        return Err(AxError::InvalidInput);
    }
    if src == 0 {
        return Err(AxError::BadAddress);
    }

    let cap = dst.len();
    let mut copied = 0;
    while copied < cap - 1 {
        let mut byte = [0u8; 1];
        platform::probe_read(src.wrapping_add(copied), space, &mut byte)?;
        if byte[0] == 0 {
            break;
        }
        dst[copied] = byte[0];
        copied += 1;
    }
    dst[copied] = 0;
    Ok(copied)
}

/// Copy a string like [`read_str_bounded`], substituting the fallback
/// literal when the source is unreadable.
///
/// On failure the destination holds [`FALLBACK_NAME`] followed by zeros and
/// the returned length is the fallback's length, so the caller always sees
/// a valid, non-negative length and a terminated buffer. `dst` must be at
/// least `FALLBACK_NAME.len()` bytes.
pub fn read_str_or_fallback(src: usize, space: AddrSpace, dst: &mut [u8]) -> i32 {
    match read_str_bounded(src, space, dst) {
        Ok(n) => n as i32,
        Err(_) => {
            // A failed copy may have written bytes before faulting; none of
            // them may survive into the record.
            dst.fill(0);
            dst[..FALLBACK_NAME.len()].copy_from_slice(FALLBACK_NAME);
            (FALLBACK_NAME.len() - 1) as i32
        }
    }
}
