//! Process-execution event records.
//!
//! Fixed-layout records exported across the transport boundary, plus the
//! fill logic that populates one from the currently executing task. Two
//! capacity profiles exist: a short form used by the syscall-entry capture
//! strategy and a long form used by the scheduler-exec strategy. The two
//! profiles are not wire-compatible; a consumer must know which channel it
//! is reading.

use crate::locator::DataLoc;
use crate::platform::{self, AddrSpace};
use crate::reader;

/// Capacity of the task comm field, matching the kernel's TASK_COMM_LEN.
pub const TASK_COMM_LEN: usize = 16;

/// Filename capacity of the short record profile.
pub const FNAME_SHORT_LEN: usize = 32;

/// Filename capacity of the long record profile, matching the kernel's
/// maximum filename length.
pub const FNAME_MAX_LEN: usize = 512;

/// A process-execution event record.
///
/// `repr(C)` with all fields naturally aligned, so the layout has no
/// implicit padding and can be copied across the transport boundary as raw
/// bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExecEvent<const CAP: usize> {
    /// Low 32 bits of the combined pid/tgid observed at trigger time.
    pub pid: u32,
    /// Short task name, truncated and NUL-terminated by the kernel itself.
    pub comm: [u8; TASK_COMM_LEN],
    /// Executable path, truncated and NUL-terminated by the capture logic.
    pub filename: [u8; CAP],
    /// Bytes actually captured into `filename`, or the fallback literal's
    /// length when the source was unreadable. Never exceeds `CAP - 1`.
    pub filename_len: i32,
}

/// Short record profile (syscall-entry strategy).
pub type ShortExecEvent = ExecEvent<FNAME_SHORT_LEN>;

/// Long record profile (scheduler-exec strategy).
pub type FullExecEvent = ExecEvent<FNAME_MAX_LEN>;

const _: () = assert!(core::mem::size_of::<ShortExecEvent>() == 56);
const _: () = assert!(core::mem::size_of::<FullExecEvent>() == 536);
const _: () = assert!(FNAME_SHORT_LEN >= reader::FALLBACK_NAME.len());

impl<const CAP: usize> ExecEvent<CAP> {
    /// An all-zero record. Reserved transport slots are reset to this before
    /// filling, so reused slots never leak a previous record's bytes.
    pub const fn zeroed() -> Self {
        Self {
            pid: 0,
            comm: [0; TASK_COMM_LEN],
            filename: [0; CAP],
            filename_len: 0,
        }
    }

    /// View this record as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        unsafe {
            core::slice::from_raw_parts(
                self as *const Self as *const u8,
                core::mem::size_of::<Self>(),
            )
        }
    }

    /// Parse one record from a raw byte slice.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < core::mem::size_of::<Self>() {
            return None;
        }
        Some(unsafe { core::ptr::read_unaligned(data.as_ptr() as *const Self) })
    }

    /// The captured filename bytes, without terminator or padding.
    ///
    /// A record whose filename equals the fallback literal means
    /// "path unknown", not an error.
    pub fn captured_filename(&self) -> &[u8] {
        let len = (self.filename_len.max(0) as usize).min(CAP.saturating_sub(1));
        &self.filename[..len]
    }

    /// The task comm bytes up to (excluding) the first NUL.
    pub fn comm_cstr(&self) -> &[u8] {
        let len = self
            .comm
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(TASK_COMM_LEN);
        &self.comm[..len]
    }
}

// =============================================================================
// Record Builder
// =============================================================================

/// Where a capture strategy finds the filename string.
#[derive(Debug, Clone, Copy)]
pub enum FilenameSource {
    /// A direct argument pointer into the triggering task's user memory
    /// (syscall-entry strategy).
    UserPtr(usize),
    /// A packed dynamic-field descriptor relative to the trace-point
    /// context base, in kernel memory (scheduler-exec strategy).
    DynamicField { ctx_base: usize, loc: DataLoc },
}

/// Populate `ev` from the currently executing task.
///
/// Single attempt per trigger; an unreadable filename source degrades to
/// the fallback literal, never to a dropped field, so the record is always
/// fully populated on return.
pub fn fill_exec_event<const CAP: usize>(ev: &mut ExecEvent<CAP>, source: FilenameSource) {
    ev.pid = platform::current_pid_tgid() as u32;
    ev.comm = platform::current_comm();

    let (addr, space) = match source {
        FilenameSource::UserPtr(ptr) => (ptr, AddrSpace::User),
        FilenameSource::DynamicField { ctx_base, loc } => {
            (loc.resolve(ctx_base), AddrSpace::Kernel)
        }
    };
    ev.filename_len = reader::read_str_or_fallback(addr, space, &mut ev.filename);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip_through_bytes() {
        let mut ev = ShortExecEvent::zeroed();
        ev.pid = 42;
        ev.comm[..3].copy_from_slice(b"ls\0");
        ev.filename[..8].copy_from_slice(b"/bin/ls\0");
        ev.filename_len = 7;

        let parsed = ShortExecEvent::from_bytes(ev.as_bytes()).unwrap();
        assert_eq!(parsed.pid, 42);
        assert_eq!(parsed.comm_cstr(), b"ls");
        assert_eq!(parsed.captured_filename(), b"/bin/ls");
    }

    #[test]
    fn test_from_bytes_rejects_short_input() {
        let data = [0u8; 55];
        assert!(ShortExecEvent::from_bytes(&data).is_none());
    }

    #[test]
    fn test_captured_filename_clamps_hostile_length() {
        let mut ev = ShortExecEvent::zeroed();
        ev.filename_len = -5;
        assert_eq!(ev.captured_filename(), b"");
        ev.filename_len = i32::MAX;
        assert_eq!(ev.captured_filename().len(), FNAME_SHORT_LEN - 1);
    }
}
