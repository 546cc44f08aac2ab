//! Probe dispatchers attached to the process-execution trace points.
//!
//! Two interchangeable capture strategies produce the same record shape
//! from different trigger points:
//!
//! - [`SyscallEntryProbe`]: fires at entry of the process-execution system
//!   call, before the new image is loaded. The filename is a direct
//!   argument pointer into the *calling* task's user memory; records go to
//!   a per-CPU slot channel in the short profile.
//! - [`SchedExecProbe`]: fires after the kernel has committed to the new
//!   image. The filename is embedded in the trace-point context at a
//!   dynamic offset and read from kernel memory; records go to a shared
//!   ring with reserve-then-commit semantics in the long profile.
//!
//! A dispatcher always reports "handled" to the kernel caller: a capture
//! failure must never propagate as a failure of the underlying execution
//! syscall or scheduling hook.

use crate::channel::{PerCpuChannel, RingChannel, Transport};
use crate::locator::DataLoc;
use crate::platform::{self, AddrSpace};
use crate::record::{self, FilenameSource, FNAME_MAX_LEN, FNAME_SHORT_LEN};

// Trace-point context layouts are tied to the target instruction set; a
// target without a known layout cannot host the capture engine at all.
#[cfg(all(
    feature = "axhal",
    not(any(target_arch = "x86_64", target_arch = "aarch64"))
))]
compile_error!("execprobe: no trace-point context layout for this target architecture");

/// Offset of the filename argument pointer within the syscall-entry
/// context: two unused 64-bit header words precede the argument block.
const EXECVE_FILENAME_PTR_OFFSET: usize = 16;

/// Offset of the packed filename descriptor within the scheduler-exec
/// context: the 8-byte common trace header precedes it.
const SCHED_EXEC_FILENAME_LOC_OFFSET: usize = 8;

/// Raw trace-point context handed to an attached probe.
///
/// Only the base address is trusted; every field access goes through the
/// platform's bounded read primitive, since the context lives in volatile
/// kernel memory.
#[derive(Debug, Clone, Copy)]
pub struct TraceContext {
    base: usize,
}

impl TraceContext {
    /// Wrap a raw context base address.
    pub fn new(base: usize) -> Self {
        Self { base }
    }

    /// The context's base address.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Read a 64-bit field at `offset`, or 0 if unreadable.
    fn read_u64(&self, offset: usize) -> u64 {
        let mut buf = [0u8; 8];
        match platform::probe_read(self.base.wrapping_add(offset), AddrSpace::Kernel, &mut buf) {
            Ok(()) => u64::from_ne_bytes(buf),
            Err(_) => 0,
        }
    }

    /// Read a 32-bit field at `offset`, or 0 if unreadable.
    fn read_u32(&self, offset: usize) -> u32 {
        let mut buf = [0u8; 4];
        match platform::probe_read(self.base.wrapping_add(offset), AddrSpace::Kernel, &mut buf) {
            Ok(()) => u32::from_ne_bytes(buf),
            Err(_) => 0,
        }
    }
}

/// A capture strategy attached to one trace point.
///
/// `handle` runs synchronously in the triggering task's kernel path and
/// must return promptly regardless of outcome; the return value is always
/// 0 ("handled").
pub trait ExecProbe: Send + Sync {
    /// Process one trigger.
    fn handle(&self, ctx: TraceContext) -> u32;
}

// =============================================================================
// Strategy A: syscall entry
// =============================================================================

/// Syscall-entry capture strategy (short record profile).
pub struct SyscallEntryProbe {
    channel: PerCpuChannel<FNAME_SHORT_LEN>,
}

impl SyscallEntryProbe {
    /// Create the probe with the default per-CPU slot count.
    pub fn new() -> Self {
        Self::with_channel(PerCpuChannel::new())
    }

    /// Create the probe around an explicit channel.
    pub fn with_channel(channel: PerCpuChannel<FNAME_SHORT_LEN>) -> Self {
        Self { channel }
    }

    /// The transport channel the external reader drains.
    pub fn channel(&self) -> &PerCpuChannel<FNAME_SHORT_LEN> {
        &self.channel
    }
}

impl Default for SyscallEntryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecProbe for SyscallEntryProbe {
    fn handle(&self, ctx: TraceContext) -> u32 {
        let Ok(mut res) = self.channel.reserve() else {
            return 0;
        };

        // An unreadable context yields a null pointer, which the builder
        // degrades to the fallback literal.
        let filename_ptr = ctx.read_u64(EXECVE_FILENAME_PTR_OFFSET) as usize;
        record::fill_exec_event(res.record_mut(), FilenameSource::UserPtr(filename_ptr));

        if crate::attach::is_verbose() {
            log::debug!(
                "execve filename: {}",
                core::str::from_utf8(res.record_mut().captured_filename())
                    .unwrap_or("<non-utf8>")
            );
        }

        res.commit();
        0
    }
}

// =============================================================================
// Strategy B: scheduler exec commit
// =============================================================================

/// Scheduler-exec capture strategy (long record profile).
pub struct SchedExecProbe {
    channel: RingChannel<FNAME_MAX_LEN>,
}

impl SchedExecProbe {
    /// Create the probe with the default ring capacity.
    pub fn new() -> Self {
        Self::with_channel(RingChannel::new())
    }

    /// Create the probe around an explicit channel.
    pub fn with_channel(channel: RingChannel<FNAME_MAX_LEN>) -> Self {
        Self { channel }
    }

    /// The transport channel the external reader drains.
    pub fn channel(&self) -> &RingChannel<FNAME_MAX_LEN> {
        &self.channel
    }
}

impl Default for SchedExecProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecProbe for SchedExecProbe {
    fn handle(&self, ctx: TraceContext) -> u32 {
        // Space for exactly one record is reserved before any field is
        // written; a full buffer drops the trigger with no side effects.
        let Ok(mut res) = self.channel.reserve() else {
            return 0;
        };

        let loc = DataLoc(ctx.read_u32(SCHED_EXEC_FILENAME_LOC_OFFSET));
        record::fill_exec_event(
            res.record_mut(),
            FilenameSource::DynamicField {
                ctx_base: ctx.base(),
                loc,
            },
        );

        if crate::attach::is_verbose() {
            log::debug!(
                "sched_process_exec filename: {}",
                core::str::from_utf8(res.record_mut().captured_filename())
                    .unwrap_or("<non-utf8>")
            );
        }

        res.commit();
        0
    }
}
