//! Probe attachment management.
//!
//! Selects which capture strategy is live, owns its transport channel for
//! the lifetime of the attachment, and exposes the verbose debug switch.
//! The two strategies are exposed as selectable, mutually exclusive
//! profiles: their record layouts are not wire-compatible, so a consumer
//! must know which one it is reading.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

use crate::probe::{ExecProbe, SchedExecProbe, SyscallEntryProbe, TraceContext};

/// Trace point the syscall-entry profile attaches to.
pub const SYSCALL_ENTRY_TRACEPOINT: &str = "syscalls:sys_enter_execve";

/// Trace point the scheduler-exec profile attaches to.
pub const SCHED_EXEC_TRACEPOINT: &str = "sched:sched_process_exec";

/// Global verbose mode switch for the best-effort per-event debug line.
static VERBOSE_MODE: AtomicBool = AtomicBool::new(false);

/// Enable or disable the per-event debug line.
///
/// This output is diagnostic only and not part of the transport contract.
pub fn set_verbose(enabled: bool) {
    VERBOSE_MODE.store(enabled, Ordering::SeqCst);
    log::info!(
        "capture verbose mode: {}",
        if enabled { "enabled" } else { "disabled" }
    );
}

/// Check if verbose mode is enabled.
pub fn is_verbose() -> bool {
    VERBOSE_MODE.load(Ordering::SeqCst)
}

/// Error types for attachment operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A profile is already attached.
    AlreadyAttached(CaptureProfile),
    /// No profile is attached.
    NotAttached,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyAttached(profile) => {
                write!(f, "Profile already attached: {}", profile)
            }
            Self::NotAttached => write!(f, "No capture profile attached"),
        }
    }
}

impl core::error::Error for Error {}

/// The selectable capture profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureProfile {
    /// Syscall-entry strategy: short records, per-CPU slot channel.
    SyscallEntry,
    /// Scheduler-exec strategy: long records, shared ring channel.
    SchedExec,
}

impl CaptureProfile {
    /// The trace-point name this profile attaches to.
    pub fn tracepoint_name(self) -> &'static str {
        match self {
            Self::SyscallEntry => SYSCALL_ENTRY_TRACEPOINT,
            Self::SchedExec => SCHED_EXEC_TRACEPOINT,
        }
    }
}

impl core::fmt::Display for CaptureProfile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.tracepoint_name())
    }
}

/// Handle to the attached probe.
///
/// The embedding kernel keeps a clone and invokes [`handle`](Self::handle)
/// directly from the trace point, so the trigger path takes no lock. The
/// channel's backing storage lives exactly as long as the attachment (plus
/// any handles still held).
#[derive(Clone)]
pub enum ProbeHandle {
    /// Syscall-entry probe.
    SyscallEntry(Arc<SyscallEntryProbe>),
    /// Scheduler-exec probe.
    SchedExec(Arc<SchedExecProbe>),
}

impl ProbeHandle {
    /// The profile this handle belongs to.
    pub fn profile(&self) -> CaptureProfile {
        match self {
            Self::SyscallEntry(_) => CaptureProfile::SyscallEntry,
            Self::SchedExec(_) => CaptureProfile::SchedExec,
        }
    }

    /// Dispatch one trigger. Always returns 0 ("handled").
    pub fn handle(&self, ctx: TraceContext) -> u32 {
        match self {
            Self::SyscallEntry(probe) => probe.handle(ctx),
            Self::SchedExec(probe) => probe.handle(ctx),
        }
    }
}

/// The currently attached probe, if any.
static ACTIVE: Mutex<Option<ProbeHandle>> = Mutex::new(None);

/// Attach a capture profile.
///
/// Creates the profile's transport channel and returns the handle the
/// embedding kernel wires into the trace point. Profiles are mutually
/// exclusive; attaching while another is live fails.
pub fn attach(profile: CaptureProfile) -> Result<ProbeHandle, Error> {
    let mut active = ACTIVE.lock();

    if let Some(existing) = active.as_ref() {
        return Err(Error::AlreadyAttached(existing.profile()));
    }

    let handle = match profile {
        CaptureProfile::SyscallEntry => {
            ProbeHandle::SyscallEntry(Arc::new(SyscallEntryProbe::new()))
        }
        CaptureProfile::SchedExec => ProbeHandle::SchedExec(Arc::new(SchedExecProbe::new())),
    };

    *active = Some(handle.clone());
    log::info!("Attached capture profile to {}", profile.tracepoint_name());
    Ok(handle)
}

/// Detach the current profile.
///
/// The registry's reference is dropped; channel storage is destroyed once
/// the last outstanding handle goes away.
///
/// # Returns
/// The detached profile on success.
pub fn detach() -> Result<CaptureProfile, Error> {
    let mut active = ACTIVE.lock();

    match active.take() {
        Some(handle) => {
            let profile = handle.profile();
            log::info!("Detached capture profile from {}", profile.tracepoint_name());
            Ok(profile)
        }
        None => Err(Error::NotAttached),
    }
}

/// Get the currently attached profile.
pub fn current() -> Option<CaptureProfile> {
    ACTIVE.lock().as_ref().map(ProbeHandle::profile)
}
