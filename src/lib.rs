//! Process-execution event capture and transport engine.
//!
//! A kernel-resident probe that triggers on process-execution trace points,
//! safely extracts a small set of fields from untrusted kernel and user
//! memory, builds a fixed-layout record, and hands it to a bounded,
//! non-blocking transport channel for a user-space reader — without ever
//! blocking or failing the triggering kernel path.
//!
//! # Capture profiles
//!
//! Two mutually exclusive strategies are selectable at attach time:
//!
//! - `CaptureProfile::SyscallEntry` — triggers at entry of the
//!   process-execution syscall; the filename is read from the calling
//!   task's user memory into short records carried by per-CPU slots.
//! - `CaptureProfile::SchedExec` — triggers at the kernel's exec commit
//!   point; the filename sits at a dynamic offset inside the trace-point
//!   context and is read from kernel memory into long records carried by a
//!   shared reserve/commit ring.
//!
//! # Quick Start
//!
//! ```ignore
//! use execprobe::{attach, CaptureProfile, TraceContext};
//!
//! // At probe setup time:
//! let handle = attach::attach(CaptureProfile::SchedExec)?;
//!
//! // From the trace point, on every trigger:
//! handle.handle(TraceContext::new(ctx_base));
//!
//! // From the external reader:
//! if let execprobe::ProbeHandle::SchedExec(probe) = &handle {
//!     while let Some(event) = probe.channel().consume() {
//!         // forward `event`
//!     }
//! }
//! ```
//!
//! Per-trigger failures never escape the engine: an exhausted channel drops
//! the record (counted), an unreadable string degrades to the `"unknown"`
//! fallback literal, and the dispatcher reports "handled" either way.

#![no_std]

extern crate alloc;

// =============================================================================
// Platform Abstraction (for testing support)
// =============================================================================

pub mod platform;

// =============================================================================
// Capture Engine
// =============================================================================

pub mod channel;
pub mod locator;
pub mod reader;
pub mod record;

pub mod attach;
pub mod probe;

// Re-export key types for convenience
pub use attach::{CaptureProfile, Error as AttachError, ProbeHandle, is_verbose, set_verbose};
pub use channel::{
    Error as ChannelError, PerCpuChannel, Reservation, RingChannel, Transport,
};
pub use locator::DataLoc;
pub use platform::AddrSpace;
pub use probe::{ExecProbe, SchedExecProbe, SyscallEntryProbe, TraceContext};
pub use reader::FALLBACK_NAME;
pub use record::{ExecEvent, FilenameSource, FullExecEvent, ShortExecEvent};
