//! Platform abstraction layer for kernel operations.
//!
//! This module provides an abstraction over the kernel facilities the capture
//! engine depends on (CPU ID, current-task identity, and raw bounded memory
//! reads) to allow testing in user space.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use axerrno::{AxError, AxResult};
use spin::Mutex;

use crate::record::TASK_COMM_LEN;

/// Address space a raw read targets.
///
/// Trace-point context data and dynamic fields live in kernel memory; a
/// syscall argument pointer refers to the triggering task's user memory.
/// The distinction is an explicit parameter, never an implicit assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AddrSpace {
    /// The triggering task's user address range.
    User,
    /// Kernel address space.
    Kernel,
}

/// Platform operations trait.
///
/// Abstracts over kernel-specific operations to enable mock testing. The
/// crate routes every access through the fixed [`Platform`] alias below:
/// [`MockPlatform`] under test or without the `axhal` feature,
/// [`RealPlatform`] otherwise (see its docs for what that backend can and
/// cannot supply).
pub trait PlatformOps {
    /// Get current CPU ID.
    fn cpu_id() -> u32;

    /// Get the combined pid/tgid of the currently executing task.
    ///
    /// The low 32 bits are the per-task id exported in capture records.
    fn current_pid_tgid() -> u64;

    /// Get the short command name of the currently executing task.
    ///
    /// Already bounded and NUL-terminated by the kernel.
    fn current_comm() -> [u8; TASK_COMM_LEN];

    /// Read exactly `dst.len()` bytes from `addr` in the given address space.
    ///
    /// Fails with [`AxError::BadAddress`] if any byte of the range is
    /// inaccessible from the current context (unmapped, permission fault,
    /// truncated page). Must never block or fault the caller.
    fn probe_read(addr: usize, space: AddrSpace, dst: &mut [u8]) -> AxResult<()>;
}

// =============================================================================
// Real Implementation (kernel environment with axhal)
// =============================================================================

/// Real platform operations using axhal.
///
/// axhal exposes the CPU id but carries no task model and no fault-trapped
/// user access: `current_pid_tgid` and `current_comm` report the null task,
/// and user-space reads fail, degrading syscall-entry captures to the
/// fallback filename. Full-fidelity captures need the embedding kernel's
/// task and exception-table support behind these operations.
#[cfg(all(not(test), feature = "axhal"))]
pub struct RealPlatform;

#[cfg(all(not(test), feature = "axhal"))]
impl PlatformOps for RealPlatform {
    fn cpu_id() -> u32 {
        axhal::percpu::this_cpu_id() as u32
    }

    fn current_pid_tgid() -> u64 {
        // axhal has no task abstraction; the null task identity stands in
        // until the embedding kernel wires its own in here.
        0
    }

    fn current_comm() -> [u8; TASK_COMM_LEN] {
        [0u8; TASK_COMM_LEN]
    }

    fn probe_read(addr: usize, space: AddrSpace, dst: &mut [u8]) -> AxResult<()> {
        // Fault trapping for user reads requires the embedding kernel's
        // exception tables; kernel reads are plain volatile copies.
        if space == AddrSpace::User || addr == 0 {
            return Err(AxError::BadAddress);
        }
        for (i, b) in dst.iter_mut().enumerate() {
            *b = unsafe { core::ptr::read_volatile((addr + i) as *const u8) };
        }
        Ok(())
    }
}

// =============================================================================
// Mock Implementation (test environment or no axhal)
// =============================================================================

/// Mock CPU ID for testing.
static MOCK_CPU_ID: AtomicU64 = AtomicU64::new(0);

/// Mock pid/tgid for testing.
static MOCK_PID_TGID: AtomicU64 = AtomicU64::new(0);

/// Mock task comm for testing.
static MOCK_COMM: Mutex<[u8; TASK_COMM_LEN]> = Mutex::new([0u8; TASK_COMM_LEN]);

/// Mock address-space contents: (space, base address) -> bytes.
///
/// Reads resolve byte-by-byte against the registered ranges; any byte
/// outside every range is treated as an unmapped page.
static MOCK_MEMORY: Mutex<BTreeMap<(AddrSpace, usize), Vec<u8>>> = Mutex::new(BTreeMap::new());

/// Mock platform operations for testing.
#[cfg(any(test, not(feature = "axhal")))]
pub struct MockPlatform;

#[cfg(any(test, not(feature = "axhal")))]
impl PlatformOps for MockPlatform {
    fn cpu_id() -> u32 {
        MOCK_CPU_ID.load(Ordering::Relaxed) as u32
    }

    fn current_pid_tgid() -> u64 {
        MOCK_PID_TGID.load(Ordering::Relaxed)
    }

    fn current_comm() -> [u8; TASK_COMM_LEN] {
        *MOCK_COMM.lock()
    }

    fn probe_read(addr: usize, space: AddrSpace, dst: &mut [u8]) -> AxResult<()> {
        let memory = MOCK_MEMORY.lock();
        'bytes: for (i, b) in dst.iter_mut().enumerate() {
            let want = addr.wrapping_add(i);
            // Find a registered range covering this byte.
            for (&(s, base), bytes) in memory.iter() {
                if s == space && want >= base && want < base + bytes.len() {
                    *b = bytes[want - base];
                    continue 'bytes;
                }
            }
            return Err(AxError::BadAddress);
        }
        Ok(())
    }
}

/// Set mock CPU ID for testing.
pub fn set_mock_cpu_id(id: u32) {
    MOCK_CPU_ID.store(id as u64, Ordering::Relaxed);
}

/// Set mock pid/tgid for testing.
pub fn set_mock_pid_tgid(pid_tgid: u64) {
    MOCK_PID_TGID.store(pid_tgid, Ordering::Relaxed);
}

/// Set mock task comm for testing.
///
/// Truncated and NUL-terminated to `TASK_COMM_LEN`, as the kernel itself
/// guarantees for real comms.
pub fn set_mock_comm(name: &[u8]) {
    let mut comm = [0u8; TASK_COMM_LEN];
    let n = name.len().min(TASK_COMM_LEN - 1);
    comm[..n].copy_from_slice(&name[..n]);
    *MOCK_COMM.lock() = comm;
}

/// Register a readable byte range in the mock address space.
///
/// Tests place source strings (and fake trace contexts) at arbitrary
/// addresses; anything not registered reads as an unmapped page.
pub fn map_mock_bytes(space: AddrSpace, addr: usize, bytes: &[u8]) {
    MOCK_MEMORY.lock().insert((space, addr), bytes.to_vec());
}

/// Remove a previously registered byte range from the mock address space.
pub fn unmap_mock_bytes(space: AddrSpace, addr: usize) {
    MOCK_MEMORY.lock().remove(&(space, addr));
}

// =============================================================================
// Platform Type Alias
// =============================================================================

/// The active platform implementation.
///
/// In kernel environment with axhal: RealPlatform (uses axhal)
/// In test environment or without axhal: MockPlatform (mock task state and
/// a registered fake address space)
#[cfg(all(not(test), feature = "axhal"))]
pub type Platform = RealPlatform;

#[cfg(any(test, not(feature = "axhal")))]
pub type Platform = MockPlatform;

// =============================================================================
// Convenience Functions
// =============================================================================

/// Get current CPU ID.
#[inline]
pub fn cpu_id() -> u32 {
    Platform::cpu_id()
}

/// Get the current task's combined pid/tgid.
#[inline]
pub fn current_pid_tgid() -> u64 {
    Platform::current_pid_tgid()
}

/// Get the current task's short command name.
#[inline]
pub fn current_comm() -> [u8; TASK_COMM_LEN] {
    Platform::current_comm()
}

/// Read exactly `dst.len()` bytes from the given address.
#[inline]
pub fn probe_read(addr: usize, space: AddrSpace, dst: &mut [u8]) -> AxResult<()> {
    Platform::probe_read(addr, space, dst)
}

// =============================================================================
// Tests
// =============================================================================
