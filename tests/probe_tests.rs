//! End-to-end tests for the probe dispatchers.
//!
//! Builds fake trace contexts in the mock address space and drives both
//! capture strategies through a full trigger: reserve, fill, commit,
//! consume. Tests that touch the mock task identity are serialized.

use std::sync::{Mutex, MutexGuard};

use execprobe::channel::{PerCpuChannel, RingChannel, Transport};
use execprobe::platform::{map_mock_bytes, set_mock_comm, set_mock_pid_tgid, AddrSpace};
use execprobe::probe::{ExecProbe, SchedExecProbe, SyscallEntryProbe, TraceContext};
use execprobe::record::{FNAME_MAX_LEN, FNAME_SHORT_LEN};

/// Mock pid/comm are process-global; serialize the tests that set them.
static TASK_STATE: Mutex<()> = Mutex::new(());

fn lock_task_state() -> MutexGuard<'static, ()> {
    TASK_STATE.lock().unwrap_or_else(|e| e.into_inner())
}

/// Build a syscall-entry context at `ctx_base`: two unused 64-bit header
/// words, then the filename argument pointer.
fn map_execve_ctx(ctx_base: usize, filename_ptr: u64) {
    let mut ctx = [0u8; 24];
    ctx[16..24].copy_from_slice(&filename_ptr.to_ne_bytes());
    map_mock_bytes(AddrSpace::Kernel, ctx_base, &ctx);
}

/// Build a scheduler-exec context at `ctx_base`: 8-byte common header, the
/// packed filename descriptor, then the filename data at its offset.
fn map_sched_exec_ctx(ctx_base: usize, filename: &[u8]) {
    let data_offset = 16usize;
    let descriptor = ((filename.len() as u32) << 16) | data_offset as u32;

    let mut ctx = vec![0u8; data_offset + filename.len()];
    ctx[8..12].copy_from_slice(&descriptor.to_ne_bytes());
    ctx[data_offset..].copy_from_slice(filename);
    map_mock_bytes(AddrSpace::Kernel, ctx_base, &ctx);
}

// =============================================================================
// Strategy A: Syscall Entry
// =============================================================================

#[test]
fn test_syscall_entry_captures_user_filename() {
    let _guard = lock_task_state();
    set_mock_pid_tgid((4321u64 << 32) | 8765);
    set_mock_comm(b"ls");

    map_mock_bytes(AddrSpace::User, 0x5_0000, b"/bin/ls\0");
    map_execve_ctx(0x1_0000, 0x5_0000);

    let probe = SyscallEntryProbe::with_channel(PerCpuChannel::with_slot_count(4));
    assert_eq!(probe.handle(TraceContext::new(0x1_0000)), 0);

    let ev = probe.channel().consume().unwrap();
    assert_eq!(ev.pid, 8765);
    assert_eq!(ev.comm_cstr(), b"ls");
    assert_eq!(ev.filename_len, 7);
    assert_eq!(&ev.filename[..8], b"/bin/ls\0");
    // Zero padding to capacity.
    assert!(ev.filename[8..].iter().all(|&b| b == 0));
}

#[test]
fn test_syscall_entry_invalid_pointer_degrades_to_fallback() {
    let _guard = lock_task_state();
    set_mock_pid_tgid(77);
    set_mock_comm(b"evil");

    // Context is readable but the filename pointer is not.
    map_execve_ctx(0x1_1000, 0xDEAD_0000);

    let probe = SyscallEntryProbe::with_channel(PerCpuChannel::with_slot_count(4));
    assert_eq!(probe.handle(TraceContext::new(0x1_1000)), 0);

    let ev = probe.channel().consume().unwrap();
    assert_eq!(ev.pid, 77);
    assert_eq!(ev.filename_len, 7);
    assert_eq!(&ev.filename[..8], b"unknown\0");
}

#[test]
fn test_syscall_entry_partial_read_leaves_no_source_bytes() {
    let _guard = lock_task_state();
    set_mock_pid_tgid(78);

    // The string runs into an unmapped page after more bytes than the
    // fallback literal covers; the record must carry only the literal.
    map_mock_bytes(AddrSpace::User, 0x5_1000, b"/usr/local/sbin");
    map_execve_ctx(0x1_5000, 0x5_1000);

    let probe = SyscallEntryProbe::with_channel(PerCpuChannel::with_slot_count(4));
    assert_eq!(probe.handle(TraceContext::new(0x1_5000)), 0);

    let ev = probe.channel().consume().unwrap();
    assert_eq!(ev.filename_len, 7);
    assert_eq!(&ev.filename[..8], b"unknown\0");
    assert!(ev.filename[8..].iter().all(|&b| b == 0));
}

#[test]
fn test_syscall_entry_unreadable_context_still_commits_fallback() {
    let _guard = lock_task_state();
    set_mock_pid_tgid(88);

    // Nothing mapped at the context base: the pointer read yields null and
    // the record still commits with the fallback literal.
    let probe = SyscallEntryProbe::with_channel(PerCpuChannel::with_slot_count(4));
    assert_eq!(probe.handle(TraceContext::new(0x1_2000)), 0);

    let ev = probe.channel().consume().unwrap();
    assert_eq!(&ev.filename[..8], b"unknown\0");
    assert_eq!(ev.filename_len, 7);
}

#[test]
fn test_syscall_entry_truncates_long_path() {
    let _guard = lock_task_state();
    set_mock_pid_tgid(99);

    let long_path = b"/opt/some/deeply/nested/install/prefix/bin/tool\0";
    assert!(long_path.len() > FNAME_SHORT_LEN);
    map_mock_bytes(AddrSpace::User, 0x5_2000, long_path);
    map_execve_ctx(0x1_3000, 0x5_2000);

    let probe = SyscallEntryProbe::with_channel(PerCpuChannel::with_slot_count(4));
    probe.handle(TraceContext::new(0x1_3000));

    let ev = probe.channel().consume().unwrap();
    assert_eq!(ev.filename_len as usize, FNAME_SHORT_LEN - 1);
    assert_eq!(&ev.filename[..FNAME_SHORT_LEN - 1], &long_path[..FNAME_SHORT_LEN - 1]);
    assert_eq!(ev.filename[FNAME_SHORT_LEN - 1], 0);
}

#[test]
fn test_syscall_entry_drops_when_channel_full() {
    let _guard = lock_task_state();
    set_mock_pid_tgid(11);

    map_mock_bytes(AddrSpace::User, 0x5_3000, b"/bin/sh\0");
    map_execve_ctx(0x1_4000, 0x5_3000);

    let probe = SyscallEntryProbe::with_channel(PerCpuChannel::with_slot_count(2));
    for _ in 0..3 {
        // Dropped or not, the trigger is always "handled".
        assert_eq!(probe.handle(TraceContext::new(0x1_4000)), 0);
    }
    assert_eq!(probe.channel().dropped(), 1);

    let mut drained = 0;
    while probe.channel().consume().is_some() {
        drained += 1;
    }
    assert_eq!(drained, 2);
}

// =============================================================================
// Strategy B: Scheduler Exec
// =============================================================================

#[test]
fn test_sched_exec_captures_dynamic_field() {
    let _guard = lock_task_state();
    set_mock_pid_tgid((1u64 << 32) | 3141);
    set_mock_comm(b"python3");

    map_sched_exec_ctx(0x2_0000, b"/usr/bin/python3\0");

    let probe = SchedExecProbe::with_channel(RingChannel::with_capacity(8));
    assert_eq!(probe.handle(TraceContext::new(0x2_0000)), 0);

    let ev = probe.channel().consume().unwrap();
    assert_eq!(ev.pid, 3141);
    assert_eq!(ev.comm_cstr(), b"python3");
    assert_eq!(ev.filename_len, 16);
    assert_eq!(ev.captured_filename(), b"/usr/bin/python3");
    assert!(ev.filename[17..].iter().all(|&b| b == 0));
}

#[test]
fn test_sched_exec_bad_descriptor_degrades_to_fallback() {
    let _guard = lock_task_state();
    set_mock_pid_tgid(2718);

    // Descriptor points far outside the mapped context.
    let mut ctx = [0u8; 16];
    ctx[8..12].copy_from_slice(&0x0010_F000u32.to_ne_bytes());
    map_mock_bytes(AddrSpace::Kernel, 0x2_1000, &ctx);

    let probe = SchedExecProbe::with_channel(RingChannel::with_capacity(8));
    assert_eq!(probe.handle(TraceContext::new(0x2_1000)), 0);

    let ev = probe.channel().consume().unwrap();
    assert_eq!(ev.pid, 2718);
    assert_eq!(ev.filename_len, 7);
    assert_eq!(&ev.filename[..8], b"unknown\0");
}

#[test]
fn test_sched_exec_full_ring_drops_then_recovers() {
    let _guard = lock_task_state();
    set_mock_pid_tgid(5);

    map_sched_exec_ctx(0x2_2000, b"/usr/bin/env\0");

    let probe = SchedExecProbe::with_channel(RingChannel::with_capacity(2));
    for _ in 0..3 {
        assert_eq!(probe.handle(TraceContext::new(0x2_2000)), 0);
    }
    // The third trigger produced no record and no side effects.
    assert_eq!(probe.channel().dropped(), 1);

    let mut drained = 0;
    while let Some(ev) = probe.channel().consume() {
        assert_eq!(ev.captured_filename(), b"/usr/bin/env");
        drained += 1;
    }
    assert_eq!(drained, 2);

    // Space freed by the drain is usable again; no partial record appears.
    assert_eq!(probe.handle(TraceContext::new(0x2_2000)), 0);
    assert_eq!(probe.channel().consume().unwrap().filename_len, 12);
    assert!(probe.channel().consume().is_none());
}

#[test]
fn test_sched_exec_long_profile_capacity() {
    let _guard = lock_task_state();
    set_mock_pid_tgid(6);

    // A path far beyond the short profile fits the long profile intact.
    let mut path = b"/usr/lib".to_vec();
    while path.len() < 300 {
        path.extend_from_slice(b"/component");
    }
    path.push(0);
    assert!(path.len() > FNAME_SHORT_LEN && path.len() < FNAME_MAX_LEN);

    map_sched_exec_ctx(0x2_3000, &path);

    let probe = SchedExecProbe::with_channel(RingChannel::with_capacity(2));
    probe.handle(TraceContext::new(0x2_3000));

    let ev = probe.channel().consume().unwrap();
    assert_eq!(ev.filename_len as usize, path.len() - 1);
    assert_eq!(ev.captured_filename(), &path[..path.len() - 1]);
}
