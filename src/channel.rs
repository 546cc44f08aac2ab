//! Bounded, non-blocking transport channels.
//!
//! A channel hands completed records from trigger context to an external
//! reader without ever blocking the producer. Reservation is a lock-free
//! compare-and-swap; commit is a single atomic store, so a reader never
//! observes a half-written record. Two backing strategies exist:
//!
//! - [`PerCpuChannel`]: per-CPU multiplexed slots. Each trigger claims an
//!   independent slot starting at its CPU's home position; no shared buffer
//!   and no visibility ordering between slots.
//! - [`RingChannel`]: one shared circular buffer with reserve-then-commit
//!   semantics. Reservation order determines the order in which records
//!   become visible to the consumer.
//!
//! Reservation fails (`Error::NoSpace`) rather than blocking or growing.
//! The consumer side assumes a single external reader, mirroring the one
//! user-space reader that drains the channel.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::platform;
use crate::record::ExecEvent;

/// Default slot count for the per-CPU channel.
pub const DEFAULT_SLOT_COUNT: usize = 256;

/// Default byte capacity for the shared ring channel.
pub const DEFAULT_RING_BYTES: usize = 256 * 1024;

/// Error types for channel operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No free slot or space; the record for this trigger is dropped.
    NoSpace,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoSpace => write!(f, "Channel has no free space"),
        }
    }
}

impl core::error::Error for Error {}

// =============================================================================
// Slot State Machine
// =============================================================================

/// Slot available for reservation.
const SLOT_FREE: u32 = 0;
/// Slot claimed by a producer, record being filled. Never visible to the
/// consumer.
const SLOT_RESERVED: u32 = 1;
/// Record fully written and visible to the consumer.
const SLOT_COMMITTED: u32 = 2;
/// Reservation abandoned without commit; reclaimed without being read.
const SLOT_CANCELLED: u32 = 3;

/// One fixed-maximum-size transport slot.
struct Slot<const CAP: usize> {
    state: AtomicU32,
    record: UnsafeCell<ExecEvent<CAP>>,
}

// The state machine serializes access to `record`: producers write only
// while holding SLOT_RESERVED, the single consumer reads only at
// SLOT_COMMITTED.
unsafe impl<const CAP: usize> Sync for Slot<CAP> {}
unsafe impl<const CAP: usize> Send for Slot<CAP> {}

impl<const CAP: usize> Slot<CAP> {
    fn new() -> Self {
        Self {
            state: AtomicU32::new(SLOT_FREE),
            record: UnsafeCell::new(ExecEvent::zeroed()),
        }
    }
}

fn alloc_slots<const CAP: usize>(count: usize) -> Box<[Slot<CAP>]> {
    let mut slots = Vec::with_capacity(count);
    slots.resize_with(count, Slot::new);
    slots.into_boxed_slice()
}

// =============================================================================
// Reservation
// =============================================================================

/// A claimed, not-yet-visible slot.
///
/// Fill the record through [`record_mut`](Self::record_mut), then make it
/// visible in one atomic step with [`commit`](Self::commit). Dropping a
/// reservation without committing cancels it; the consumer reclaims the
/// slot without ever exposing its contents.
pub struct Reservation<'a, const CAP: usize> {
    slot: &'a Slot<CAP>,
}

impl<const CAP: usize> Reservation<'_, CAP> {
    /// Exclusive access to the reserved record.
    pub fn record_mut(&mut self) -> &mut ExecEvent<CAP> {
        // Safe: SLOT_RESERVED excludes every other producer and the consumer.
        unsafe { &mut *self.slot.record.get() }
    }

    /// Publish the record to the consumer.
    pub fn commit(self) {
        self.slot.state.store(SLOT_COMMITTED, Ordering::Release);
        core::mem::forget(self);
    }
}

impl<const CAP: usize> Drop for Reservation<'_, CAP> {
    fn drop(&mut self) {
        self.slot.state.store(SLOT_CANCELLED, Ordering::Release);
    }
}

/// Common surface of the two backing strategies.
pub trait Transport<const CAP: usize> {
    /// Claim space for exactly one record, or fail without side effects.
    fn reserve(&self) -> Result<Reservation<'_, CAP>, Error>;

    /// Take the next visible record, if any. Single-consumer.
    fn consume(&self) -> Option<ExecEvent<CAP>>;

    /// Number of triggers dropped because reservation failed.
    fn dropped(&self) -> u64;
}

// =============================================================================
// Per-CPU Slot Channel
// =============================================================================

/// Per-CPU multiplexed slot channel.
///
/// Each trigger probes for a free slot starting at its CPU's home index, so
/// concurrent CPUs normally land on disjoint slots without contending.
/// Backpressure comes solely from the fixed slot count.
pub struct PerCpuChannel<const CAP: usize> {
    slots: Box<[Slot<CAP>]>,
    dropped: AtomicU64,
}

impl<const CAP: usize> PerCpuChannel<CAP> {
    /// Create a channel with the default slot count.
    pub fn new() -> Self {
        Self::with_slot_count(DEFAULT_SLOT_COUNT)
    }

    /// Create a channel with a fixed number of outstanding slots.
    pub fn with_slot_count(count: usize) -> Self {
        let count = count.max(1);
        Self {
            slots: alloc_slots(count),
            dropped: AtomicU64::new(0),
        }
    }

    /// Number of slots in the channel.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn try_claim(&self, idx: usize) -> bool {
        let state = &self.slots[idx].state;
        state
            .compare_exchange(SLOT_FREE, SLOT_RESERVED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            || state
                .compare_exchange(
                    SLOT_CANCELLED,
                    SLOT_RESERVED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
    }
}

impl<const CAP: usize> Default for PerCpuChannel<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> Transport<CAP> for PerCpuChannel<CAP> {
    fn reserve(&self) -> Result<Reservation<'_, CAP>, Error> {
        let len = self.slots.len();
        let home = platform::cpu_id() as usize % len;
        for i in 0..len {
            let idx = (home + i) % len;
            if self.try_claim(idx) {
                let slot = &self.slots[idx];
                unsafe { *slot.record.get() = ExecEvent::zeroed() };
                return Ok(Reservation { slot });
            }
        }
        self.dropped.fetch_add(1, Ordering::Relaxed);
        Err(Error::NoSpace)
    }

    fn consume(&self) -> Option<ExecEvent<CAP>> {
        for slot in self.slots.iter() {
            if slot.state.load(Ordering::Acquire) == SLOT_COMMITTED {
                let ev = unsafe { *slot.record.get() };
                slot.state.store(SLOT_FREE, Ordering::Release);
                return Some(ev);
            }
        }
        None
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Shared Ring Channel
// =============================================================================

/// Shared circular buffer with reservation/commit semantics.
///
/// Producers claim the next slot by advancing a monotonically increasing
/// reservation counter with CAS; the claim fails once the window between
/// producer and consumer counters reaches the slot count. The consumer
/// drains slots strictly in reservation order and stops at the first slot
/// that is reserved but not yet committed, so visibility order equals
/// reservation order and no partial record is ever exposed.
pub struct RingChannel<const CAP: usize> {
    slots: Box<[Slot<CAP>]>,
    /// Total reservations ever made; next slot index is `producer % len`.
    producer: AtomicUsize,
    /// Total records ever consumed; next read index is `consumer % len`.
    consumer: AtomicUsize,
    dropped: AtomicU64,
}

impl<const CAP: usize> RingChannel<CAP> {
    /// Create a ring with the default byte capacity.
    pub fn new() -> Self {
        Self::with_byte_size(DEFAULT_RING_BYTES)
    }

    /// Create a ring sized to hold as many records as fit in `bytes`.
    pub fn with_byte_size(bytes: usize) -> Self {
        Self::with_capacity(bytes / core::mem::size_of::<Slot<CAP>>())
    }

    /// Create a ring with space for `count` outstanding records.
    pub fn with_capacity(count: usize) -> Self {
        let count = count.max(1);
        Self {
            slots: alloc_slots(count),
            producer: AtomicUsize::new(0),
            consumer: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Number of records the ring can hold.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether no reservation is outstanding or committed.
    pub fn is_empty(&self) -> bool {
        self.producer.load(Ordering::Acquire) == self.consumer.load(Ordering::Acquire)
    }
}

impl<const CAP: usize> Default for RingChannel<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> Transport<CAP> for RingChannel<CAP> {
    fn reserve(&self) -> Result<Reservation<'_, CAP>, Error> {
        loop {
            let head = self.producer.load(Ordering::Acquire);
            let tail = self.consumer.load(Ordering::Acquire);
            if head.wrapping_sub(tail) >= self.slots.len() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(Error::NoSpace);
            }
            if self
                .producer
                .compare_exchange(
                    head,
                    head.wrapping_add(1),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                // The window check above guarantees the consumer has freed
                // this slot.
                let slot = &self.slots[head % self.slots.len()];
                slot.state.store(SLOT_RESERVED, Ordering::Release);
                unsafe { *slot.record.get() = ExecEvent::zeroed() };
                return Ok(Reservation { slot });
            }
        }
    }

    fn consume(&self) -> Option<ExecEvent<CAP>> {
        loop {
            let tail = self.consumer.load(Ordering::Acquire);
            if tail == self.producer.load(Ordering::Acquire) {
                return None;
            }
            let slot = &self.slots[tail % self.slots.len()];
            match slot.state.load(Ordering::Acquire) {
                SLOT_COMMITTED => {
                    let ev = unsafe { *slot.record.get() };
                    slot.state.store(SLOT_FREE, Ordering::Release);
                    self.consumer.store(tail.wrapping_add(1), Ordering::Release);
                    return Some(ev);
                }
                SLOT_CANCELLED => {
                    // Abandoned reservation: reclaim and keep draining.
                    slot.state.store(SLOT_FREE, Ordering::Release);
                    self.consumer.store(tail.wrapping_add(1), Ordering::Release);
                }
                // Reserved (or claimed but not yet marked): the record is
                // still being filled. Later commits stay invisible until
                // this one resolves, preserving reservation order.
                _ => return None,
            }
        }
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
