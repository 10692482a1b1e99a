//! The lock-free SPSC descriptor ring pair: one per (worker, instance).
//!
//! Layout and protocol follow §4.1/§6.1: cursors each on their own cache
//! line, descriptors 8-aligned, release-store on publish, acquire-load on
//! observe. Grounded on the raw-pointer shared-memory ring in
//! `bearcove-dodeca/rapace/shm.rs` (base pointer + pointer-arithmetic
//! accessors to atomics living inside the mapping) and the cache-padded
//! cursor layout in `tianbaoluo-nanolog-rs/spsc.rs`.

use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::bridge::descriptor::{Action, Descriptor, DESCRIPTOR_SIZE};
use crate::bridge::eventfd::EventFd;

/// One cache line, the minimum separation between the two cursors and the
/// descriptor array to avoid false sharing (§9 design note).
const CACHE_LINE: usize = 64;

/// Ring congestion: the producer must not block, so a full ring is reported
/// back to the caller to drop rather than retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Congested;

/// Byte layout of one qpair's region within an instance's shared segment.
#[derive(Debug, Clone, Copy)]
pub struct QPairLayout {
    capacity: u32,
    mask: u32,
    enq_head_offset: usize,
    deq_head_offset: usize,
    descriptors_offset: usize,
    enq_ring_offset: usize,
    deq_ring_offset: usize,
    region_size: usize,
}

impl QPairLayout {
    /// Compute the layout for a ring of `2^log2_queue_size` slots.
    #[must_use]
    pub fn compute(log2_queue_size: u8) -> Self {
        let capacity: u32 = 1u32 << u32::from(log2_queue_size);
        let mask = capacity - 1;

        let enq_head_offset = 0;
        let deq_head_offset = CACHE_LINE;
        let descriptors_offset = CACHE_LINE * 2;
        let descriptors_bytes = capacity as usize * DESCRIPTOR_SIZE;
        let enq_ring_offset = descriptors_offset + descriptors_bytes;
        let enq_ring_bytes = capacity as usize * 4;
        let deq_ring_offset = enq_ring_offset + enq_ring_bytes;
        let deq_ring_bytes = capacity as usize * 4;
        let raw_size = deq_ring_offset + deq_ring_bytes;
        let region_size = raw_size.div_ceil(CACHE_LINE) * CACHE_LINE;

        Self {
            capacity,
            mask,
            enq_head_offset,
            deq_head_offset,
            descriptors_offset,
            enq_ring_offset,
            deq_ring_offset,
            region_size,
        }
    }

    /// Number of descriptor slots (`2^log2_queue_size`).
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Total bytes this qpair's region occupies within the shared segment.
    #[must_use]
    pub fn region_size(&self) -> usize {
        self.region_size
    }
}

/// One worker's SPSC ring pair with a client, viewed over a region of
/// shared memory.
///
/// Bridge-private shadow state (`buffer_indices`, `next_indices`, the
/// freelist, `next_desc`) lives in normal process memory — only the
/// cursors, descriptor array, and index rings are visible to the client.
pub struct RingPair {
    layout: QPairLayout,
    base: *mut u8,
    buffer_indices: Box<[u32]>,
    next_indices: Box<[u16]>,
    freelist: Vec<u32>,
    next_desc: u32,
    local_deq_cursor: u32,
    enq_fd: EventFd,
    deq_fd: EventFd,
}

// SAFETY: `RingPair` has exclusive bridge-side ownership of `base`'s
// region; the only other accessor is the remote client, coordinated
// through the release/acquire cursor protocol documented on each method.
unsafe impl Send for RingPair {}

impl RingPair {
    /// Construct a ring pair view over `base`, which must point to at least
    /// `layout.region_size()` freshly-zeroed bytes.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `layout.region_size()`
    /// bytes for the entire lifetime of the returned `RingPair`, and must
    /// not be accessed by other bridge-side code.
    #[must_use]
    pub unsafe fn new(base: *mut u8, layout: QPairLayout, enq_fd: EventFd, deq_fd: EventFd) -> Self {
        let capacity = layout.capacity as usize;
        Self {
            layout,
            base,
            buffer_indices: vec![0u32; capacity].into_boxed_slice(),
            next_indices: vec![0u16; capacity].into_boxed_slice(),
            freelist: (0..layout.capacity).collect(),
            next_desc: 0,
            local_deq_cursor: 0,
            enq_fd,
            deq_fd,
        }
    }

    /// Number of descriptor slots in this ring.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.layout.capacity
    }

    fn enq_head_atomic(&self) -> &AtomicU32 {
        // SAFETY: offset is within the region and 4-byte aligned (cache-line aligned).
        unsafe { &*self.base.add(self.layout.enq_head_offset).cast::<AtomicU32>() }
    }

    fn deq_head_atomic(&self) -> &AtomicU32 {
        // SAFETY: offset is within the region and 4-byte aligned (cache-line aligned).
        unsafe { &*self.base.add(self.layout.deq_head_offset).cast::<AtomicU32>() }
    }

    fn descriptor_ptr(&self, slot: u32) -> *mut u8 {
        // SAFETY: `slot < capacity` is an invariant maintained by callers
        // (allocated from the freelist or `next_desc`, both bounded by mask).
        unsafe { self.base.add(self.layout.descriptors_offset + slot as usize * DESCRIPTOR_SIZE) }
    }

    fn enq_ring_ptr(&self, index: u32) -> *mut u8 {
        let i = (index & self.layout.mask) as usize;
        // SAFETY: `i < capacity` by the mask.
        unsafe { self.base.add(self.layout.enq_ring_offset + i * 4) }
    }

    fn deq_ring_ptr(&self, index: u32) -> *mut u8 {
        let i = (index & self.layout.mask) as usize;
        // SAFETY: `i < capacity` by the mask.
        unsafe { self.base.add(self.layout.deq_ring_offset + i * 4) }
    }

    fn write_descriptor(&self, slot: u32, desc: Descriptor) {
        let wire = desc.to_wire();
        // SAFETY: bridge has exclusive write access to this slot between
        // allocation and the subsequent release-store of `enq_head`.
        unsafe {
            std::ptr::copy_nonoverlapping(wire.as_ptr(), self.descriptor_ptr(slot), DESCRIPTOR_SIZE);
        }
    }

    fn read_descriptor(&self, slot: u32) -> Result<Descriptor, crate::error::BridgeError> {
        let mut buf = [0u8; DESCRIPTOR_SIZE];
        // SAFETY: bridge reads only after acquire-loading a `deq_head` that
        // has advanced past this slot, which happens-after the client's
        // release-store following its write to this slot.
        unsafe {
            std::ptr::copy_nonoverlapping(self.descriptor_ptr(slot), buf.as_mut_ptr(), DESCRIPTOR_SIZE);
        }
        Descriptor::from_wire(&buf)
    }

    fn write_enq_ring(&self, index: u32, slot: u32) {
        // SAFETY: see `enq_ring_ptr`; write precedes the release-store of `enq_head`.
        unsafe {
            std::ptr::write_unaligned(self.enq_ring_ptr(index).cast::<u32>(), slot.to_le());
        }
    }

    fn read_deq_ring(&self, index: u32) -> u32 {
        // SAFETY: see `deq_ring_ptr`; read follows the acquire-load of `deq_head`.
        u32::from_le(unsafe { std::ptr::read_unaligned(self.deq_ring_ptr(index).cast::<u32>()) })
    }

    fn alloc_slot(&mut self) -> u32 {
        if let Some(slot) = self.freelist.pop() {
            slot
        } else {
            let slot = self.next_desc;
            self.next_desc = (self.next_desc + 1) & self.layout.mask;
            slot
        }
    }

    /// Enqueue one descriptor per §4.1's produce algorithm. Returns
    /// [`Congested`] if `enq_head - deq_head == capacity`; the caller must
    /// drop the packet rather than retry.
    pub fn produce(
        &mut self,
        buffer_index: u32,
        length: u32,
        address: u64,
        next_index: u16,
    ) -> Result<(), Congested> {
        let enq_head = self.enq_head_atomic().load(Ordering::Relaxed);
        let deq_head = self.deq_head_atomic().load(Ordering::Acquire);
        if enq_head.wrapping_sub(deq_head) == self.layout.capacity {
            return Err(Congested);
        }

        let slot = self.alloc_slot();
        self.write_descriptor(slot, Descriptor { buffer_index, length, address, action: Action::Pass });
        self.buffer_indices[slot as usize] = buffer_index;
        self.next_indices[slot as usize] = next_index;
        self.write_enq_ring(enq_head, slot);
        self.enq_head_atomic().store(enq_head.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Signal `enq_fd` once, at a batch boundary (never per descriptor).
    pub fn notify_enq(&self) {
        self.enq_fd.signal();
    }

    /// `(enq_fd, deq_fd)` raw descriptors, for `SCM_RIGHTS` handoff to a
    /// newly-attached client, in that order per §6.1.
    #[must_use]
    pub fn fds(&self) -> (RawFd, RawFd) {
        (self.enq_fd.as_raw_fd(), self.deq_fd.as_raw_fd())
    }

    /// True if the client has signaled completions on this ring's `deq_fd`.
    #[must_use]
    pub fn deq_ready(&self) -> bool {
        self.deq_fd.is_ready()
    }

    /// Drain every verdict published since the last call, invoking `emit`
    /// with `(buffer_index, next_index, action)` for each, per §4.1's
    /// consume algorithm. Returns the number of descriptors drained.
    ///
    /// Descriptors that fail to decode (e.g. an unrecognized action byte,
    /// or `replace`, which is rejected per the wire contract) are counted
    /// by the caller rather than emitted; the slot is still freed.
    pub fn consume<E, F>(&mut self, mut emit: F, mut on_decode_error: E) -> usize
    where
        F: FnMut(u32, u16, Action),
        E: FnMut(),
    {
        let deq_head = self.deq_head_atomic().load(Ordering::Acquire);
        let mut n = 0usize;
        while self.local_deq_cursor != deq_head {
            let slot = self.read_deq_ring(self.local_deq_cursor);
            match self.read_descriptor(slot) {
                Ok(desc) => emit(self.buffer_indices[slot as usize], self.next_indices[slot as usize], desc.action),
                Err(_) => on_decode_error(),
            }
            self.freelist.push(slot);
            self.local_deq_cursor = self.local_deq_cursor.wrapping_add(1);
            n += 1;
        }
        // Drain deq_fd after the loop, unconditionally, so a wakeup that
        // arrives mid-drain is not lost.
        self.deq_fd.drain();
        n
    }

    /// Re-initialize the freelist to contain every slot and reset cursors,
    /// used on client disconnect once any still-shadowed packets have been
    /// accounted for.
    pub fn reset(&mut self) {
        self.freelist = (0..self.layout.capacity).collect();
        self.next_desc = 0;
        self.local_deq_cursor = 0;
        self.enq_head_atomic().store(0, Ordering::Release);
        self.deq_head_atomic().store(0, Ordering::Release);
    }

    /// `(buffer_index, next_index)` for every slot currently owned by the
    /// client (allocated but not yet freed), used by the disconnect path to
    /// decide drop-vs-forward for in-flight packets.
    #[must_use]
    pub fn in_flight_slots(&self) -> Vec<(u32, u16)> {
        let in_freelist: std::collections::HashSet<u32> = self.freelist.iter().copied().collect();
        (0..self.layout.capacity)
            .filter(|s| !in_freelist.contains(s))
            .map(|s| (self.buffer_indices[s as usize], self.next_indices[s as usize]))
            .collect()
    }

    /// Simulate the remote client's side of the protocol, for tests that
    /// exercise the ring without a second process: apply `action` to every
    /// descriptor enqueued since the client's own cursor, publish them on
    /// `deq_ring`, and advance `deq_head`.
    #[cfg(test)]
    pub(crate) fn test_client_ack_all(&mut self, action: Action, client_deq_ring_cursor: &mut u32) {
        let enq_head = self.enq_head_atomic().load(Ordering::Acquire);
        let mut deq_head = self.deq_head_atomic().load(Ordering::Relaxed);
        while *client_deq_ring_cursor != enq_head {
            let slot = self.read_enq_ring_for_test(*client_deq_ring_cursor);
            let mut desc = self.read_descriptor(slot).unwrap_or(Descriptor {
                buffer_index: 0,
                length: 0,
                address: 0,
                action: Action::Pass,
            });
            desc.action = action;
            self.write_descriptor(slot, desc);
            self.write_deq_ring_for_test(deq_head, slot);
            deq_head = deq_head.wrapping_add(1);
            *client_deq_ring_cursor = client_deq_ring_cursor.wrapping_add(1);
        }
        self.deq_head_atomic().store(deq_head, Ordering::Release);
        self.deq_fd.signal();
    }

    #[cfg(test)]
    fn read_enq_ring_for_test(&self, index: u32) -> u32 {
        u32::from_le(unsafe { std::ptr::read_unaligned(self.enq_ring_ptr(index).cast::<u32>()) })
    }

    #[cfg(test)]
    fn write_deq_ring_for_test(&self, index: u32, slot: u32) {
        unsafe {
            std::ptr::write_unaligned(self.deq_ring_ptr(index).cast::<u32>(), slot.to_le());
        }
    }
}

impl std::fmt::Debug for RingPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingPair")
            .field("capacity", &self.layout.capacity)
            .field("enq_head", &self.enq_head_atomic().load(Ordering::Relaxed))
            .field("deq_head", &self.deq_head_atomic().load(Ordering::Relaxed))
            .finish()
    }
}
