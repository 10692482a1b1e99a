//! Instance lifecycle and the bridge's control surface (§6.3).
//!
//! An `Instance` owns one shared-memory segment and one `RingPair` per
//! worker. Mutation of the instance/interface tables happens only from the
//! main thread under a configuration barrier; workers observe an
//! atomically-swapped snapshot (`arc_swap::ArcSwap`), per §5's design note.

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::bridge::eventfd::EventFd;
use crate::bridge::iface::{AttachDirection, BidirectionalPolicy, InterfaceTable};
use crate::bridge::ring::{QPairLayout, RingPair};
use crate::bridge::shm::SharedSegment;
use crate::bridge::stats::Stats;
use crate::error::BridgeError;

/// Result of offering one packet to an instance's ring pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Published to the ring; the caller should call `notify_enq` once per
    /// batch rather than per packet.
    Queued,
    /// No client is connected; the instance's `drop_on_disconnect` policy
    /// decides whether the caller forwards or drops.
    NoClient,
    /// The ring was full; the packet is dropped.
    Congested,
}

/// A configured IDS endpoint: a shared-memory segment and one ring pair per
/// worker.
pub struct Instance {
    id: u32,
    name: String,
    /// `None` until a client has completed the `HELLO`/`CONFIG` handshake.
    segment: Option<SharedSegment>,
    qpairs: Vec<RingPair>,
    /// Forward in-flight packets with `PASS` on disconnect instead of
    /// dropping them.
    pub drop_on_disconnect: bool,
    pub stats: Stats,
    has_client: bool,
    log2_queue_size: u8,
    num_workers: usize,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("num_qpairs", &self.qpairs.len())
            .field("has_client", &self.has_client)
            .finish()
    }
}

impl Instance {
    /// This instance's id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// This instance's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` once a client has completed the handshake.
    #[must_use]
    pub fn has_client(&self) -> bool {
        self.has_client
    }

    /// Mutable access to one worker's ring pair.
    pub fn qpair_mut(&mut self, worker: usize) -> Option<&mut RingPair> {
        self.qpairs.get_mut(worker)
    }

    /// Mark a client attached, after the control-socket handshake
    /// completes.
    pub fn mark_client_attached(&mut self) {
        self.has_client = true;
    }

    /// `(shm_fd, shm_size, log2_queue_size, [(enq_fd, deq_fd); num_qpairs])`
    /// for the `CONFIG` handoff, or `None` if this instance's segment has
    /// not been (re)allocated — call [`Instance::reattach`] first on the
    /// reconnect path.
    #[must_use]
    pub fn handoff_info(&self) -> Option<(RawFd, u64, u8, Vec<(RawFd, RawFd)>)> {
        let segment = self.segment.as_ref()?;
        let fds = self.qpairs.iter().map(RingPair::fds).collect();
        Some((segment.as_raw_fd(), segment.len() as u64, self.log2_queue_size, fds))
    }

    /// Recreate this instance's shared-memory segment and ring pairs if a
    /// prior [`Instance::disconnect`] tore them down. A client reconnecting
    /// after a clean disconnect (spec.md §3.1: "reconnect requires prior
    /// clean disconnect or forced disconnect") gets a freshly allocated
    /// segment and qpairs, the same way `Bridge::instance_create` builds
    /// them for a brand-new instance. A no-op if the segment is already
    /// live.
    pub fn reattach(&mut self) -> Result<(), BridgeError> {
        if self.segment.is_some() {
            return Ok(());
        }
        let (segment, qpairs) = allocate_segment_and_qpairs(&self.name, self.num_workers, self.log2_queue_size)?;
        self.segment = Some(segment);
        self.qpairs = qpairs;
        Ok(())
    }

    /// Enqueue one packet on `worker`'s ring pair, per the enqueue graph
    /// node's per-packet step (§4.3).
    pub fn try_enqueue(
        &mut self,
        worker: usize,
        buffer_index: u32,
        length: u32,
        address: u64,
        next_index: u16,
    ) -> EnqueueOutcome {
        if !self.has_client {
            return EnqueueOutcome::NoClient;
        }
        let Some(qpair) = self.qpairs.get_mut(worker) else {
            return EnqueueOutcome::NoClient;
        };
        match qpair.produce(buffer_index, length, address, next_index) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(_) => {
                self.stats.record_congestion_drop();
                EnqueueOutcome::Congested
            }
        }
    }

    /// Signal `enq_fd` for `worker`'s ring, once per batch.
    pub fn notify_enq(&self, worker: usize) {
        if let Some(qpair) = self.qpairs.get(worker) {
            qpair.notify_enq();
        }
    }

    /// Drain every verdict available on `worker`'s ring pair, if its
    /// `deq_fd` is signaled, dispatching each to `forwarder`.
    pub fn drain_worker(&mut self, worker: usize, forwarder: &mut dyn crate::bridge::graph::Forwarder) {
        let Some(qpair) = self.qpairs.get_mut(worker) else {
            return;
        };
        if !qpair.deq_ready() {
            return;
        }
        let stats = &self.stats;
        qpair.consume(
            |buffer_index, next_index, action| {
                if action.forwards() {
                    stats.record_forwarded(1);
                    forwarder.forward(next_index, buffer_index);
                } else {
                    forwarder.drop_packet(buffer_index);
                }
            },
            || stats.record_decode_error(),
        );
    }

    /// Handle client disconnect per §4.1: forfeit every in-flight slot.
    /// With `drop_on_disconnect`, all shadowed packets are dropped;
    /// otherwise they are forwarded with `PASS` to the caller-supplied
    /// sink. The ring pairs and their shared-memory segment are then torn
    /// down entirely (not merely reset), per §5's resource discipline
    /// ("every event-fd ... is owned by exactly one component and released
    /// on one well-defined path: client disconnect for rings/shm"): a
    /// disconnected instance keeps no ring pair a `qpair_mut`/`try_enqueue`/
    /// `drain_worker` call could reach, so none can dereference a pointer
    /// into the unmapped segment. A later client completing `HELLO`
    /// reattaches fresh resources via [`Instance::reattach`].
    pub fn disconnect(&mut self, mut forward_pass: impl FnMut(u32, u16)) {
        for qpair in &mut self.qpairs {
            let inflight = qpair.in_flight_slots();
            if self.drop_on_disconnect {
                self.stats.record_disconnect_drop(inflight.len() as u64);
            } else {
                for (buf, next) in inflight {
                    forward_pass(buf, next);
                }
                self.stats.record_forwarded(0);
            }
        }
        self.has_client = false;
        self.qpairs.clear();
        self.segment = None;
    }
}

/// Allocate a shared-memory segment sized for `num_workers` qpairs of
/// `2^log2_queue_size` slots each, plus one `RingPair` view per worker over
/// a disjoint region of that segment. Shared by `Bridge::instance_create`
/// (first allocation) and `Instance::reattach` (reallocation on reconnect).
fn allocate_segment_and_qpairs(
    name: &str,
    num_workers: usize,
    log2_queue_size: u8,
) -> Result<(SharedSegment, Vec<RingPair>), BridgeError> {
    let layout = QPairLayout::compute(log2_queue_size);
    let segment_name = format!("snort-bridge-{name}");
    let total_size = layout.region_size() * num_workers;
    let mut segment = SharedSegment::create(&segment_name, total_size)
        .map_err(|e| BridgeError::InstanceNotFound(format!("shm create failed: {e}")))?;

    let base = segment.as_mut_ptr();
    let mut qpairs = Vec::with_capacity(num_workers);
    for worker in 0..num_workers {
        let offset = worker * layout.region_size();
        // SAFETY: each worker's region is disjoint (`worker *
        // layout.region_size()`) and the segment outlives every `RingPair`
        // built from it, since both are stored together in `Instance` and
        // are only ever replaced as a pair (never freed out from under a
        // live `RingPair`) by `Instance::disconnect`/`Instance::reattach`.
        let qpair_base = unsafe { base.add(offset) };
        let enq_fd = EventFd::new().map_err(|e| BridgeError::InstanceNotFound(e.to_string()))?;
        let deq_fd = EventFd::new().map_err(|e| BridgeError::InstanceNotFound(e.to_string()))?;
        // SAFETY: `qpair_base` is valid for `layout.region_size()` bytes
        // and not aliased by any other `RingPair`.
        let ring = unsafe { RingPair::new(qpair_base, layout, enq_fd, deq_fd) };
        qpairs.push(ring);
    }
    Ok((segment, qpairs))
}

/// Process-wide instance table plus the interface binding table,
/// published as one atomically-swapped snapshot for worker reads.
pub struct Bridge {
    next_instance_id: u32,
    instances: HashMap<u32, Instance>,
    instance_by_name: HashMap<String, u32>,
    ifaces: InterfaceTable,
    num_workers: usize,
    config_snapshot: Arc<ArcSwap<ConfigSnapshot>>,
}

/// The read-only view workers consult; swapped atomically whenever the
/// main thread mutates instance/interface state.
#[derive(Debug, Default, Clone)]
pub struct ConfigSnapshot {
    /// instance_id -> worker index -> qpair capacity, for workers that need
    /// to know ring sizing without touching the instance table directly.
    pub instance_ids: Vec<u32>,
}

impl Bridge {
    /// Create an empty bridge with `num_workers` workers per instance and
    /// the given bidirectional-attach policy (§9 Open Question).
    #[must_use]
    pub fn new(num_workers: usize, bidirectional_policy: BidirectionalPolicy) -> Self {
        Self {
            next_instance_id: 0,
            instances: HashMap::new(),
            instance_by_name: HashMap::new(),
            ifaces: InterfaceTable::new(bidirectional_policy),
            num_workers,
            config_snapshot: Arc::new(ArcSwap::from_pointee(ConfigSnapshot::default())),
        }
    }

    /// A cloneable handle workers can poll for the latest configuration
    /// snapshot without locking.
    #[must_use]
    pub fn config_snapshot_handle(&self) -> Arc<ArcSwap<ConfigSnapshot>> {
        Arc::clone(&self.config_snapshot)
    }

    fn publish_snapshot(&self) {
        let snapshot = ConfigSnapshot { instance_ids: self.instances.keys().copied().collect() };
        self.config_snapshot.store(Arc::new(snapshot));
    }

    /// `instance_create(name, log2_queue_size, drop_on_disconnect)`.
    ///
    /// Allocates the shared-memory segment sized for `num_workers` qpairs
    /// and one `EventFd` pair per qpair, but does not yet hand any fd to a
    /// client — that happens when a client completes `HELLO`/`CONFIG`.
    pub fn instance_create(
        &mut self,
        name: &str,
        log2_queue_size: u8,
        drop_on_disconnect: bool,
    ) -> Result<u32, BridgeError> {
        if self.instance_by_name.contains_key(name) {
            return Err(BridgeError::DuplicateInstance(name.to_string()));
        }

        let (segment, qpairs) = allocate_segment_and_qpairs(name, self.num_workers, log2_queue_size)?;

        let id = self.next_instance_id;
        self.next_instance_id += 1;

        let instance = Instance {
            id,
            name: name.to_string(),
            segment: Some(segment),
            qpairs,
            drop_on_disconnect,
            stats: Stats::default(),
            has_client: false,
            log2_queue_size,
            num_workers: self.num_workers,
        };

        self.instances.insert(id, instance);
        self.instance_by_name.insert(name.to_string(), id);
        self.publish_snapshot();
        Ok(id)
    }

    /// `interface_attach(instance_name, if_id, direction)`.
    pub fn interface_attach(&mut self, instance_name: &str, if_id: u32, direction: AttachDirection) -> Result<(), BridgeError> {
        let instance_id = *self
            .instance_by_name
            .get(instance_name)
            .ok_or_else(|| BridgeError::InstanceNotFound(instance_name.to_string()))?;
        self.ifaces.attach(if_id, instance_id, direction);
        self.publish_snapshot();
        Ok(())
    }

    /// `interface_detach_all(if_id)`.
    pub fn interface_detach_all(&mut self, if_id: u32) {
        self.ifaces.detach_all(if_id);
        self.publish_snapshot();
    }

    /// `instance_disconnect(instance_id)`: tears down the client session,
    /// the segment, and every ring pair, without removing the instance from
    /// the table. A later `HELLO` against the same instance name reattaches
    /// fresh resources via [`Instance::reattach`].
    pub fn instance_disconnect(&mut self, instance_id: u32, mut forward_pass: impl FnMut(u32, u16)) -> Result<(), BridgeError> {
        let instance = self
            .instances
            .get_mut(&instance_id)
            .ok_or(BridgeError::InstanceNotFound(instance_id.to_string()))?;
        instance.disconnect(&mut forward_pass);
        Ok(())
    }

    /// `instance_delete(instance_id)`. Rejected while any interface still
    /// references the instance.
    pub fn instance_delete(&mut self, instance_id: u32) -> Result<(), BridgeError> {
        if self.ifaces.instance_in_use(instance_id) {
            return Err(BridgeError::InstanceInUse(instance_id.to_string()));
        }
        let instance = self
            .instances
            .remove(&instance_id)
            .ok_or(BridgeError::InstanceNotFound(instance_id.to_string()))?;
        self.instance_by_name.remove(instance.name());
        self.publish_snapshot();
        Ok(())
    }

    /// Look up an instance by name.
    #[must_use]
    pub fn instance_by_name(&self, name: &str) -> Option<&Instance> {
        self.instance_by_name.get(name).and_then(|id| self.instances.get(id))
    }

    /// Mutable lookup by id, used by the enqueue/dequeue graph nodes.
    pub fn instance_mut(&mut self, instance_id: u32) -> Option<&mut Instance> {
        self.instances.get_mut(&instance_id)
    }

    /// Interface binding table, for the enqueue node's instance lookup.
    #[must_use]
    pub fn interfaces(&self) -> &InterfaceTable {
        &self.ifaces
    }
}
