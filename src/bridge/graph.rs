//! Enqueue and dequeue graph nodes (§4.3): the per-worker routines that
//! publish packets to an instance's ring and drain its verdicts.
//!
//! Named after the "graph node" terminology the source component design
//! uses; there is no packet-processing graph runtime here, just the two
//! functions a real one would call per tick.

use crate::bridge::instance::{Bridge, EnqueueOutcome};

/// One packet offered to the bridge by the caller's graph: the instance it
/// targets and the successor node to use once a verdict is known.
#[derive(Debug, Clone, Copy)]
pub struct Packet {
    /// Index into the caller's buffer pool.
    pub buffer_index: u32,
    /// Packet length in bytes.
    pub length: u32,
    /// Opaque address the client uses to locate the buffer.
    pub address: u64,
    /// Instance this packet must be inspected by.
    pub instance_id: u32,
    /// Graph successor to forward to once a verdict is known.
    pub next_index: u16,
}

/// Sink the enqueue/dequeue nodes use to hand a packet to its next graph
/// node, or to the drop path. Kept as a trait so tests and a real packet
/// graph can both provide an implementation.
pub trait Forwarder {
    /// Forward `buffer_index` to `next_index`.
    fn forward(&mut self, next_index: u16, buffer_index: u32);
    /// Drop `buffer_index` (sent to the drop next node).
    fn drop_packet(&mut self, buffer_index: u32);
}

/// Enqueue node: group `packets` by instance, and for each instance publish
/// descriptors via the instance's ring pair for `worker`. Packets destined
/// for an instance with no connected client are forwarded or dropped per
/// that instance's `drop_on_disconnect` policy (§4.3).
pub fn enqueue_node(bridge: &mut Bridge, worker: usize, packets: &[Packet], forwarder: &mut dyn Forwarder) {
    use std::collections::BTreeMap;

    let mut by_instance: BTreeMap<u32, Vec<&Packet>> = BTreeMap::new();
    for p in packets {
        by_instance.entry(p.instance_id).or_default().push(p);
    }

    for (instance_id, pkts) in by_instance {
        let Some(instance) = bridge.instance_mut(instance_id) else {
            for p in pkts {
                forwarder.drop_packet(p.buffer_index);
            }
            continue;
        };

        let mut queued_any = false;
        for p in pkts {
            match instance.try_enqueue(worker, p.buffer_index, p.length, p.address, p.next_index) {
                EnqueueOutcome::Queued => queued_any = true,
                EnqueueOutcome::Congested => forwarder.drop_packet(p.buffer_index),
                EnqueueOutcome::NoClient => {
                    if instance.drop_on_disconnect {
                        forwarder.drop_packet(p.buffer_index);
                    } else {
                        forwarder.forward(p.next_index, p.buffer_index);
                    }
                }
            }
        }

        if queued_any {
            instance.notify_enq(worker);
        }
    }
}

/// Dequeue node: for every instance, if `worker`'s ring has a pending
/// `deq_fd` wakeup, drain it fully before returning, so one wakeup
/// consumes all available verdicts (§4.3).
pub fn dequeue_node(bridge: &mut Bridge, worker: usize, instance_ids: &[u32], forwarder: &mut dyn Forwarder) {
    for &instance_id in instance_ids {
        if let Some(instance) = bridge.instance_mut(instance_id) {
            instance.drain_worker(worker, forwarder);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::iface::BidirectionalPolicy;

    #[derive(Default)]
    struct RecordingForwarder {
        forwarded: Vec<(u16, u32)>,
        dropped: Vec<u32>,
    }

    impl Forwarder for RecordingForwarder {
        fn forward(&mut self, next_index: u16, buffer_index: u32) {
            self.forwarded.push((next_index, buffer_index));
        }
        fn drop_packet(&mut self, buffer_index: u32) {
            self.dropped.push(buffer_index);
        }
    }

    #[test]
    fn no_client_with_drop_on_disconnect_drops_packets() {
        let mut bridge = Bridge::new(1, BidirectionalPolicy::TraverseOnce);
        let id = bridge.instance_create("ids0", 4, true).unwrap();
        let mut fwd = RecordingForwarder::default();
        let packets = [Packet { buffer_index: 1, length: 64, address: 0, instance_id: id, next_index: 0 }];
        enqueue_node(&mut bridge, 0, &packets, &mut fwd);
        assert_eq!(fwd.dropped, vec![1]);
        assert!(fwd.forwarded.is_empty());
    }

    #[test]
    fn no_client_without_drop_on_disconnect_forwards_packets() {
        let mut bridge = Bridge::new(1, BidirectionalPolicy::TraverseOnce);
        let id = bridge.instance_create("ids0", 4, false).unwrap();
        let mut fwd = RecordingForwarder::default();
        let packets = [Packet { buffer_index: 1, length: 64, address: 0, instance_id: id, next_index: 7 }];
        enqueue_node(&mut bridge, 0, &packets, &mut fwd);
        assert_eq!(fwd.forwarded, vec![(7, 1)]);
        assert!(fwd.dropped.is_empty());
    }

    #[test]
    fn congested_ring_drops_only_the_overflow_packet() {
        let mut bridge = Bridge::new(1, BidirectionalPolicy::TraverseOnce);
        let id = bridge.instance_create("ids0", 0, true).unwrap(); // single slot
        bridge.instance_mut(id).unwrap().mark_client_attached();
        let mut fwd = RecordingForwarder::default();
        let packets = [
            Packet { buffer_index: 1, length: 64, address: 0, instance_id: id, next_index: 0 },
            Packet { buffer_index: 2, length: 64, address: 0, instance_id: id, next_index: 0 },
        ];
        enqueue_node(&mut bridge, 0, &packets, &mut fwd);
        assert_eq!(fwd.dropped, vec![2]);
    }

    #[test]
    fn dequeue_node_forwards_pass_and_drops_others() {
        let mut bridge = Bridge::new(1, BidirectionalPolicy::TraverseOnce);
        let id = bridge.instance_create("ids0", 4, true).unwrap();
        bridge.instance_mut(id).unwrap().mark_client_attached();
        {
            let instance = bridge.instance_mut(id).unwrap();
            let qpair = instance.qpair_mut(0).unwrap();
            qpair.produce(10, 64, 0, 3).unwrap();
            qpair.produce(11, 64, 0, 4).unwrap();
            let mut client_cursor = 0;
            qpair.test_client_ack_all(crate::bridge::descriptor::Action::Pass, &mut client_cursor);
        }
        let mut fwd = RecordingForwarder::default();
        dequeue_node(&mut bridge, 0, &[id], &mut fwd);
        assert_eq!(fwd.forwarded, vec![(3, 10), (4, 11)]);
    }
}
