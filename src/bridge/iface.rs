//! Interface binding table: maps `(interface, direction)` to the ordered
//! list of instances a packet on that interface must traverse.

use std::collections::HashMap;

use crate::error::BridgeError;

/// Direction an instance is attached to an interface for. Bit flags, as in
/// the source table (`input = 0x01`, `output = 0x02`, `inout = 0x03`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachDirection {
    /// Traverse on ingress only.
    Input = 0x01,
    /// Traverse on egress only.
    Output = 0x02,
    /// Traverse on both ingress and egress.
    InOut = 0x03,
}

impl AttachDirection {
    /// Decode from the wire/CLI byte representation.
    pub fn from_byte(b: u8) -> Result<Self, BridgeError> {
        match b {
            0x01 => Ok(AttachDirection::Input),
            0x02 => Ok(AttachDirection::Output),
            0x03 => Ok(AttachDirection::InOut),
            other => Err(BridgeError::BadDirection(other)),
        }
    }

    fn wants_input(self) -> bool {
        matches!(self, AttachDirection::Input | AttachDirection::InOut)
    }

    fn wants_output(self) -> bool {
        matches!(self, AttachDirection::Output | AttachDirection::InOut)
    }
}

/// How a packet revisiting a bidirectionally-attached instance is handled.
/// Open Question in the design notes: the original data suggests
/// traversing twice but does not pin this down, so it is made explicit and
/// configurable rather than silently picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidirectionalPolicy {
    /// An instance attached as `inout` is visited once per packet,
    /// regardless of whether the traversal is input or output.
    TraverseOnce,
    /// An instance attached as `inout` is visited on both the input and
    /// output traversal of the same packet (two separate descriptors).
    TraverseTwice,
}

/// Per-interface instance attachment lists, ordered by insertion.
#[derive(Debug, Clone, Default)]
struct InterfaceData {
    input_instances: Vec<u32>,
    output_instances: Vec<u32>,
}

/// Maps interfaces to the instances they traverse.
#[derive(Debug)]
pub struct InterfaceTable {
    interfaces: HashMap<u32, InterfaceData>,
    policy: BidirectionalPolicy,
}

impl InterfaceTable {
    /// Create an empty table with the given bidirectional-attach policy.
    #[must_use]
    pub fn new(policy: BidirectionalPolicy) -> Self {
        Self { interfaces: HashMap::new(), policy }
    }

    /// Attach `instance_id` to `if_id` for `direction`. Idempotent per
    /// direction: attaching the same instance twice for the same direction
    /// does not duplicate it in the traversal list.
    pub fn attach(&mut self, if_id: u32, instance_id: u32, direction: AttachDirection) {
        let entry = self.interfaces.entry(if_id).or_default();
        if direction.wants_input() && !entry.input_instances.contains(&instance_id) {
            entry.input_instances.push(instance_id);
        }
        if direction.wants_output() && !entry.output_instances.contains(&instance_id) {
            entry.output_instances.push(instance_id);
        }
    }

    /// Detach every instance from `if_id` (used by `interface_detach_all`).
    pub fn detach_all(&mut self, if_id: u32) {
        self.interfaces.remove(&if_id);
    }

    /// Instances an ingress packet on `if_id` must traverse, in attach order.
    #[must_use]
    pub fn input_instances(&self, if_id: u32) -> &[u32] {
        self.interfaces.get(&if_id).map_or(&[], |d| d.input_instances.as_slice())
    }

    /// Instances an egress packet on `if_id` must traverse, in attach order.
    #[must_use]
    pub fn output_instances(&self, if_id: u32) -> &[u32] {
        self.interfaces.get(&if_id).map_or(&[], |d| d.output_instances.as_slice())
    }

    /// True if `instance_id` is attached to any interface (used to gate
    /// `instance_delete`).
    #[must_use]
    pub fn instance_in_use(&self, instance_id: u32) -> bool {
        self.interfaces.values().any(|d| {
            d.input_instances.contains(&instance_id) || d.output_instances.contains(&instance_id)
        })
    }

    /// The configured bidirectional-attach policy.
    #[must_use]
    pub fn policy(&self) -> BidirectionalPolicy {
        self.policy
    }
}
