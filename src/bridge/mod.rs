//! The IDS bridge: lock-free shared-memory ring pairs, a control socket for
//! client handoff, and the enqueue/dequeue graph nodes that move packets
//! between them (spec §3.1, §4.1-§4.3, §6.1, §6.3).

pub mod client;
pub mod descriptor;
pub mod eventfd;
pub mod graph;
pub mod iface;
pub mod instance;
pub mod protocol;
pub mod ring;
pub mod server;
pub mod shm;
pub mod stats;

pub use descriptor::{Action, Descriptor};
pub use graph::{dequeue_node, enqueue_node, Forwarder, Packet};
pub use iface::{AttachDirection, BidirectionalPolicy};
pub use instance::{Bridge, Instance};
pub use server::{accept_loop, run_control_loop, ControlRequest, HelloReply};
