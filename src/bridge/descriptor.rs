//! Descriptor layout: the fixed-size record a ring pair exchanges between
//! bridge and client, and its `Action` verdict enum.
//!
//! The layout in [`Descriptor::to_wire`]/[`Descriptor::from_wire`] is the
//! wire contract between this process and the client process that maps the
//! same shared-memory segment; both sides must agree on it byte-for-byte,
//! so it is exercised by round-trip tests rather than left to `#[repr]`
//! alone.

use crate::error::BridgeError;

/// Size in bytes of one descriptor on the wire: `u32 + u32 + u64 + u8 + u8[7]`.
pub const DESCRIPTOR_SIZE: usize = 24;

/// The client's verdict for a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Forward the packet to its stored successor.
    Pass,
    /// Forward the packet to the drop next node.
    Drop,
    /// Forward the packet to the drop next node (distinct reason code from
    /// `Drop`, same graph effect).
    Block,
    /// Replace the packet's bytes before forwarding. No payload convention
    /// is defined on the wire yet; decoding this action is rejected with
    /// [`BridgeError::ReplaceNotSupported`] rather than guessed at.
    Replace,
    /// Forward and mark the flow as whitelisted for future descriptors.
    Whitelist,
    /// Forward to drop next and mark the flow as blacklisted.
    Blacklist,
}

impl Action {
    const PASS: u8 = 0;
    const DROP: u8 = 1;
    const BLOCK: u8 = 2;
    const REPLACE: u8 = 3;
    const WHITELIST: u8 = 4;
    const BLACKLIST: u8 = 5;

    fn to_wire(self) -> u8 {
        match self {
            Action::Pass => Self::PASS,
            Action::Drop => Self::DROP,
            Action::Block => Self::BLOCK,
            Action::Replace => Self::REPLACE,
            Action::Whitelist => Self::WHITELIST,
            Action::Blacklist => Self::BLACKLIST,
        }
    }

    fn from_wire(byte: u8) -> Result<Self, BridgeError> {
        match byte {
            Self::PASS => Ok(Action::Pass),
            Self::DROP => Ok(Action::Drop),
            Self::BLOCK => Ok(Action::Block),
            Self::REPLACE => Ok(Action::Replace),
            Self::WHITELIST => Ok(Action::Whitelist),
            Self::BLACKLIST => Ok(Action::Blacklist),
            _ => Err(BridgeError::InvalidAction(byte)),
        }
    }

    /// True for actions that forward the packet to its original successor
    /// rather than a drop path.
    #[must_use]
    pub fn forwards(self) -> bool {
        matches!(self, Action::Pass | Action::Whitelist)
    }
}

/// A fixed-size packet descriptor: `{buffer_index, length, address, action}`.
///
/// `address` is an opaque client-visible handle into the shared buffer pool
/// (the bridge never dereferences it); `buffer_index` is the bridge-side
/// index used to look up `buffer_indices`/`next_indices` shadow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    /// Index into the bridge's buffer pool.
    pub buffer_index: u32,
    /// Packet length in bytes.
    pub length: u32,
    /// Opaque address the client uses to locate the buffer in shared
    /// memory.
    pub address: u64,
    /// The verdict, `Pass` until the client overwrites it.
    pub action: Action,
}

impl Descriptor {
    /// Encode to the 24-byte little-endian wire layout.
    #[must_use]
    pub fn to_wire(self) -> [u8; DESCRIPTOR_SIZE] {
        let mut buf = [0u8; DESCRIPTOR_SIZE];
        buf[0..4].copy_from_slice(&self.buffer_index.to_le_bytes());
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8..16].copy_from_slice(&self.address.to_le_bytes());
        buf[16] = self.action.to_wire();
        // buf[17..24] reserved, left zeroed.
        buf
    }

    /// Decode from the 24-byte little-endian wire layout.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidAction`] if the action byte is not one
    /// of the recognized values, and [`BridgeError::ReplaceNotSupported`]
    /// if the decoded action is `replace` (see module docs).
    pub fn from_wire(buf: &[u8; DESCRIPTOR_SIZE]) -> Result<Self, BridgeError> {
        let buffer_index = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let length = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let address = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let action = Action::from_wire(buf[16])?;
        if action == Action::Replace {
            return Err(BridgeError::ReplaceNotSupported);
        }
        Ok(Descriptor { buffer_index, length, address, action })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_pass_descriptor() {
        let d = Descriptor { buffer_index: 7, length: 1500, address: 0xdead_beef, action: Action::Pass };
        let wire = d.to_wire();
        assert_eq!(wire.len(), DESCRIPTOR_SIZE);
        let back = Descriptor::from_wire(&wire).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn reserved_bytes_are_zero() {
        let d = Descriptor { buffer_index: 1, length: 2, address: 3, action: Action::Drop };
        let wire = d.to_wire();
        assert_eq!(&wire[17..24], &[0u8; 7]);
    }

    #[test]
    fn replace_action_is_rejected_on_decode() {
        let d = Descriptor { buffer_index: 0, length: 0, address: 0, action: Action::Pass };
        let mut wire = d.to_wire();
        wire[16] = Action::REPLACE;
        assert_eq!(Descriptor::from_wire(&wire), Err(BridgeError::ReplaceNotSupported));
    }

    #[test]
    fn unknown_action_byte_is_rejected() {
        let mut wire = [0u8; DESCRIPTOR_SIZE];
        wire[16] = 0xff;
        assert_eq!(Descriptor::from_wire(&wire), Err(BridgeError::InvalidAction(0xff)));
    }

    #[test]
    fn forwards_distinguishes_pass_whitelist_from_drop_block_blacklist() {
        assert!(Action::Pass.forwards());
        assert!(Action::Whitelist.forwards());
        assert!(!Action::Drop.forwards());
        assert!(!Action::Block.forwards());
        assert!(!Action::Blacklist.forwards());
    }
}
