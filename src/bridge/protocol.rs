//! Control-socket wire protocol: `[u32 LE length][u8 type][payload]`, the
//! same length-prefixed TLV shape used elsewhere in this codebase's socket
//! layer, with one addition the client-fd handoff needs — `CONFIG`'s
//! payload is accompanied by ancillary `SCM_RIGHTS` data carrying the
//! instance's `shm_fd` followed by each qpair's `enq_fd`/`deq_fd` in
//! ascending order, per §6.1's fd ordering rule.

use std::io;

/// Message type tags.
pub mod msg_type {
    /// `HELLO{instance_name}` — client → bridge, first message.
    pub const HELLO: u8 = 0x01;
    /// `CONFIG{num_qpairs, shm_size, shm_base_hint, log2_queue_size}` —
    /// bridge → client, with fds carried out-of-band.
    pub const CONFIG: u8 = 0x02;
    /// `READY{}` — client → bridge, rings may now carry descriptors.
    pub const READY: u8 = 0x03;
    /// `BYE{}` — either direction, graceful teardown.
    pub const BYE: u8 = 0x04;
}

/// Cap on a single frame's payload, guarding against a misbehaving peer
/// claiming an unbounded length prefix.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// One decoded control-socket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// First message from the client, naming the instance it wants to
    /// attach to.
    Hello {
        /// Name of the instance the client is requesting.
        instance_name: String,
    },
    /// Capability/configuration reply. The fds referenced here travel as
    /// ancillary data alongside this frame, not in the payload.
    Config {
        /// Number of per-worker qpairs the client should expect fds for.
        num_qpairs: u32,
        /// Size in bytes of the shared-memory segment.
        shm_size: u64,
        /// `log2` of each qpair's ring size.
        log2_queue_size: u8,
    },
    /// Client signals it has mapped the segment and is ready for traffic.
    Ready,
    /// Graceful teardown request.
    Bye,
}

impl Message {
    /// Encode this message's `[type][payload]` body (the length prefix is
    /// added by [`encode_frame`]).
    fn encode_body(&self) -> Vec<u8> {
        match self {
            Message::Hello { instance_name } => {
                let mut buf = vec![msg_type::HELLO];
                buf.extend_from_slice(instance_name.as_bytes());
                buf
            }
            Message::Config { num_qpairs, shm_size, log2_queue_size } => {
                let mut buf = vec![msg_type::CONFIG];
                buf.extend_from_slice(&num_qpairs.to_le_bytes());
                buf.extend_from_slice(&shm_size.to_le_bytes());
                buf.push(*log2_queue_size);
                buf
            }
            Message::Ready => vec![msg_type::READY],
            Message::Bye => vec![msg_type::BYE],
        }
    }

    /// Encode the full length-prefixed frame.
    #[must_use]
    pub fn encode_frame(&self) -> Vec<u8> {
        let body = self.encode_body();
        let mut frame = Vec::with_capacity(4 + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    fn decode_body(body: &[u8]) -> io::Result<Self> {
        let (&tag, rest) = body
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "empty frame body"))?;
        match tag {
            msg_type::HELLO => {
                let instance_name = String::from_utf8(rest.to_vec())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Message::Hello { instance_name })
            }
            msg_type::CONFIG => {
                if rest.len() < 13 {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "short CONFIG frame"));
                }
                let num_qpairs = u32::from_le_bytes(rest[0..4].try_into().unwrap());
                let shm_size = u64::from_le_bytes(rest[4..12].try_into().unwrap());
                let log2_queue_size = rest[12];
                Ok(Message::Config { num_qpairs, shm_size, log2_queue_size })
            }
            msg_type::READY => Ok(Message::Ready),
            msg_type::BYE => Ok(Message::Bye),
            other => Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown frame type {other:#x}"))),
        }
    }
}

/// Reassembles length-prefixed frames from a byte stream, tolerating
/// partial reads and multiple frames arriving in one read.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly-read bytes in; returns every complete [`Message`] now
    /// available, in arrival order. Incomplete trailing bytes are retained
    /// for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> io::Result<Vec<Message>> {
        self.buf.extend_from_slice(bytes);
        let mut messages = Vec::new();

        loop {
            if self.buf.len() < 4 {
                break;
            }
            let len = u32::from_le_bytes(self.buf[0..4].try_into().unwrap());
            if len == 0 {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "zero-length frame"));
            }
            if len > MAX_FRAME_SIZE {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "frame exceeds MAX_FRAME_SIZE"));
            }
            let total = 4 + len as usize;
            if self.buf.len() < total {
                break;
            }
            let body = self.buf[4..total].to_vec();
            messages.push(Message::decode_body(&body)?);
            self.buf.drain(..total);
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trips() {
        let msg = Message::Hello { instance_name: "ids0".to_string() };
        let frame = msg.encode_frame();
        let mut decoder = FrameDecoder::new();
        let decoded = decoder.feed(&frame).unwrap();
        assert_eq!(decoded, vec![msg]);
    }

    #[test]
    fn config_round_trips() {
        let msg = Message::Config { num_qpairs: 4, shm_size: 1 << 20, log2_queue_size: 8 };
        let frame = msg.encode_frame();
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.feed(&frame).unwrap(), vec![msg]);
    }

    #[test]
    fn partial_frame_reassembles_byte_at_a_time() {
        let msg = Message::Ready;
        let frame = msg.encode_frame();
        let mut decoder = FrameDecoder::new();
        let mut out = Vec::new();
        for b in &frame {
            out.extend(decoder.feed(std::slice::from_ref(b)).unwrap());
        }
        assert_eq!(out, vec![msg]);
    }

    #[test]
    fn multiple_frames_in_one_feed() {
        let mut bytes = Message::Hello { instance_name: "a".to_string() }.encode_frame();
        bytes.extend(Message::Bye.encode_frame());
        let mut decoder = FrameDecoder::new();
        let decoded = decoder.feed(&bytes).unwrap();
        assert_eq!(decoded, vec![Message::Hello { instance_name: "a".to_string() }, Message::Bye]);
    }

    #[test]
    fn zero_length_frame_is_rejected() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&0u32.to_le_bytes()).is_err());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut decoder = FrameDecoder::new();
        let bytes = (MAX_FRAME_SIZE + 1).to_le_bytes();
        assert!(decoder.feed(&bytes).is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut decoder = FrameDecoder::new();
        let mut frame = 1u32.to_le_bytes().to_vec();
        frame.push(0xEE);
        assert!(decoder.feed(&frame).is_err());
    }
}
