//! Client session: the control-socket state machine from §4.2, plus the
//! out-of-band fd handoff (`shm_fd`, then each qpair's `enq_fd`/`deq_fd`).
//!
//! The accept loop and per-connection task shape are grounded on this
//! codebase's existing `socket/server.rs`; the wire framing is grounded on
//! `socket/framing.rs`. Fd passing itself is not something this codebase's
//! socket layer does — that is grounded on the `nix`/`vmm-sys-util`
//! `SCM_RIGHTS` pattern used for virtqueue kick/call fd handoff in the
//! pack's other shared-memory examples.

use std::os::fd::{AsRawFd, RawFd};

use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::bridge::protocol::{FrameDecoder, Message};
use crate::error::BridgeError;

/// The client session's state, mirroring §4.2's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for `HELLO`.
    HelloWait,
    /// `HELLO` resolved; about to send `CONFIG`.
    ConfigSend,
    /// `CONFIG` sent, rings may carry descriptors once `READY` arrives.
    Ready,
    /// Torn down.
    Closed,
}

/// One connected client's session over the control socket.
pub struct ClientSession {
    stream: UnixStream,
    decoder: FrameDecoder,
    state: SessionState,
    /// Name the client asked for in `HELLO`, once known.
    pub instance_name: Option<String>,
}

impl ClientSession {
    /// Wrap a freshly-accepted stream, starting in `HelloWait`.
    #[must_use]
    pub fn new(stream: UnixStream) -> Self {
        Self { stream, decoder: FrameDecoder::new(), state: SessionState::HelloWait, instance_name: None }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Read bytes off the socket and return every message decoded so far.
    /// Only valid to call while `state() != Closed`.
    pub async fn read_messages(&mut self) -> std::io::Result<Vec<Message>> {
        let mut buf = [0u8; 4096];
        let n = self.stream.read(&mut buf).await?;
        if n == 0 {
            self.state = SessionState::Closed;
            return Ok(vec![]);
        }
        self.decoder.feed(&buf[..n])
    }

    /// Process a `HELLO`, transitioning to `ConfigSend` on success. The
    /// caller is responsible for instance lookup and duplicate-client
    /// rejection before calling this (this only records the name and
    /// advances the state machine).
    pub fn accept_hello(&mut self, instance_name: String) -> Result<(), BridgeError> {
        if self.state != SessionState::HelloWait {
            return Err(BridgeError::DuplicateClient(instance_name));
        }
        self.instance_name = Some(instance_name);
        self.state = SessionState::ConfigSend;
        Ok(())
    }

    /// Send `CONFIG{num_qpairs, shm_size, log2_queue_size}` with `shm_fd`
    /// followed by each qpair's `enq_fd`, `deq_fd` as ancillary data, in
    /// ascending qpair order per §4.2.
    pub async fn send_config(
        &mut self,
        num_qpairs: u32,
        shm_size: u64,
        log2_queue_size: u8,
        shm_fd: RawFd,
        qpair_fds: &[(RawFd, RawFd)],
    ) -> std::io::Result<()> {
        let msg = Message::Config { num_qpairs, shm_size, log2_queue_size };
        let frame = msg.encode_frame();

        let mut fds = Vec::with_capacity(1 + qpair_fds.len() * 2);
        fds.push(shm_fd);
        for (enq, deq) in qpair_fds {
            fds.push(*enq);
            fds.push(*deq);
        }

        send_frame_with_fds(&self.stream, &frame, &fds)?;
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Handle a `READY` or `BYE` message received once in `Ready` state.
    /// Returns `true` if the session should be torn down.
    #[must_use]
    pub fn handle_ready_state_message(&mut self, msg: &Message) -> bool {
        match msg {
            Message::Ready => false,
            Message::Bye => {
                self.state = SessionState::Closed;
                true
            }
            _ => false,
        }
    }

    /// Gracefully close the session, sending `BYE` first.
    pub async fn close(&mut self) -> std::io::Result<()> {
        let frame = Message::Bye.encode_frame();
        let _ = self.stream.write_all(&frame).await;
        self.state = SessionState::Closed;
        Ok(())
    }
}

/// Send `frame` over `stream` with `fds` as `SCM_RIGHTS` ancillary data.
///
/// This is a single synchronous `sendmsg(2)` call; fd handoff happens once
/// per client connection, so blocking the calling task briefly here (as
/// opposed to plumbing a fully async control-message path) is an accepted
/// tradeoff for simplicity.
fn send_frame_with_fds(stream: &UnixStream, frame: &[u8], fds: &[RawFd]) -> std::io::Result<()> {
    let raw = stream.as_raw_fd();
    let iov = [std::io::IoSlice::new(frame)];
    let cmsg = [ControlMessage::ScmRights(fds)];
    sendmsg::<()>(raw, &iov, &cmsg, MsgFlags::empty(), None).map_err(std::io::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hello_then_config_then_ready_transitions() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut session = ClientSession::new(a);
        assert_eq!(session.state(), SessionState::HelloWait);

        session.accept_hello("ids0".to_string()).unwrap();
        assert_eq!(session.state(), SessionState::ConfigSend);
        assert_eq!(session.instance_name.as_deref(), Some("ids0"));

        // Use stdin/stdout-like fds as stand-ins for shm/eventfd handles in
        // this test; their validity as real mappings is covered by
        // `bridge::shm`/`bridge::eventfd` tests.
        let dummy_fd = std::io::stdin().as_raw_fd();
        session.send_config(2, 4096, 8, dummy_fd, &[(dummy_fd, dummy_fd), (dummy_fd, dummy_fd)]).await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);

        drop(b);
    }

    #[tokio::test]
    async fn duplicate_hello_is_rejected() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut session = ClientSession::new(a);
        session.accept_hello("ids0".to_string()).unwrap();
        assert!(session.accept_hello("ids0".to_string()).is_err());
    }

    #[tokio::test]
    async fn bye_message_requests_teardown() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut session = ClientSession::new(a);
        assert!(session.handle_ready_state_message(&Message::Bye));
        assert_eq!(session.state(), SessionState::Closed);
    }
}
