//! Control-socket accept loop and the control loop that owns [`Bridge`].
//!
//! §4.2's `listening` state and `HELLO` resolution need access to the
//! instance table, but instance mutation is main-thread-only (§5's
//! configuration barrier). A per-connection task therefore never touches
//! [`Bridge`] directly: it asks a single control-loop task to resolve a
//! `HELLO` or run a disconnect, and awaits the answer on a oneshot channel.
//!
//! Grounded on the teacher's `socket/server.rs` (`UnixListener` accept loop,
//! one spawned task per connection, stale-socket cleanup, `0600`
//! permissions) and `hub/hub_handle.rs`'s oneshot-reply command pattern,
//! adapted from a `HubCommand` enum sent to a single actor to the
//! `ControlRequest` enum here.

use std::os::fd::RawFd;
use std::path::Path;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};

use crate::bridge::client::{ClientSession, SessionState};
use crate::bridge::instance::Bridge;
use crate::bridge::protocol::Message;
use crate::error::BridgeError;

/// What a resolved `HELLO` hands back to the connection task, which
/// forwards it to the client as `CONFIG` plus its ancillary fds.
#[derive(Debug)]
pub struct HelloReply {
    /// The resolved instance's id, needed later for the disconnect path.
    pub instance_id: u32,
    /// Number of qpairs the client should expect fds for.
    pub num_qpairs: u32,
    /// Size in bytes of the shared-memory segment.
    pub shm_size: u64,
    /// `log2` of each qpair's ring size.
    pub log2_queue_size: u8,
    /// The instance's shared-memory segment fd.
    pub shm_fd: RawFd,
    /// Each qpair's `(enq_fd, deq_fd)`, in ascending qpair order.
    pub qpair_fds: Vec<(RawFd, RawFd)>,
}

/// A request a connection task sends to the control loop that owns
/// [`Bridge`], answered on the carried reply channel where applicable.
#[derive(Debug)]
pub enum ControlRequest {
    /// Resolve `HELLO{instance_name}`: look the instance up, reject a
    /// second client, and hand back its `CONFIG` payload.
    Hello {
        /// Name the client asked for.
        instance_name: String,
        /// Where to send the resolution.
        reply: oneshot::Sender<Result<HelloReply, BridgeError>>,
    },
    /// The client's control socket closed or sent `BYE`: run the
    /// disconnect path (§4.1) for the instance it had attached to.
    Disconnect {
        /// The instance to disconnect.
        instance_id: u32,
    },
}

/// Runs the control loop: owns `bridge` for as long as `rx` stays open,
/// answering each [`ControlRequest`] in arrival order. Returns once every
/// sender clone has been dropped.
pub async fn run_control_loop(mut bridge: Bridge, mut rx: mpsc::UnboundedReceiver<ControlRequest>) {
    while let Some(req) = rx.recv().await {
        match req {
            ControlRequest::Hello { instance_name, reply } => {
                let result = resolve_hello(&mut bridge, &instance_name);
                let _ = reply.send(result);
            }
            ControlRequest::Disconnect { instance_id } => {
                let _ = bridge.instance_disconnect(instance_id, |_, _| {});
            }
        }
    }
}

fn resolve_hello(bridge: &mut Bridge, instance_name: &str) -> Result<HelloReply, BridgeError> {
    let instance_id = bridge
        .instance_by_name(instance_name)
        .ok_or_else(|| BridgeError::InstanceNotFound(instance_name.to_string()))?
        .id();
    let instance = bridge.instance_mut(instance_id).expect("instance just resolved by name");
    if instance.has_client() {
        return Err(BridgeError::DuplicateClient(instance_name.to_string()));
    }
    // A client reconnecting after a prior clean disconnect finds its
    // segment/qpairs torn down (`Instance::disconnect`); reattach fresh
    // ones before building the `CONFIG` handoff.
    instance.reattach()?;
    let (shm_fd, shm_size, log2_queue_size, qpair_fds) =
        instance.handoff_info().expect("reattach just (re)allocated the segment");
    let num_qpairs = qpair_fds.len() as u32;

    instance.mark_client_attached();

    Ok(HelloReply { instance_id, num_qpairs, shm_size, log2_queue_size, shm_fd, qpair_fds })
}

/// Binds `socket_path` (removing a stale socket file first, then setting
/// `0600` permissions) and accepts connections forever, spawning one task
/// per connection that drives it through [`drive_session`].
///
/// # Errors
///
/// Returns an error if the socket cannot be bound or `accept` fails.
pub async fn accept_loop(socket_path: impl AsRef<Path>, control_tx: mpsc::UnboundedSender<ControlRequest>) -> std::io::Result<()> {
    let socket_path = socket_path.as_ref();
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    log::info!("control socket listening on {}", socket_path.display());

    loop {
        let (stream, _addr) = listener.accept().await?;
        let control_tx = control_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = drive_session(stream, control_tx).await {
                log::warn!("client session ended with error: {err}");
            }
        });
    }
}

/// Drives one accepted connection through §4.2's state machine:
/// `HELLO` resolution via the control loop, `CONFIG` handoff, then
/// `READY`/`BYE` in the `ready` state. Runs the disconnect path on the
/// control loop once the session closes, if it ever attached to an
/// instance.
async fn drive_session(stream: UnixStream, control_tx: mpsc::UnboundedSender<ControlRequest>) -> std::io::Result<()> {
    let mut session = ClientSession::new(stream);
    let mut attached_instance = None;

    while session.state() != SessionState::Closed {
        let messages = session.read_messages().await?;
        for msg in messages {
            match (&msg, session.state()) {
                (Message::Hello { instance_name }, SessionState::HelloWait) => {
                    session.accept_hello(instance_name.clone()).map_err(std::io::Error::other)?;
                    let (reply_tx, reply_rx) = oneshot::channel();
                    let _ = control_tx.send(ControlRequest::Hello { instance_name: instance_name.clone(), reply: reply_tx });
                    match reply_rx.await {
                        Ok(Ok(hello)) => {
                            attached_instance = Some(hello.instance_id);
                            session
                                .send_config(hello.num_qpairs, hello.shm_size, hello.log2_queue_size, hello.shm_fd, &hello.qpair_fds)
                                .await?;
                        }
                        Ok(Err(err)) => return Err(std::io::Error::other(err)),
                        Err(_) => return Err(std::io::Error::other("control loop shut down")),
                    }
                }
                (Message::Ready | Message::Bye, SessionState::Ready) => {
                    if session.handle_ready_state_message(&msg) {
                        break;
                    }
                }
                _ => {
                    log::warn!("unexpected message {msg:?} in state {:?}", session.state());
                }
            }
        }
    }

    if let Some(instance_id) = attached_instance {
        let _ = control_tx.send(ControlRequest::Disconnect { instance_id });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::iface::BidirectionalPolicy;

    #[tokio::test]
    async fn hello_on_unknown_instance_is_rejected() {
        let bridge = Bridge::new(1, BidirectionalPolicy::TraverseOnce);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_control_loop(bridge, rx));

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(ControlRequest::Hello { instance_name: "nope".to_string(), reply: reply_tx }).unwrap();
        let result = reply_rx.await.unwrap();
        assert_eq!(result.unwrap_err(), BridgeError::InstanceNotFound("nope".to_string()));
    }

    #[tokio::test]
    async fn hello_then_second_hello_is_rejected_as_duplicate() {
        let mut bridge = Bridge::new(1, BidirectionalPolicy::TraverseOnce);
        bridge.instance_create("ids0", 4, true).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_control_loop(bridge, rx));

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(ControlRequest::Hello { instance_name: "ids0".to_string(), reply: reply_tx }).unwrap();
        let first = reply_rx.await.unwrap();
        assert!(first.is_ok());

        let (reply_tx2, reply_rx2) = oneshot::channel();
        tx.send(ControlRequest::Hello { instance_name: "ids0".to_string(), reply: reply_tx2 }).unwrap();
        let second = reply_rx2.await.unwrap();
        assert_eq!(second.unwrap_err(), BridgeError::DuplicateClient("ids0".to_string()));
    }

    #[tokio::test]
    async fn hello_after_disconnect_reattaches_and_succeeds() {
        let mut bridge = Bridge::new(1, BidirectionalPolicy::TraverseOnce);
        bridge.instance_create("ids0", 4, true).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_control_loop(bridge, rx));

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(ControlRequest::Hello { instance_name: "ids0".to_string(), reply: reply_tx }).unwrap();
        let first = reply_rx.await.unwrap().unwrap();

        tx.send(ControlRequest::Disconnect { instance_id: first.instance_id }).unwrap();

        // Give the control loop a turn to process the disconnect before the
        // next HELLO lands behind it in the same queue.
        let (reply_tx2, reply_rx2) = oneshot::channel();
        tx.send(ControlRequest::Hello { instance_name: "ids0".to_string(), reply: reply_tx2 }).unwrap();
        let second = reply_rx2.await.unwrap();
        assert!(second.is_ok(), "reconnecting after a clean disconnect must succeed, got {second:?}");
    }

    #[tokio::test]
    async fn full_session_drives_hello_through_ready() {
        let mut bridge = Bridge::new(1, BidirectionalPolicy::TraverseOnce);
        bridge.instance_create("ids0", 4, true).unwrap();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_control_loop(bridge, control_rx));

        let (client_side, bridge_side) = UnixStream::pair().unwrap();
        let session_task = tokio::spawn(drive_session(bridge_side, control_tx));

        // Drive the client side of the protocol by hand, the way a real
        // inspector process would.
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut client_side = client_side;
        let hello = Message::Hello { instance_name: "ids0".to_string() }.encode_frame();
        client_side.write_all(&hello).await.unwrap();

        // Read the CONFIG frame's length prefix + body; fds arrive via
        // SCM_RIGHTS ancillary data this simple read ignores.
        let mut len_buf = [0u8; 4];
        client_side.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        client_side.read_exact(&mut body).await.unwrap();
        assert_eq!(body[0], crate::bridge::protocol::msg_type::CONFIG);

        let bye = Message::Bye.encode_frame();
        client_side.write_all(&bye).await.unwrap();
        drop(client_side);

        session_task.await.unwrap().unwrap();
    }
}
