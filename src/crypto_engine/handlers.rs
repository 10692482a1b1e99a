//! The three event handlers (§4.6): handshake, read, write. All three run
//! on the event's owning worker and are grounded directly on
//! `tls_async_handshake_event_handler`, `tls_async_read_event_handler`,
//! `tls_async_write_event_handler` in
//! `examples/original_source/src/plugins/tlsopenssl/tls_async.c`.

use crate::crypto_engine::contracts::{ContextId, HandshakeStep, ReadStep, SessionId, SessionLayer, TlsContext, WriteStep};

/// Half the tx fifo size, clamped to this minimum, is reserved for
/// control overhead before the write handler decides whether to
/// deschedule (§4.6, §9's "write-handler fifo threshold" note). Mirrors
/// `TLSO_MIN_ENQ_SPACE`.
pub const MIN_ENQUEUE_RESERVE: usize = 128;

/// Handshake handler (`kind = init`, §4.6).
///
/// Tolerates spurious callbacks (handshake already complete) and the
/// "nothing to feed the state machine" case (not resuming, rx empty).
pub fn handshake_handler(ctx: &mut dyn TlsContext, ctx_id: ContextId, session: &mut dyn SessionLayer) {
    if ctx.handshake_complete() {
        return;
    }

    if !ctx.take_resume_flag() && ctx.transport_rx_empty() {
        return;
    }

    match ctx.do_handshake_step() {
        HandshakeStep::WantAsync => {}
        HandshakeStep::ProtocolError => {
            session.notify_handshake_failure(ctx_id);
        }
        HandshakeStep::WantRead | HandshakeStep::WantWrite => {}
        HandshakeStep::Success => {
            if !ctx.is_server() {
                // Client-side handshake completion is unsupported by this
                // core (§4.6): ignore.
                return;
            }
            if ctx.is_passive_close() {
                session.notify_handshake_failure(ctx_id);
                return;
            }
            if !session.notify_app_accept(ctx_id) {
                session.disconnect_transport(ctx_id);
            }
            ctx.mark_handshake_done();
        }
    }
}

/// Read handler (`kind = read`, §4.6).
pub fn read_handler(ctx: &mut dyn TlsContext, ctx_id: ContextId, session_id: SessionId, session: &mut dyn SessionLayer) {
    ctx.set_async_rd(true);

    let step = ctx.do_read_step();

    match step {
        ReadStep::WantAsync => return,
        ReadStep::Fatal => session.notify_app_io_error(ctx_id),
        ReadStep::Progress(n) => {
            if n > 0 {
                session.notify_app_enqueue(ctx_id, session_id);
            }
        }
    }

    ctx.set_async_rd(false);

    if ctx.ciphertext_pending() {
        session.add_builtin_rx_event(session_id);
    }
}

/// Write handler (`kind = write`, §4.6).
pub fn write_handler(ctx: &mut dyn TlsContext, ctx_id: ContextId, session: &mut dyn SessionLayer) {
    if ctx.total_async_write() == 0 {
        return;
    }

    let step = ctx.do_write_step();

    match step {
        WriteStep::WantAsync => return,
        WriteStep::Fatal => {
            session.notify_app_io_error(ctx_id);
            return;
        }
        WriteStep::Wrote(wrote) => {
            let remaining_after = ctx.total_async_write().saturating_sub(wrote);
            ctx.set_total_async_write(remaining_after);

            if remaining_after == 0 && ctx.app_closed() && !ctx.ciphertext_pending() {
                session.confirm_app_close(ctx_id);
            }

            let reserve = (ctx.transport_tx_fifo_size() / 2).min(MIN_ENQUEUE_RESERVE);
            let space = ctx.transport_tx_remaining();

            if space < wrote + reserve {
                session.request_dequeue_notify(ctx_id);
                session.deschedule(ctx_id);
            } else {
                session.reschedule_for_custom_tx(ctx_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto_engine::test_support::{FakeSession, FakeTlsContext};

    #[test]
    fn handshake_spurious_callback_after_completion_is_a_no_op() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.handshake_done = true;
        let mut session = FakeSession::default();
        handshake_handler(&mut ctx, ContextId(0), &mut session);
        assert!(session.handshake_failures.is_empty());
        assert!(session.app_accepts.is_empty());
    }

    #[test]
    fn handshake_nothing_to_feed_when_rx_empty_and_not_resuming() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.rx_empty = true;
        ctx.resume_flag = false;
        let mut session = FakeSession::default();
        handshake_handler(&mut ctx, ContextId(1), &mut session);
        assert_eq!(ctx.handshake_steps_driven, 0);
    }

    #[test]
    fn handshake_success_on_server_notifies_accept_and_marks_done() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.resume_flag = true;
        ctx.next_step = HandshakeStep::Success;
        let mut session = FakeSession::default();
        handshake_handler(&mut ctx, ContextId(2), &mut session);
        assert_eq!(session.app_accepts, vec![ContextId(2)]);
        assert!(ctx.handshake_done);
    }

    #[test]
    fn handshake_client_side_success_is_ignored() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.is_server = false;
        ctx.resume_flag = true;
        ctx.next_step = HandshakeStep::Success;
        let mut session = FakeSession::default();
        handshake_handler(&mut ctx, ContextId(3), &mut session);
        assert!(session.app_accepts.is_empty());
        assert!(!ctx.handshake_done);
    }

    #[test]
    fn handshake_protocol_error_surfaces_failure_and_does_not_mark_done() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.resume_flag = true;
        ctx.next_step = HandshakeStep::ProtocolError;
        let mut session = FakeSession::default();
        handshake_handler(&mut ctx, ContextId(4), &mut session);
        assert_eq!(session.handshake_failures, vec![ContextId(4)]);
        assert!(!ctx.handshake_done);
    }

    #[test]
    fn handshake_passive_close_fails_even_on_success() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.resume_flag = true;
        ctx.next_step = HandshakeStep::Success;
        ctx.passive_close = true;
        let mut session = FakeSession::default();
        handshake_handler(&mut ctx, ContextId(5), &mut session);
        assert_eq!(session.handshake_failures, vec![ContextId(5)]);
        assert!(session.app_accepts.is_empty());
    }

    #[test]
    fn read_want_async_leaves_event_armed_without_notifying() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.next_read = ReadStep::WantAsync;
        let mut session = FakeSession::default();
        read_handler(&mut ctx, ContextId(0), SessionId(0), &mut session);
        assert!(session.app_enqueues.is_empty());
        assert!(ctx.async_rd, "async_rd stays set while want_async");
    }

    #[test]
    fn read_progress_notifies_and_clears_async_rd() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.next_read = ReadStep::Progress(128);
        let mut session = FakeSession::default();
        read_handler(&mut ctx, ContextId(0), SessionId(7), &mut session);
        assert_eq!(session.app_enqueues, vec![(ContextId(0), SessionId(7))]);
        assert!(!ctx.async_rd);
    }

    #[test]
    fn read_pending_ciphertext_rearms_builtin_rx() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.next_read = ReadStep::Progress(0);
        ctx.ciphertext_pending = true;
        let mut session = FakeSession::default();
        read_handler(&mut ctx, ContextId(0), SessionId(9), &mut session);
        assert_eq!(session.builtin_rx_rearms, vec![SessionId(9)]);
    }

    #[test]
    fn read_fatal_error_signals_io_error() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.next_read = ReadStep::Fatal;
        let mut session = FakeSession::default();
        read_handler(&mut ctx, ContextId(3), SessionId(0), &mut session);
        assert_eq!(session.io_errors, vec![ContextId(3)]);
    }

    #[test]
    fn write_already_complete_returns_immediately() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.total_async_write = 0;
        let mut session = FakeSession::default();
        write_handler(&mut ctx, ContextId(0), &mut session);
        assert_eq!(ctx.write_steps_driven, 0);
    }

    #[test]
    fn write_partial_drain_with_low_space_stays_descheduled() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.total_async_write = 4096;
        ctx.next_write = WriteStep::Wrote(3000);
        ctx.tx_fifo_size = 4096;
        ctx.tx_remaining = 200; // below reserve + wrote
        let mut session = FakeSession::default();
        write_handler(&mut ctx, ContextId(0), &mut session);
        assert_eq!(ctx.total_async_write, 1096);
        assert_eq!(session.deschedules, vec![ContextId(0)]);
        assert_eq!(session.dequeue_notify_requests, vec![ContextId(0)]);
        assert!(session.reschedules.is_empty());
    }

    #[test]
    fn write_completion_with_ample_space_reschedules() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.total_async_write = 3000;
        ctx.next_write = WriteStep::Wrote(3000);
        ctx.tx_fifo_size = 65536;
        ctx.tx_remaining = 60000;
        let mut session = FakeSession::default();
        write_handler(&mut ctx, ContextId(0), &mut session);
        assert_eq!(ctx.total_async_write, 0);
        assert_eq!(session.reschedules, vec![ContextId(0)]);
        assert!(session.deschedules.is_empty());
    }

    #[test]
    fn write_completion_while_app_closed_confirms_close() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.total_async_write = 10;
        ctx.next_write = WriteStep::Wrote(10);
        ctx.app_closed = true;
        ctx.ciphertext_pending = false;
        ctx.tx_fifo_size = 65536;
        ctx.tx_remaining = 60000;
        let mut session = FakeSession::default();
        write_handler(&mut ctx, ContextId(0), &mut session);
        assert_eq!(session.app_closes_confirmed, vec![ContextId(0)]);
    }

    #[test]
    fn write_fatal_error_signals_io_error() {
        let mut ctx = FakeTlsContext::new_server();
        ctx.total_async_write = 10;
        ctx.next_write = WriteStep::Fatal;
        let mut session = FakeSession::default();
        write_handler(&mut ctx, ContextId(0), &mut session);
        assert_eq!(session.io_errors, vec![ContextId(0)]);
    }
}
