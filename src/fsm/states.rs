use tokio::time::{interval, Duration};

use super::handle::FsmContext;
use super::open;
use super::supervision::SupervisionHandle;
use super::types::{FSMMessage, FSMState, NextState};
use crate::bgp::{framing, BGPMessageBody};

/// §4.2 Idle: release the keepalive ticker and unconditionally move on to
/// Active. The idle-hold timer is a TODO, preserved from the source.
pub async fn idle(ctx: &mut FsmContext) -> NextState {
    ctx.stop_keepalive();
    ctx.close_connection();
    NextState::Next(FSMState::Active)
}

/// §4.3 Active: wait for a passive connection or cancellation. There is no
/// delayed-open timer; the transition on a connection is immediate.
pub async fn active(ctx: &mut FsmContext) -> NextState {
    tokio::select! {
        _ = ctx.supervision.killed() => NextState::Cancelled,
        maybe_stream = ctx.connection_in.recv() => {
            match maybe_stream {
                Some(stream) => {
                    ctx.conn = Some(stream.into_split());
                    NextState::Next(FSMState::OpenSent)
                }
                None => {
                    log::debug!("connection-in channel closed while Active");
                    NextState::Cancelled
                }
            }
        }
    }
}

/// §4.4 OpenSent: send the local OPEN, wait for the peer's first message.
pub async fn open_sent(ctx: &mut FsmContext) -> NextState {
    let open_message = match open::build_open(&ctx.global, &ctx.neighbor) {
        Ok(open_message) => open_message,
        Err(e) => {
            log::warn!("failed to build local OPEN: {}", e);
            ctx.close_connection();
            return NextState::Next(FSMState::Idle);
        }
    };

    {
        let (_, writer) = ctx.conn.as_mut().expect("connection bound entering OpenSent");
        let body = BGPMessageBody::Open(open_message);
        if let Err(e) = framing::write_message(writer, body.clone()).await {
            log::warn!("failed to send local OPEN: {}", e);
            ctx.close_connection();
            return NextState::Next(FSMState::Idle);
        }
        ctx.counters.lock().await.record_out(&body);
    }

    let (reader, _) = ctx.conn.as_mut().expect("connection bound in OpenSent");
    tokio::select! {
        _ = ctx.supervision.killed() => {
            ctx.close_connection();
            NextState::Cancelled
        }
        result = framing::read_message(reader) => {
            match result {
                Ok(body) => {
                    ctx.counters.lock().await.record_in(&body);
                    if !matches!(body, BGPMessageBody::Open(_)) {
                        log::debug!("OpenSent: expected OPEN, got {:?}", body.message_type());
                        ctx.close_connection();
                        return NextState::Next(FSMState::Idle);
                    }
                    if ctx.incoming.send(FSMMessage::BgpMessage(body)).await.is_err() {
                        ctx.close_connection();
                        return NextState::Cancelled;
                    }

                    let keepalive = match open::keepalive() {
                        Ok(keepalive) => keepalive,
                        Err(e) => {
                            log::warn!("failed to build KEEPALIVE: {}", e);
                            ctx.close_connection();
                            return NextState::Next(FSMState::Idle);
                        }
                    };
                    let (_, writer) = ctx.conn.as_mut().expect("connection bound in OpenSent");
                    if let Err(e) = framing::write_message(writer, keepalive.clone()).await {
                        log::warn!("failed to send KEEPALIVE: {}", e);
                        ctx.close_connection();
                        return NextState::Next(FSMState::Idle);
                    }
                    ctx.counters.lock().await.record_out(&keepalive);
                    NextState::Next(FSMState::OpenConfirm)
                }
                Err(e) => {
                    log::warn!("OpenSent: receive error: {}", e);
                    ctx.close_connection();
                    NextState::Next(FSMState::Idle)
                }
            }
        }
    }
}

/// §4.5 OpenConfirm: keepalive ticker live, waiting for the peer's first
/// KEEPALIVE.
pub async fn open_confirm(ctx: &mut FsmContext) -> NextState {
    let keepalive_secs = ctx.neighbor.keepalive_interval(&ctx.global).max(1) as u64;
    ctx.keepalive_ticker = Some(interval(Duration::from_secs(keepalive_secs)));

    loop {
        let (reader, _) = ctx.conn.as_mut().expect("connection bound in OpenConfirm");
        tokio::select! {
            _ = ctx.supervision.killed() => {
                ctx.close_connection();
                return NextState::Cancelled;
            }
            _ = ctx.keepalive_ticker.as_mut().unwrap().tick() => {
                let keepalive = match open::keepalive() {
                    Ok(keepalive) => keepalive,
                    Err(e) => {
                        log::warn!("failed to build KEEPALIVE: {}", e);
                        continue;
                    }
                };
                let (_, writer) = ctx.conn.as_mut().expect("connection bound in OpenConfirm");
                // Write errors on the keepalive tick are swallowed (TODO, §9).
                if framing::write_message(writer, keepalive.clone()).await.is_ok() {
                    ctx.counters.lock().await.record_out(&keepalive);
                }
            }
            result = framing::read_message(reader) => {
                match result {
                    Ok(body) => {
                        ctx.counters.lock().await.record_in(&body);
                        if matches!(body, BGPMessageBody::Keepalive(_)) {
                            return NextState::Next(FSMState::Established);
                        }
                        log::debug!("OpenConfirm: expected KEEPALIVE, got {:?}", body.message_type());
                        ctx.close_connection();
                        return NextState::Next(FSMState::Idle);
                    }
                    Err(e) => {
                        log::warn!("OpenConfirm: receive error: {}", e);
                        ctx.close_connection();
                        return NextState::Next(FSMState::Idle);
                    }
                }
            }
        }
    }
}

/// §4.6 Established: a send loop and a receive loop share the connection,
/// split into owned halves, until either errors or cancellation wins.
pub async fn established(ctx: &mut FsmContext) -> NextState {
    let (reader, writer) = ctx.conn.take().expect("connection bound in Established");
    let mut outgoing = ctx.outgoing.take().expect("outgoing receiver always present");

    let keepalive_secs = ctx.neighbor.keepalive_interval(&ctx.global).max(1) as u64;
    let mut keepalive_ticker = interval(Duration::from_secs(keepalive_secs));

    let (error_tx, mut error_rx) = tokio::sync::mpsc::channel::<()>(1);

    // A sibling's error must stop the other loop too, not just the top
    // frame: otherwise the healthy half keeps running its socket I/O
    // forever and the awaits below never return (§4.6/§7, invariant 5).
    // `Supervision` only exposes `killed()`, not `kill()`, so `ctx`'s own
    // token can't be fired from here; this local pair is owned by this
    // invocation and killed whenever either loop errors or the FSM is
    // cancelled, before either child is awaited.
    let (sibling_handle, sibling) = SupervisionHandle::new();

    let mut recv_supervision = ctx.supervision.clone();
    let mut recv_sibling = sibling.clone();
    let incoming = ctx.incoming.clone();
    let recv_counters = ctx.counters.clone();
    let recv_error_tx = error_tx.clone();

    let recv_task = tokio::spawn(async move {
        let mut reader = reader;
        loop {
            tokio::select! {
                _ = recv_supervision.killed() => return reader,
                _ = recv_sibling.killed() => return reader,
                result = framing::read_message(&mut reader) => {
                    match result {
                        Ok(body) => {
                            recv_counters.lock().await.record_in(&body);
                            if incoming.send(FSMMessage::BgpMessage(body)).await.is_err() {
                                return reader;
                            }
                        }
                        Err(e) => {
                            log::warn!("Established: receive error: {}", e);
                            let _ = recv_error_tx.send(()).await;
                            return reader;
                        }
                    }
                }
            }
        }
    });

    let mut send_supervision = ctx.supervision.clone();
    let mut send_sibling = sibling;
    let send_counters = ctx.counters.clone();
    let send_error_tx = error_tx;

    let send_task = tokio::spawn(async move {
        let mut writer = writer;
        loop {
            tokio::select! {
                _ = send_supervision.killed() => return (writer, outgoing),
                _ = send_sibling.killed() => return (writer, outgoing),
                _ = keepalive_ticker.tick() => {
                    let keepalive = match open::keepalive() {
                        Ok(keepalive) => keepalive,
                        Err(e) => {
                            log::warn!("failed to build KEEPALIVE: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = framing::write_message(&mut writer, keepalive.clone()).await {
                        log::warn!("Established: keepalive write error: {}", e);
                        let _ = send_error_tx.send(()).await;
                        return (writer, outgoing);
                    }
                    send_counters.lock().await.record_out(&keepalive);
                }
                maybe_body = outgoing.recv() => {
                    match maybe_body {
                        Some(body) => {
                            log::debug!("Established: sending {:?}", body.message_type());
                            if let Err(e) = framing::write_message(&mut writer, body.clone()).await {
                                log::warn!("Established: send error: {}", e);
                                let _ = send_error_tx.send(()).await;
                                return (writer, outgoing);
                            }
                            send_counters.lock().await.record_out(&body);
                        }
                        None => return (writer, outgoing),
                    }
                }
            }
        }
    });

    let cancelled = tokio::select! {
        _ = ctx.supervision.killed() => true,
        _ = error_rx.recv() => false,
    };
    sibling_handle.kill();

    let reader = recv_task.await.expect("Established receive loop panicked");
    let (writer, outgoing) = send_task.await.expect("Established send loop panicked");
    ctx.outgoing = Some(outgoing);

    if let Ok(stream) = reader.reunite(writer) {
        drop(stream);
    }

    if cancelled {
        NextState::Cancelled
    } else {
        NextState::Next(FSMState::Idle)
    }
}
