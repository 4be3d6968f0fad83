use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Interval;

use super::supervision::{Supervision, SupervisionHandle};
use super::types::{FSMMessage, FSMState, NeighborCounters, NextState};
use super::states;
use crate::bgp::BGPMessageBody;
use crate::config::{GlobalConfig, NeighborConfig};

/// Everything a state handler needs: configuration, the channels wired up
/// by the peer manager, the currently bound connection (if any), and the
/// keepalive ticker (live iff current state is OpenConfirm or Established).
pub struct FsmContext {
    pub global: Arc<GlobalConfig>,
    pub neighbor: Arc<NeighborConfig>,
    pub counters: Arc<Mutex<NeighborCounters>>,
    pub connection_in: mpsc::Receiver<TcpStream>,
    pub incoming: mpsc::Sender<FSMMessage>,
    pub outgoing: Option<mpsc::Receiver<BGPMessageBody>>,
    pub supervision: Supervision,
    pub(super) conn: Option<(OwnedReadHalf, OwnedWriteHalf)>,
    pub(super) keepalive_ticker: Option<Interval>,
}

impl FsmContext {
    /// Close the bound connection, if any (invariant 1: the connection is
    /// closed on any exit from a post-Active state that is not a clean
    /// progression).
    pub(super) fn close_connection(&mut self) {
        self.conn = None;
    }

    pub(super) fn stop_keepalive(&mut self) {
        self.keepalive_ticker = None;
    }
}

/// The running FSM: current state plus its context. Lives for the lifetime
/// of the configured neighbor; a fresh state handler runs on each loop
/// iteration (§2 "FSM Handler").
pub struct Fsm {
    state: FSMState,
    ctx: FsmContext,
}

/// What the peer manager keeps to supervise a spawned [`Fsm`].
pub struct FsmController {
    supervision: SupervisionHandle,
}

impl FsmController {
    /// Ask the running FSM to die. Returns immediately; the handler observes
    /// this on its next `tokio::select!` and unwinds cleanly.
    pub fn kill(&self) {
        self.supervision.kill();
    }
}

#[allow(clippy::too_many_arguments)]
pub fn new(
    global: Arc<GlobalConfig>,
    neighbor: Arc<NeighborConfig>,
    counters: Arc<Mutex<NeighborCounters>>,
    connection_in: mpsc::Receiver<TcpStream>,
    incoming: mpsc::Sender<FSMMessage>,
    outgoing: mpsc::Receiver<BGPMessageBody>,
) -> (Fsm, FsmController) {
    let (supervision_handle, supervision) = SupervisionHandle::new();
    let ctx = FsmContext {
        global,
        neighbor,
        counters,
        connection_in,
        incoming,
        outgoing: Some(outgoing),
        supervision,
        conn: None,
        keepalive_ticker: None,
    };
    (
        Fsm {
            state: FSMState::Idle,
            ctx,
        },
        FsmController {
            supervision: supervision_handle,
        },
    )
}

impl Fsm {
    /// Drive the FSM until cancelled. Each iteration runs exactly one
    /// state's behavior (§4.1) and, unless cancelled, emits `StateChange`
    /// on `incoming` before looping into the next state.
    pub async fn run(mut self) {
        loop {
            let next = match self.state {
                FSMState::Idle => states::idle(&mut self.ctx).await,
                FSMState::Active => states::active(&mut self.ctx).await,
                FSMState::OpenSent => states::open_sent(&mut self.ctx).await,
                FSMState::OpenConfirm => states::open_confirm(&mut self.ctx).await,
                FSMState::Established => states::established(&mut self.ctx).await,
                FSMState::Connect => {
                    log::error!("FSM entered reserved Connect state, returning to Idle");
                    NextState::Next(FSMState::Idle)
                }
            };

            match next {
                NextState::Cancelled => {
                    log::debug!("FSM cancelled in state {:?}", self.state);
                    return;
                }
                NextState::Next(state) => {
                    log::debug!("FSM {:?} -> {:?}", self.state, state);
                    self.state = state;
                    if self
                        .ctx
                        .incoming
                        .send(FSMMessage::StateChange(state))
                        .await
                        .is_err()
                    {
                        log::debug!("FSM incoming channel closed, stopping");
                        return;
                    }
                }
            }
        }
    }
}
