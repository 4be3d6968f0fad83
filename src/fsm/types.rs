use std::time::Instant;

use crate::bgp::BGPMessageBody;

/// BGP session states (§4.1). `Connect` is carried for completeness but is
/// never constructed: the active-connect path is not implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FSMState {
    #[default]
    Idle,
    Connect,
    Active,
    OpenSent,
    OpenConfirm,
    Established,
}

/// What a state handler returns: either the next real state, or the
/// cancelled sentinel if supervision killed the handler mid-wait. The two
/// are encoded as distinct arms so a cancelled handler can never be
/// mistaken for a real transition into any [`FSMState`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    Next(FSMState),
    Cancelled,
}

/// A fully parsed inbound BGP message, handed to the peer manager on
/// `incoming`. UPDATE and ROUTE-REFRESH bodies remain opaque bytes.
pub type ParsedMessage = BGPMessageBody;

/// Event emitted by the FSM on its `incoming` channel.
#[derive(Debug)]
pub enum FSMMessage {
    StateChange(FSMState),
    BgpMessage(ParsedMessage),
}

/// Advisory per-neighbor message counters, guarded by the neighbor's mutex
/// alongside the rest of its mutable state. Mutated by whichever handler is
/// currently driving the neighbor; never raced, since only one handler runs
/// at a time.
#[derive(Debug, Clone, Default)]
pub struct NeighborCounters {
    pub messages_in: u64,
    pub messages_out: u64,
    pub open_in: u64,
    pub open_out: u64,
    pub update_in: u64,
    pub update_out: u64,
    pub notification_in: u64,
    pub notification_out: u64,
    pub keepalive_in: u64,
    pub keepalive_out: u64,
    pub route_refresh_in: u64,
    pub route_refresh_out: u64,
    pub update_recv_time: Option<Instant>,
}

impl NeighborCounters {
    pub fn record_in(&mut self, body: &BGPMessageBody) {
        self.messages_in += 1;
        match body {
            BGPMessageBody::Open(_) => self.open_in += 1,
            BGPMessageBody::Update(_) => {
                self.update_in += 1;
                self.update_recv_time = Some(Instant::now());
            }
            BGPMessageBody::Notification(_) => self.notification_in += 1,
            BGPMessageBody::Keepalive(_) => self.keepalive_in += 1,
            BGPMessageBody::RouteRefresh(_) => self.route_refresh_in += 1,
        }
    }

    pub fn record_out(&mut self, body: &BGPMessageBody) {
        self.messages_out += 1;
        match body {
            BGPMessageBody::Open(_) => self.open_out += 1,
            BGPMessageBody::Update(_) => self.update_out += 1,
            BGPMessageBody::Notification(_) => self.notification_out += 1,
            BGPMessageBody::Keepalive(_) => self.keepalive_out += 1,
            BGPMessageBody::RouteRefresh(_) => self.route_refresh_out += 1,
        }
    }
}
