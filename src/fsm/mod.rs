//! The per-peer BGP session state machine: state driver, OPEN construction,
//! framed I/O against the `bgp` wire layer, and the channel contract with
//! the surrounding peer manager.

mod handle;
mod open;
mod states;
mod supervision;
mod types;

pub use handle::{new, Fsm, FsmContext, FsmController};
pub use types::{FSMMessage, FSMState, NeighborCounters, NextState, ParsedMessage};
