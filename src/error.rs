use std::io;
use thiserror::Error;

/// Errors surfaced by fallible FSM helpers (OPEN/KEEPALIVE build, framed I/O).
/// The state driver never propagates these upward: it converts any `Err`
/// into an `Idle` transition, per the error handling design.
#[derive(Error, Debug)]
pub enum FsmError {
    #[error("BGP framing error: {0}")]
    Framing(String),

    #[error("BGP message build error: {0}")]
    MessageBuild(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
