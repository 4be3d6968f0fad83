use num_derive::FromPrimitive;
use serde_derive::Deserialize;

// Constants
pub const MARKER: [u8; 16] = [0xff; 16];
pub const VERSION: u8 = 4;
pub const MAX: usize = 4096;

/// RFC 4271 fixed header length: 16-byte marker, 2-byte length, 1-byte type.
pub const HEADER_LENGTH: usize = 19;

/// 2-octet placeholder AS used in the OPEN `My AS` field when the real AS
/// does not fit in 16 bits (RFC 6793).
pub const AS_TRANS: u16 = 23456;

// Basic enums
#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq, Deserialize, Hash, Eq)]
#[repr(u16)]
pub enum Afi {
    Ipv4 = 1,
    Ipv6,
}

#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq, Deserialize, Hash, Eq)]
#[repr(u8)]
pub enum Safi {
    NLRIUnicast = 1,
    NLRIMulticast,
}

#[derive(Deserialize, Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct AddressFamily {
    pub afi: Afi,
    pub safi: Safi,
}

#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq, Default)]
#[repr(u8)]
pub enum MessageType {
    Open = 1,
    #[default]
    Update,
    Notification,
    Keepalive,
    RouteRefresh,
}

#[derive(Debug, Clone, FromPrimitive)]
#[repr(u8)]
pub enum ErrorCode {
    MessageHeader = 1,
    OpenMessage,
    UpdateMessage,
    HoldTimerExpired,
    FSMError,
    Cease,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
#[repr(u8)]
pub enum HeaderSubCode {
    ConnectionNotSynchronized = 1,
    BadMessageLength = 2,
    BadMessageType = 3,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
#[repr(u8)]
pub enum OpenSubCode {
    UnsupportedVersionNumber = 1,
    BadPeerAS = 2,
    BadBGPIdentifier = 3,
    UnsupportedOptionalParameter = 4,
    Deprecated = 5,
    UnacceptableHoldTime = 6,
}
