use anyhow::Result;
use byteorder::{BigEndian, WriteBytesExt};
use derive_builder::Builder;
use num_traits::FromPrimitive;
use std::fmt;
use std::io::prelude::*;
use std::io::Cursor;
use std::mem::size_of;
use std::net::IpAddr;

use super::capabilities::*;
use super::types::*;
use crate::error::FsmError;

#[derive(Default, Builder, Debug, Clone, PartialEq)]
#[builder(setter(into))]
pub struct BGPMessageHeader {
    pub message_type: MessageType,
}

#[derive(Default, Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct BGPOpenMessage {
    pub version: u8,
    pub asn: u16,
    pub hold_time: u16,
    pub router_id: u32,
    pub opt_params: BGPOptionalParameters,
}

impl fmt::Display for BGPOpenMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "version : {} local_asn : {} hold_time : {} router_id : {} opt_params : {:?}",
            self.version,
            self.asn,
            self.hold_time,
            IpAddr::from(std::net::Ipv4Addr::from(self.router_id)),
            self.opt_params
        )
    }
}

impl From<Vec<u8>> for BGPOpenMessage {
    fn from(src: Vec<u8>) -> Self {
        let mut version = [0u8; 1];
        version.copy_from_slice(&src[0..1]);
        let version = u8::from_be_bytes(version);

        let mut asn = [0u8; 2];
        asn.copy_from_slice(&src[1..3]);
        let asn = u16::from_be_bytes(asn);

        let mut hold = [0u8; 2];
        hold.copy_from_slice(&src[3..5]);
        let hold = u16::from_be_bytes(hold);

        let mut rid = [0u8; 4];
        rid.copy_from_slice(&src[5..9]);
        let rid = u32::from_be_bytes(rid);

        let opt: BGPOptionalParameters = src[9..].to_vec().into();

        BGPOpenMessageBuilder::default()
            .version(version)
            .asn(asn)
            .hold_time(hold)
            .router_id(rid)
            .opt_params(opt)
            .build()
            .unwrap()
    }
}

impl From<BGPOpenMessage> for Vec<u8> {
    fn from(val: BGPOpenMessage) -> Self {
        let mut buf = Cursor::new(vec![]);
        let opt_params: Vec<u8> = val.opt_params.into();
        buf.write_u8(val.version).unwrap();
        buf.write_u16::<BigEndian>(val.asn).unwrap();
        buf.write_u16::<BigEndian>(val.hold_time).unwrap();
        buf.write_u32::<BigEndian>(val.router_id).unwrap();
        buf.write_all(&opt_params).unwrap();
        buf.into_inner()
    }
}

impl BGPOpenMessage {
    pub fn byte_len(&self) -> usize {
        self.opt_params.len + 10 * size_of::<u16>()
    }

    /// Build the local OPEN: `asn` and `capability_asn` are the same true
    /// 32-bit local AS, except `asn` has already been truncated to
    /// [`AS_TRANS`] by the caller when it does not fit in 16 bits (see
    /// `Capabilities::as_trans`).
    pub fn new(asn: u16, rid: u32, hold: u16, opt_params: BGPOptionalParameters) -> Result<Self> {
        Ok(BGPOpenMessageBuilder::default()
            .version(VERSION)
            .asn(asn)
            .hold_time(hold)
            .router_id(rid)
            .opt_params(opt_params)
            .build()
            .map_err(|e| FsmError::MessageBuild(e.to_string()))?)
    }
}

/// `My AS` field of an OPEN message: the true local AS if it fits in 16
/// bits, else [`AS_TRANS`] with the true AS carried in the Four-Octet AS
/// Number capability.
pub fn open_my_as(local_asn: u32) -> u16 {
    u16::try_from(local_asn).unwrap_or(AS_TRANS)
}

#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct BGPNotificationMessage {
    pub error_code: ErrorCode,
    pub error_subcode: u8,
    pub data: Vec<u8>,
}

impl From<Vec<u8>> for BGPNotificationMessage {
    fn from(src: Vec<u8>) -> Self {
        let code = src.first().copied().unwrap_or(ErrorCode::Cease as u8);
        let subcode = src.get(1).copied().unwrap_or(0);
        let data = if src.len() > 2 { src[2..].to_vec() } else { vec![] };
        BGPNotificationMessageBuilder::default()
            .error_code(FromPrimitive::from_u8(code).unwrap_or(ErrorCode::Cease))
            .error_subcode(subcode)
            .data(data)
            .build()
            .unwrap()
    }
}

impl From<BGPNotificationMessage> for Vec<u8> {
    fn from(val: BGPNotificationMessage) -> Self {
        let mut buf = Cursor::new(vec![]);
        buf.write_u8(val.error_code as u8).unwrap();
        buf.write_u8(val.error_subcode).unwrap();
        buf.write_all(&val.data).unwrap();
        buf.into_inner()
    }
}

#[derive(Default, Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct BGPKeepaliveMessage {}

impl BGPKeepaliveMessage {
    pub fn new() -> Result<BGPKeepaliveMessage> {
        Ok(BGPKeepaliveMessageBuilder::default()
            .build()
            .map_err(|e| FsmError::MessageBuild(e.to_string()))?)
    }
}

impl From<BGPKeepaliveMessage> for Vec<u8> {
    fn from(_val: BGPKeepaliveMessage) -> Self {
        vec![]
    }
}

/// A parsed BGP message body. UPDATE and ROUTE-REFRESH payload structure
/// is out of scope for this component: their bodies are carried opaque,
/// to be decoded by an external collaborator.
#[derive(Debug, Clone)]
pub enum BGPMessageBody {
    Open(BGPOpenMessage),
    Update(Vec<u8>),
    Notification(BGPNotificationMessage),
    Keepalive(BGPKeepaliveMessage),
    RouteRefresh(Vec<u8>),
}

impl Default for BGPMessageBody {
    fn default() -> Self {
        Self::Keepalive(BGPKeepaliveMessage::default())
    }
}

impl From<BGPMessageBody> for Vec<u8> {
    fn from(val: BGPMessageBody) -> Self {
        match val {
            BGPMessageBody::Open(body) => body.into(),
            BGPMessageBody::Update(body) => body,
            BGPMessageBody::Notification(body) => body.into(),
            BGPMessageBody::Keepalive(body) => body.into(),
            BGPMessageBody::RouteRefresh(body) => body,
        }
    }
}

impl BGPMessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            BGPMessageBody::Open(_) => MessageType::Open,
            BGPMessageBody::Update(_) => MessageType::Update,
            BGPMessageBody::Notification(_) => MessageType::Notification,
            BGPMessageBody::Keepalive(_) => MessageType::Keepalive,
            BGPMessageBody::RouteRefresh(_) => MessageType::RouteRefresh,
        }
    }
}

/// A fully framed BGP message: header plus typed (or opaque) body.
#[derive(Default, Builder, Debug)]
#[builder(setter(into))]
pub struct Message {
    pub header: BGPMessageHeader,
    pub body: BGPMessageBody,
}

impl Message {
    pub fn new(mtype: MessageType, body: BGPMessageBody) -> Result<Message> {
        let header = BGPMessageHeaderBuilder::default()
            .message_type(mtype)
            .build()
            .map_err(|e| FsmError::MessageBuild(e.to_string()))?;

        Ok(MessageBuilder::default()
            .header(header)
            .body(body)
            .build()
            .map_err(|e| FsmError::MessageBuild(e.to_string()))?)
    }

    /// Serialize body only (no marker/length/type header); the framing
    /// layer prepends the header when writing to the wire.
    pub fn encode_body(self) -> Vec<u8> {
        self.body.into()
    }

    /// Parse a message body given the type recovered from the header.
    pub fn decode_body(mtype: MessageType, body: Vec<u8>) -> Result<BGPMessageBody> {
        Ok(match mtype {
            MessageType::Open => BGPMessageBody::Open(body.into()),
            MessageType::Update => BGPMessageBody::Update(body),
            MessageType::Notification => BGPMessageBody::Notification(body.into()),
            MessageType::Keepalive => BGPMessageBody::Keepalive(BGPKeepaliveMessage::new()?),
            MessageType::RouteRefresh => BGPMessageBody::RouteRefresh(body),
        })
    }
}
