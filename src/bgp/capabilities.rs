use byteorder::{BigEndian, WriteBytesExt};
use itertools::Itertools;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::io::prelude::*;
use std::io::Cursor;

use super::types::*;

#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq)]
#[repr(u8)]
pub enum BGPOptionalParameterType {
    Authentication = 1, // deprecated
    Capability = 2,
}

#[derive(Debug, Clone)]
pub struct BGPOptionalParameter {
    pub param_type: BGPOptionalParameterType,
    pub param_length: usize,
    pub param_value: Vec<u8>,
}

impl From<Vec<u8>> for BGPOptionalParameter {
    fn from(src: Vec<u8>) -> Self {
        let mut ptype = [0u8; 1];
        ptype.copy_from_slice(&src[0..1]);
        let ptype = u8::from_be_bytes(ptype);

        let mut plen = [0u8; 1];
        plen.copy_from_slice(&src[1..2]);
        let plen = u8::from_be_bytes(plen);

        BGPOptionalParameter {
            param_type: BGPOptionalParameterType::from_u8(ptype).unwrap(),
            param_length: plen as usize,
            param_value: src[2..].to_vec(),
        }
    }
}

impl From<BGPOptionalParameter> for Vec<u8> {
    fn from(val: BGPOptionalParameter) -> Self {
        let mut buf = Cursor::new(vec![]);
        buf.write_all(&[val.param_type as u8]).unwrap();
        buf.write_all(&[val.param_value.len() as u8]).unwrap();
        buf.write_all(&val.param_value).unwrap();
        buf.into_inner()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BGPOptionalParameters {
    pub len: usize,
    pub params: Vec<BGPOptionalParameter>,
}

impl BGPOptionalParameters {
    pub fn new(params: Vec<BGPOptionalParameter>) -> BGPOptionalParameters {
        let mut len = 0;
        for p in &params {
            len += 2;
            len += p.param_length;
        }
        BGPOptionalParameters { len, params }
    }
}

impl From<BGPOptionalParameters> for Vec<u8> {
    fn from(val: BGPOptionalParameters) -> Self {
        let mut buf = Cursor::new(vec![]);
        buf.write_u8(val.len as u8).unwrap();
        for p in val.params {
            let p: Vec<u8> = p.into();
            buf.write_all(&p).unwrap();
        }
        buf.into_inner()
    }
}

impl From<Vec<u8>> for BGPOptionalParameters {
    fn from(src: Vec<u8>) -> Self {
        if src.is_empty() {
            return BGPOptionalParameters::default();
        }

        let mut len = [0u8; 1];
        len.copy_from_slice(&src[0..1]);
        let len = u8::from_be_bytes(len);

        let mut wd: Vec<BGPOptionalParameter> = vec![];
        let mut used = 0;
        let mut i = 1;

        while len > used {
            let mut optlen = [0u8; 1];
            optlen.copy_from_slice(&src[i + 1..i + 2]);
            let optlen = u8::from_be_bytes(optlen);
            let end: usize = optlen as usize + 2;

            let n: BGPOptionalParameter = src[i..(i + end)].to_vec().into();
            wd.push(n);
            used += optlen + 2;
            i += optlen as usize + 2;
        }
        BGPOptionalParameters { len: i, params: wd }
    }
}

#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq)]
#[repr(u8)]
pub enum BGPCapabilityCode {
    Multiprotocol = 1,
    RouteRefresh = 2,
    OutboundRouteFiltering = 3,
    ExtendedNextHopEncoding = 5,
    GracefulRestart = 64,
    FourOctectASN = 65,
    DynamicCapability = 67,
    MultisessionBGP = 68,
    AddPath = 69,
    EnhancedRouteRefresh = 70,
    LongLivedGracefulRestart = 71,
    FQDNCapability = 73,
    #[doc(hidden)]
    Unknown = 255,
}

#[derive(Debug, Clone)]
pub struct BGPCapability {
    pub capability_code: BGPCapabilityCode,
    pub capability_length: usize,
    pub capability_value: Vec<u8>,
}

impl From<Vec<u8>> for BGPCapability {
    fn from(src: Vec<u8>) -> Self {
        if src.len() < 2 {
            log::warn!("Capability buffer too short: {:?}", src);
            return BGPCapability {
                capability_code: BGPCapabilityCode::Unknown,
                capability_length: 0,
                capability_value: vec![],
            };
        }

        let code = src[0];
        let length = src[1] as usize;

        let cap_code = BGPCapabilityCode::from_u8(code).unwrap_or_else(|| {
            log::warn!("Unrecognized capability code: {} ({} bytes)", code, length);
            BGPCapabilityCode::Unknown
        });

        let value = if src.len() >= 2 + length {
            src[2..2 + length].to_vec()
        } else {
            log::warn!(
                "Capability code {} claims length {}, but buffer is only {} bytes",
                code,
                length,
                src.len()
            );
            vec![]
        };

        BGPCapability {
            capability_code: cap_code,
            capability_length: length,
            capability_value: value,
        }
    }
}

impl From<BGPCapability> for Vec<u8> {
    fn from(val: BGPCapability) -> Self {
        let mut buf = Cursor::new(vec![]);
        buf.write_u8(val.capability_code as u8).unwrap();
        buf.write_u8(val.capability_length as u8).unwrap();
        buf.write_all(&val.capability_value).unwrap();
        buf.into_inner()
    }
}

/// Multiprotocol Extensions capability value (RFC 4760): AFI, one reserved
/// byte, SAFI.
#[derive(Debug)]
pub struct BGPCapabilityMultiprotocol {
    pub afi: Afi,
    pub safi: Safi,
}

impl From<BGPCapabilityMultiprotocol> for Vec<u8> {
    fn from(val: BGPCapabilityMultiprotocol) -> Self {
        let mut buf = Cursor::new(vec![]);
        buf.write_u16::<BigEndian>(val.afi as u16).unwrap();
        buf.write_u8(0).unwrap();
        buf.write_u8(val.safi as u8).unwrap();
        buf.into_inner()
    }
}

/// Four-Octet AS Number capability value (RFC 6793): the true 32-bit AS.
#[derive(Debug)]
pub struct BGPCapabilityFourOctetAsn {
    pub asn: u32,
}

impl From<BGPCapabilityFourOctetAsn> for Vec<u8> {
    fn from(val: BGPCapabilityFourOctetAsn) -> Self {
        let mut buf = Cursor::new(vec![]);
        buf.write_u32::<BigEndian>(val.asn).unwrap();
        buf.into_inner()
    }
}

fn wrap_capability(code: BGPCapabilityCode, value: Vec<u8>) -> BGPOptionalParameter {
    let cap = BGPCapability {
        capability_code: code,
        capability_length: value.len(),
        capability_value: value,
    };
    let cap: Vec<u8> = cap.into();
    BGPOptionalParameter {
        param_type: BGPOptionalParameterType::Capability,
        param_length: cap.len(),
        param_value: cap,
    }
}

/// Build the three OPEN optional parameters this speaker advertises, each
/// carrying exactly one capability in its own envelope (wire parity with
/// the reference daemon rather than the permitted grouped form).
pub fn advertised_optional_parameters(local_asn: u32, neighbor_afi: Afi) -> BGPOptionalParameters {
    let route_refresh = wrap_capability(BGPCapabilityCode::RouteRefresh, vec![]);

    let multiprotocol = wrap_capability(
        BGPCapabilityCode::Multiprotocol,
        BGPCapabilityMultiprotocol {
            afi: neighbor_afi,
            safi: Safi::NLRIUnicast,
        }
        .into(),
    );

    let four_octet_asn = wrap_capability(
        BGPCapabilityCode::FourOctectASN,
        BGPCapabilityFourOctetAsn { asn: local_asn }.into(),
    );

    BGPOptionalParameters::new(vec![route_refresh, multiprotocol, four_octet_asn])
}

#[derive(Debug, Clone, Default)]
pub struct BGPCapabilities {
    pub params: Vec<BGPCapability>,
}

impl From<BGPOptionalParameters> for BGPCapabilities {
    fn from(src: BGPOptionalParameters) -> Self {
        let mut all_caps = Vec::new();

        for param in src.params {
            if param.param_type == BGPOptionalParameterType::Capability {
                let mut offset = 0;
                let data = &param.param_value;

                while offset < data.len() {
                    if offset + 2 > data.len() {
                        log::warn!("Incomplete capability at offset {}", offset);
                        break;
                    }

                    let cap_len = data[offset + 1] as usize;

                    if offset + 2 + cap_len > data.len() {
                        log::warn!("Capability length {} exceeds available data", cap_len);
                        break;
                    }

                    let cap_data = data[offset..offset + 2 + cap_len].to_vec();
                    let cap: BGPCapability = cap_data.into();
                    all_caps.push(cap);

                    offset += 2 + cap_len;
                }
            }
        }

        BGPCapabilities { params: all_caps }
    }
}

/// Negotiated view of a peer's capabilities, parsed out of the raw
/// `BGPCapabilities` carried in an OPEN message.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub multiprotocol: Option<Vec<AddressFamily>>,
    pub route_refresh: bool,
    pub four_octet_asn: Option<u32>,
}

impl From<BGPCapabilities> for Capabilities {
    fn from(src: BGPCapabilities) -> Self {
        let mut capabilities = Capabilities::default();
        let mut afs = vec![];

        for c in src.params {
            match c.capability_code {
                BGPCapabilityCode::Multiprotocol => {
                    if c.capability_length >= 4 {
                        let mut afi = [0u8; 2];
                        let mut safi = [0u8; 1];
                        afi.copy_from_slice(&c.capability_value[0..2]);
                        safi.copy_from_slice(&c.capability_value[3..4]);

                        let afi = u16::from_be_bytes(afi);
                        let safi = u8::from_be_bytes(safi);

                        if let (Some(afi), Some(safi)) = (Afi::from_u16(afi), Safi::from_u8(safi))
                        {
                            afs.push(AddressFamily { afi, safi });
                        }
                    }
                }
                BGPCapabilityCode::RouteRefresh => capabilities.route_refresh = true,
                BGPCapabilityCode::FourOctectASN => {
                    if c.capability_length == 4 {
                        let mut v = [0u8; 4];
                        v.copy_from_slice(&c.capability_value);
                        capabilities.four_octet_asn = Some(u32::from_be_bytes(v));
                    } else {
                        log::warn!(
                            "Four-Octet AS Number capability had unexpected length {}",
                            c.capability_length
                        );
                    }
                }
                other => {
                    log::debug!("Ignoring unsupported BGP capability: {:?}", other);
                }
            }
        }
        if !afs.is_empty() {
            capabilities.multiprotocol = Some(afs.into_iter().unique().collect());
        }

        capabilities
    }
}
