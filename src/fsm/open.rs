use anyhow::Result;
use std::net::IpAddr;

use crate::bgp::{self, open_my_as, Afi, BGPMessageBody, BGPOpenMessage};
use crate::config::{GlobalConfig, NeighborConfig};

/// Build the local OPEN per §4.8: AS truncated to `AS_TRANS` if it does not
/// fit in 16 bits, hold time from config, Router ID, and the three
/// advertised capability option parameters (Route-Refresh, Multiprotocol
/// with AFI chosen by the neighbor's address family, Four-Octet-AS-Number
/// carrying the true 32-bit local AS).
pub fn build_open(global: &GlobalConfig, neighbor: &NeighborConfig) -> Result<BGPOpenMessage> {
    let afi = match neighbor.address {
        IpAddr::V4(_) => Afi::Ipv4,
        IpAddr::V6(a) if a.to_ipv4_mapped().is_some() => Afi::Ipv4,
        IpAddr::V6(_) => Afi::Ipv6,
    };

    let opt_params = bgp::advertised_optional_parameters(global.asn, afi);

    BGPOpenMessage::new(
        open_my_as(global.asn),
        u32::from(global.rid),
        neighbor.hold_time(global),
        opt_params,
    )
}

pub fn keepalive() -> Result<BGPMessageBody> {
    Ok(BGPMessageBody::Keepalive(bgp::BGPKeepaliveMessage::new()?))
}
