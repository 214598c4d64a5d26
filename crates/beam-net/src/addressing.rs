//! Multicast group scheme: `239.255.{device}.{subnet}`.
//!
//! The controller encodes the target device in the third octet of the
//! destination group, so the group a datagram was sent to identifies the
//! device without looking at the payload.

use std::net::Ipv4Addr;

/// First two octets shared by every laser group.
pub const GROUP_PREFIX: [u8; 2] = [239, 255];

/// Highest subnet joined per device.
pub const MAX_SUBNET: u8 = 30;

pub fn group_address(device: u8, subnet: u8) -> Ipv4Addr {
    Ipv4Addr::new(GROUP_PREFIX[0], GROUP_PREFIX[1], device, subnet)
}

/// All groups of one device, subnet 0 through `max_subnet`.
pub fn device_groups(device: u8, max_subnet: u8) -> impl Iterator<Item = (u8, Ipv4Addr)> {
    (0..=max_subnet).map(move |subnet| (subnet, group_address(device, subnet)))
}

/// Device index encoded in a destination address, if it is a laser group.
pub fn identify_device(destination: Ipv4Addr) -> Option<usize> {
    let [a, b, device, _] = destination.octets();
    if [a, b] == GROUP_PREFIX {
        Some(device as usize)
    } else {
        None
    }
}
