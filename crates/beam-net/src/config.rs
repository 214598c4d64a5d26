use std::net::Ipv4Addr;
use std::time::Duration;

use beam_core::LaserSettings;

use crate::addressing::MAX_SUBNET;

/// How datagrams are attributed to devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketLayout {
    /// Groups of all devices are spread over sockets without regard to
    /// device; the device comes from the per-packet destination address
    /// (`IP_PKTINFO`).
    Shared,
    /// Each device gets its own sockets, which join only that device's
    /// groups and tag what they receive with the device. Relies on the platform filtering multicast delivery by per-socket
    /// membership.
    PerDevice,
}

impl Default for SocketLayout {
    fn default() -> Self {
        if cfg!(any(target_os = "linux", target_os = "macos", target_os = "ios")) {
            SocketLayout::Shared
        } else {
            SocketLayout::PerDevice
        }
    }
}

/// Multicast receiver configuration.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// UDP port shared by all groups.
    pub port: u16,
    /// Interface used for group membership. Unspecified = let the OS pick.
    pub bind_addr: Ipv4Addr,
    /// Devices `0..max_devices` are decoded; groups are joined for
    /// `0..=max_devices`.
    pub max_devices: usize,
    /// Highest subnet joined per device.
    pub max_subnet: u8,
    /// Groups joined per socket before another socket is opened. Matches
    /// the Linux default for `net.ipv4.igmp_max_memberships`.
    pub max_memberships: usize,
    /// `SO_RCVBUF` request in bytes.
    pub recv_buffer_size: usize,
    /// How often the receive loop re-checks the stop flag.
    pub poll_interval: Duration,
    pub layout: SocketLayout,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self::from_settings(&LaserSettings::default())
    }
}

impl NetConfig {
    pub fn from_settings(settings: &LaserSettings) -> Self {
        Self {
            port: settings.network_port,
            bind_addr: Ipv4Addr::UNSPECIFIED,
            max_devices: settings.max_devices,
            max_subnet: MAX_SUBNET,
            max_memberships: 20,
            recv_buffer_size: 256 * 1024,
            poll_interval: Duration::from_millis(100),
            layout: SocketLayout::default(),
        }
    }

    /// Devices whose groups get joined.
    pub fn joined_devices(&self) -> impl Iterator<Item = u8> {
        0..=self.max_devices.min(u8::MAX as usize) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings() {
        let settings = LaserSettings {
            network_port: 6000,
            max_devices: 4,
            ..LaserSettings::default()
        };
        let config = NetConfig::from_settings(&settings);
        assert_eq!(config.port, 6000);
        assert_eq!(config.bind_addr, Ipv4Addr::UNSPECIFIED);
        assert_eq!(config.joined_devices().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_joined_devices_saturates() {
        let config = NetConfig {
            max_devices: 1000,
            ..NetConfig::default()
        };
        assert_eq!(config.joined_devices().count(), 256);
    }
}
