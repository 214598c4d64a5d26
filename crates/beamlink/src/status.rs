//! Operator-facing status summary.

use std::fmt;

use beam_net::NetworkStats;

/// Point counts for one device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub device: usize,
    pub points: usize,
    pub beam_points: usize,
    pub hot_beam_points: usize,
}

/// Distinguishes "nothing arrives at all" from "this device is quiet".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWarning {
    NoNetworkData,
    DeviceIdle(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub stats: NetworkStats,
    pub devices: Vec<DeviceStatus>,
    pub viewing: usize,
    pub warning: Option<StatusWarning>,
}

impl StatusReport {
    pub fn new(stats: NetworkStats, devices: Vec<DeviceStatus>, viewing: usize) -> Self {
        let warning = if stats.packets_received == 0 {
            Some(StatusWarning::NoNetworkData)
        } else if devices
            .iter()
            .find(|d| d.device == viewing)
            .map_or(true, |d| d.points == 0)
        {
            Some(StatusWarning::DeviceIdle(viewing))
        } else {
            None
        };

        Self {
            stats,
            devices,
            viewing,
            warning,
        }
    }
}

impl fmt::Display for StatusWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusWarning::NoNetworkData => write!(
                f,
                "No network data received. Check the controller's multicast output and the network interface."
            ),
            StatusWarning::DeviceIdle(device) => {
                write!(f, "Device {} has no points. Other devices may still be receiving data.", device)
            }
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Network: {} packets, {} bytes, last packet {} bytes",
            self.stats.packets_received, self.stats.bytes_received, self.stats.last_packet_size
        )?;
        for d in &self.devices {
            writeln!(
                f,
                "  Device {} (239.255.{}.x): {} points, {} beam, {} hot beam",
                d.device, d.device, d.points, d.beam_points, d.hot_beam_points
            )?;
        }
        write!(f, "Viewing device {}", self.viewing)?;
        if let Some(warning) = &self.warning {
            write!(f, "\nWARNING: {}", warning)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(device: usize, points: usize) -> DeviceStatus {
        DeviceStatus {
            device,
            points,
            beam_points: points,
            hot_beam_points: 0,
        }
    }

    fn stats(packets: u64) -> NetworkStats {
        NetworkStats {
            packets_received: packets,
            bytes_received: packets * 100,
            last_packet_size: 100,
            ..NetworkStats::default()
        }
    }

    #[test]
    fn test_no_network_data_wins() {
        let report = StatusReport::new(stats(0), vec![device(0, 0)], 0);
        assert_eq!(report.warning, Some(StatusWarning::NoNetworkData));
    }

    #[test]
    fn test_device_idle() {
        let report = StatusReport::new(stats(5), vec![device(0, 0), device(1, 40)], 0);
        assert_eq!(report.warning, Some(StatusWarning::DeviceIdle(0)));

        let report = StatusReport::new(stats(5), vec![device(0, 0), device(1, 40)], 1);
        assert_eq!(report.warning, None);
    }

    #[test]
    fn test_display() {
        let report = StatusReport::new(stats(2), vec![device(3, 12)], 3);
        let text = report.to_string();
        assert!(text.contains("2 packets"));
        assert!(text.contains("Device 3 (239.255.3.x): 12 points"));
        assert!(!text.contains("WARNING"));

        let report = StatusReport::new(stats(0), vec![], 0);
        assert!(report.to_string().contains("WARNING: No network data"));
    }
}
