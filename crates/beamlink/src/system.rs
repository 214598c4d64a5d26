use std::net::Ipv4Addr;
use std::sync::Arc;

use beam_core::{DevicePointBuffer, LaserPoint, LaserSettings};
use beam_net::{DecoderAdapter, MulticastReceiver, NetConfig, NetworkStats};

use crate::registry::DeviceRegistry;
use crate::status::{DeviceStatus, StatusReport};

/// Ties the multicast receiver to the per-device point buffers.
///
/// Decoded batches land in the matching device buffer on the receiver
/// thread. [`update`](BeamLinkSystem::update) runs every device's pipeline
/// and is meant to be called once per frame from the render thread.
pub struct BeamLinkSystem {
    settings: LaserSettings,
    devices: Arc<DeviceRegistry>,
    receiver: MulticastReceiver,
}

impl BeamLinkSystem {
    /// Build buffers for every configured device and wire the receiver
    /// callback to them. The receiver is not started.
    pub fn new(settings: LaserSettings, decoder: DecoderAdapter) -> Self {
        let settings = settings.sanitized();
        let devices = Arc::new(DeviceRegistry::new(&settings));
        for device in 0..settings.max_devices {
            devices.get_or_create(device);
        }

        let decoder_name = decoder.backend_name().to_string();
        let receiver = MulticastReceiver::new(NetConfig::from_settings(&settings), decoder);
        let sink = devices.clone();
        receiver.set_data_callback(move |device, points| store_points(&sink, device, points));

        log::info!(
            "BeamLink initialized: {} devices, port {}, decoder {}",
            settings.max_devices,
            settings.network_port,
            decoder_name
        );

        Self {
            settings,
            devices,
            receiver,
        }
    }

    pub fn settings(&self) -> &LaserSettings {
        &self.settings
    }

    /// Start listening. Failures are logged and reported as `false`.
    pub fn start_network_receiver(&mut self, bind_addr: Ipv4Addr) -> bool {
        match self.receiver.start(bind_addr) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to start network receiver: {}", e);
                false
            }
        }
    }

    pub fn stop_network_receiver(&mut self) {
        self.receiver.stop();
    }

    pub fn is_receiving(&self) -> bool {
        self.receiver.is_running()
    }

    /// Store a decoded batch as if it had arrived from the network.
    pub fn submit_points(&self, device: usize, points: Vec<LaserPoint>) {
        store_points(&self.devices, device, points);
    }

    /// Run the processing pipeline for every device.
    pub fn update(&self) {
        // The table lock is released before any pipeline runs.
        for buffer in self.devices.snapshot() {
            buffer.update();
        }
    }

    pub fn device(&self, device: usize) -> Option<Arc<DevicePointBuffer>> {
        self.devices.get(device)
    }

    pub fn network_stats(&self) -> NetworkStats {
        self.receiver.stats()
    }

    pub fn status_report(&self, viewing: usize) -> StatusReport {
        let devices = self
            .devices
            .snapshot()
            .iter()
            .map(|buffer| {
                let frames = buffer.lock();
                DeviceStatus {
                    device: buffer.device(),
                    points: frames.processed.len(),
                    beam_points: frames.beam.len(),
                    hot_beam_points: frames.hot_beam.len(),
                }
            })
            .collect();
        StatusReport::new(self.network_stats(), devices, viewing)
    }

    /// Stop the receiver and release every device buffer.
    pub fn shutdown(&mut self) {
        self.receiver.stop();
        self.devices.clear();
    }
}

impl Drop for BeamLinkSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn store_points(devices: &DeviceRegistry, device: usize, points: Vec<LaserPoint>) {
    if let Some(buffer) = devices.get_or_create(device) {
        buffer.set_point_list(points);
    }
}
