use std::sync::{Mutex, MutexGuard};

use crate::pipeline::{DeviceFrames, PointPipeline};
use crate::point::LaserPoint;
use crate::settings::LaserSettings;

/// Initial capacity reserved for each point list.
const INITIAL_CAPACITY: usize = 10_000;

/// Raw and processed point lists for one device behind a single lock.
///
/// The receiver thread swaps in raw lists with [`set_point_list`], the tick
/// thread rebuilds the outputs with [`update`], and the renderer copies the
/// outputs while holding [`lock`]. Every one of these holds the lock for its
/// whole critical section, so a tick never sees a half-written raw list.
///
/// [`set_point_list`]: DevicePointBuffer::set_point_list
/// [`update`]: DevicePointBuffer::update
/// [`lock`]: DevicePointBuffer::lock
pub struct DevicePointBuffer {
    device: usize,
    pipeline: PointPipeline,
    frames: Mutex<DeviceFrames>,
}

impl DevicePointBuffer {
    pub fn new(device: usize, settings: &LaserSettings) -> Self {
        Self {
            device,
            pipeline: PointPipeline::new(settings),
            frames: Mutex::new(DeviceFrames::with_capacity(INITIAL_CAPACITY)),
        }
    }

    pub fn device(&self) -> usize {
        self.device
    }

    /// Replace the raw list.
    pub fn set_point_list(&self, points: Vec<LaserPoint>) {
        self.lock().raw = points;
    }

    /// Run the processing pipeline over the current raw list.
    pub fn update(&self) {
        let mut frames = self.lock();
        self.pipeline.run(&mut frames);
    }

    /// Lock the frames for reading. Consumers hold this while copying.
    pub fn lock(&self) -> MutexGuard<'_, DeviceFrames> {
        self.frames.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn point_count(&self) -> usize {
        self.lock().processed.len()
    }

    pub fn beam_point_count(&self) -> usize {
        self.lock().beam.len()
    }

    pub fn hot_beam_point_count(&self) -> usize {
        self.lock().hot_beam.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_raw() {
        let buffer = DevicePointBuffer::new(2, &LaserSettings::default());
        buffer.set_point_list(vec![LaserPoint::xy(0.0, 0.0); 5]);
        buffer.set_point_list(vec![LaserPoint::xy(1.0, 1.0); 2]);
        assert_eq!(buffer.lock().raw.len(), 2);
        assert_eq!(buffer.device(), 2);
    }

    #[test]
    fn test_update_without_simulation_copies_raw() {
        let settings = LaserSettings {
            scanner_simulation: false,
            enable_beam_brush: false,
            ..LaserSettings::default()
        };
        let buffer = DevicePointBuffer::new(0, &settings);
        let raw = vec![
            LaserPoint::with_rgb(0.0, 0.0, 1.0, 0.0, 0.0),
            LaserPoint::with_rgb(0.0, 0.0, 1.0, 0.0, 0.0),
            LaserPoint::with_rgb(0.5, 0.0, 0.0, 1.0, 0.0),
        ];
        buffer.set_point_list(raw.clone());
        buffer.update();
        let frames = buffer.lock();
        assert_eq!(frames.processed, raw);
        assert_eq!(frames.beam, raw);
    }

    #[test]
    fn test_counts_follow_outputs() {
        let buffer = DevicePointBuffer::new(0, &LaserSettings::default());
        assert_eq!(buffer.point_count(), 0);
        buffer.set_point_list(vec![LaserPoint::with_rgb(0.2, 0.2, 1.0, 1.0, 1.0)]);
        buffer.update();
        assert_eq!(buffer.point_count(), 1);
        assert_eq!(buffer.beam_point_count(), 1);
        assert_eq!(buffer.hot_beam_point_count(), 0);
    }
}
