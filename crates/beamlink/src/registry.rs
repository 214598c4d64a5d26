use std::sync::{Arc, Mutex, MutexGuard};

use beam_core::{DevicePointBuffer, LaserSettings};

type Slots = Vec<Option<Arc<DevicePointBuffer>>>;

/// Fixed-size table of device buffers, indexed by device id.
///
/// The lock only guards the table itself. Callers get an `Arc` to the
/// buffer and release the table before touching the points.
pub struct DeviceRegistry {
    settings: LaserSettings,
    slots: Mutex<Slots>,
}

impl DeviceRegistry {
    /// Table with room for devices `0..settings.max_devices`.
    pub fn new(settings: &LaserSettings) -> Self {
        Self {
            settings: settings.clone(),
            slots: Mutex::new(vec![None; settings.max_devices]),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock().len()
    }

    /// Buffer for `device`, created on first use. `None` when the id is
    /// outside the table.
    pub fn get_or_create(&self, device: usize) -> Option<Arc<DevicePointBuffer>> {
        let mut slots = self.lock();
        let slot = slots.get_mut(device)?;
        let buffer = slot.get_or_insert_with(|| {
            log::debug!("Created point buffer for device {}", device);
            Arc::new(DevicePointBuffer::new(device, &self.settings))
        });
        Some(buffer.clone())
    }

    /// Buffer for `device` if it has been created.
    pub fn get(&self, device: usize) -> Option<Arc<DevicePointBuffer>> {
        self.lock().get(device)?.clone()
    }

    /// Every created buffer, in device order.
    pub fn snapshot(&self) -> Vec<Arc<DevicePointBuffer>> {
        self.lock().iter().flatten().cloned().collect()
    }

    /// Drop every buffer. Outstanding `Arc`s stay valid.
    pub fn clear(&self) {
        self.lock().iter_mut().for_each(|slot| *slot = None);
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(max_devices: usize) -> DeviceRegistry {
        DeviceRegistry::new(&LaserSettings {
            max_devices,
            ..LaserSettings::default()
        })
    }

    #[test]
    fn test_lazy_creation() {
        let registry = registry(3);
        assert_eq!(registry.capacity(), 3);
        assert!(registry.get(1).is_none());
        assert!(registry.snapshot().is_empty());

        let created = registry.get_or_create(1).unwrap();
        assert_eq!(created.device(), 1);
        let again = registry.get(1).unwrap();
        assert!(Arc::ptr_eq(&created, &again));
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_out_of_range() {
        let registry = registry(2);
        assert!(registry.get_or_create(2).is_none());
        assert!(registry.get(usize::MAX).is_none());
    }

    #[test]
    fn test_snapshot_in_device_order() {
        let registry = registry(4);
        registry.get_or_create(3);
        registry.get_or_create(0);
        let ids: Vec<_> = registry.snapshot().iter().map(|b| b.device()).collect();
        assert_eq!(ids, vec![0, 3]);

        registry.clear();
        assert!(registry.snapshot().is_empty());
    }
}
