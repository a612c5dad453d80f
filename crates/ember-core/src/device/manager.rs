// Copyright 2025 Ember Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Process-wide registry of enumerated adapters and lazily created devices.

use crate::api::DeviceDesc;
use crate::device::Device;
use crate::error::DeviceError;
use crate::traits::{AdapterInfo, GpuInstance};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Enumerates physical adapters once at construction and lazily creates at
/// most one logical [`Device`] per adapter id, cached thereafter.
///
/// Explicitly constructible: there is no process-global registry; the one
/// shared piece of platform state is the [`GpuInstance`] handed in here.
#[derive(Debug)]
pub struct DeviceManager {
    instance: Arc<dyn GpuInstance>,
    adapters: BTreeMap<u32, AdapterInfo>,
    devices: Mutex<HashMap<u32, Device>>,
}

impl DeviceManager {
    /// Creates a manager over `instance`, enumerating adapters once.
    pub fn new(instance: Arc<dyn GpuInstance>) -> Self {
        let adapters = instance
            .enumerate_adapters()
            .into_iter()
            .map(|info| (info.id, info))
            .collect();
        Self {
            instance,
            adapters,
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Enumerated adapters as an id → name map.
    pub fn list_devices(&self) -> BTreeMap<u32, String> {
        self.adapters
            .iter()
            .map(|(&id, info)| (id, info.name.clone()))
            .collect()
    }

    /// Returns the device for `gpu_id`, creating it on first use.
    ///
    /// Repeated calls for the same id return the identical device handle
    /// regardless of `desc`. An id that was never enumerated fails without
    /// attempting creation; creation failure itself is also reported rather
    /// than panicked, since unsupported hardware is an expected condition.
    pub fn create_rendering_device(
        &self,
        gpu_id: u32,
        desc: &DeviceDesc,
    ) -> Result<Device, DeviceError> {
        if let Some(device) = self.devices.lock().unwrap().get(&gpu_id) {
            return Ok(device.clone());
        }
        if !self.adapters.contains_key(&gpu_id) {
            log::error!("Device {gpu_id} not enumerated");
            return Err(DeviceError::AdapterNotEnumerated(gpu_id));
        }

        let backend = self.instance.create_backend(gpu_id, desc)?;
        let device = Device::create(backend, desc.clone()).map_err(|err| {
            log::error!("Failed to create rendering device {gpu_id}: {err}");
            err
        })?;
        self.devices
            .lock()
            .unwrap()
            .insert(gpu_id, device.clone());
        Ok(device)
    }

    /// The already-created device for `gpu_id`, if any.
    pub fn rendering_device(&self, gpu_id: u32) -> Option<Device> {
        self.devices.lock().unwrap().get(&gpu_id).cloned()
    }

    /// The device on the lowest enumerated adapter id, created with a
    /// default configuration on first use.
    pub fn default_rendering_device(&self) -> Result<Device, DeviceError> {
        let first_id = *self
            .adapters
            .keys()
            .next()
            .ok_or_else(|| DeviceError::CreationFailed("no adapters enumerated".to_string()))?;
        self.create_rendering_device(first_id, &DeviceDesc::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockInstance;

    #[test]
    fn same_id_returns_the_identical_device() {
        let manager = DeviceManager::new(Arc::new(MockInstance::with_adapter_count(2)));
        let desc = DeviceDesc::default();

        let first = manager.create_rendering_device(0, &desc).unwrap();
        let second = manager.create_rendering_device(0, &desc).unwrap();
        assert!(first.is_same(&second));

        let other = manager.create_rendering_device(1, &desc).unwrap();
        assert!(!first.is_same(&other));
    }

    #[test]
    fn unenumerated_ids_fail_without_attempting_creation() {
        let manager = DeviceManager::new(Arc::new(MockInstance::with_adapter_count(1)));
        let err = manager
            .create_rendering_device(7, &DeviceDesc::default())
            .unwrap_err();
        assert!(matches!(err, DeviceError::AdapterNotEnumerated(7)));
        assert!(manager.rendering_device(7).is_none());
    }

    #[test]
    fn listing_reports_ids_and_names() {
        let manager = DeviceManager::new(Arc::new(MockInstance::with_adapter_count(2)));
        let listed = manager.list_devices();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[&0], "Mock Adapter 0");
        assert_eq!(listed[&1], "Mock Adapter 1");
    }
}
