//! In-memory backend for tests
//!
//! Tracks a flat device tree in a mutex and answers the `StorageBackend`
//! port without touching real storage. Individual operations can be
//! scripted to fail once via [`MockBackend::fail_next`].

use crate::domain::{
    DeviceDescription, DeviceKind, DevicePath, ElementRef, PoolDescription, StorageBackend,
};
use crate::error::{Error, Result};
use crate::redundancy::{RaidLevel, RedundancyProfile};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

const DEFAULT_EXTENT_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
struct MockDevice {
    description: DeviceDescription,
    profile: RedundancyProfile,
}

#[derive(Default)]
struct MockState {
    devices: HashMap<String, MockDevice>,
    pools: HashMap<String, PoolDescription>,
    planned_failures: HashMap<String, String>,
    last_raid_level: Option<RaidLevel>,
    volume_counter: u64,
}

/// Scriptable in-memory `StorageBackend`
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Register a plain disk with the default redundancy profile
    pub fn add_disk(&self, path: &str, size_bytes: u64) {
        self.add_device(path, DeviceKind::Disk, size_bytes, RedundancyProfile::default());
    }

    /// Register a device with an explicit kind and profile
    pub fn add_device(
        &self,
        path: &str,
        kind: DeviceKind,
        size_bytes: u64,
        profile: RedundancyProfile,
    ) {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let device = MockDevice {
            description: DeviceDescription {
                path: DevicePath::from(path),
                name,
                kind,
                size_bytes,
                element_ref: ElementRef::new(format!("device:{path}")),
                pool: None,
            },
            profile,
        };
        self.state.lock().devices.insert(path.to_string(), device);
    }

    /// Register a volume group over previously added member devices
    pub fn add_pool(&self, path: &str, name: &str, members: &[&str]) {
        let mut state = self.state.lock();
        let size_bytes = members
            .iter()
            .filter_map(|m| state.devices.get(*m))
            .map(|d| d.description.size_bytes)
            .sum();
        let pool = PoolDescription {
            path: DevicePath::from(path),
            name: name.to_string(),
            size_bytes,
            extent_size_bytes: DEFAULT_EXTENT_SIZE,
            element_ref: ElementRef::new(format!("pool:{path}")),
            members: members.iter().map(|m| DevicePath::from(*m)).collect(),
        };
        state.pools.insert(path.to_string(), pool);
    }

    /// Register an assembled RAID array over member devices
    pub fn add_raid(&self, path: &str, name: &str, level: RaidLevel, members: &[&str]) {
        let (size_bytes, profile) = {
            let state = self.state.lock();
            let profiles: Vec<RedundancyProfile> = members
                .iter()
                .filter_map(|m| state.devices.get(*m))
                .map(|d| d.profile)
                .collect();
            let size = members
                .iter()
                .filter_map(|m| state.devices.get(*m))
                .map(|d| d.description.size_bytes)
                .min()
                .unwrap_or(0);
            (size, RedundancyProfile::combine(&profiles, Some(level)))
        };
        let name_owned = name.to_string();
        let device = MockDevice {
            description: DeviceDescription {
                path: DevicePath::from(path),
                name: name_owned,
                kind: DeviceKind::RaidArray,
                size_bytes,
                element_ref: ElementRef::new(format!("device:{path}")),
                pool: None,
            },
            profile,
        };
        self.state.lock().devices.insert(path.to_string(), device);
    }

    /// Make the next call of `operation` fail with the given message
    pub fn fail_next(&self, operation: &str, message: &str) {
        self.state
            .lock()
            .planned_failures
            .insert(operation.to_string(), message.to_string());
    }

    pub fn device_exists(&self, path: &str) -> bool {
        self.state.lock().devices.contains_key(path)
    }

    pub fn pool_exists(&self, path: &str) -> bool {
        self.state.lock().pools.contains_key(path)
    }

    /// Level of the most recently assembled RAID array
    pub fn last_raid_level(&self) -> Option<RaidLevel> {
        self.state.lock().last_raid_level
    }

    fn check_failure(&self, operation: &str) -> Result<()> {
        if let Some(reason) = self.state.lock().planned_failures.remove(operation) {
            return Err(Error::BackendOperationFailed {
                operation: operation.to_string(),
                reason,
            });
        }
        Ok(())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    async fn find_device(&self, path: &DevicePath) -> Result<Option<DeviceDescription>> {
        self.check_failure("find_device")?;
        Ok(self
            .state
            .lock()
            .devices
            .get(path.as_str())
            .map(|d| d.description.clone()))
    }

    async fn find_pool(&self, path: &DevicePath) -> Result<Option<PoolDescription>> {
        self.check_failure("find_pool")?;
        Ok(self.state.lock().pools.get(path.as_str()).cloned())
    }

    async fn redundancy(&self, path: &DevicePath) -> Result<RedundancyProfile> {
        self.check_failure("redundancy")?;
        let state = self.state.lock();
        if let Some(device) = state.devices.get(path.as_str()) {
            return Ok(device.profile);
        }
        if let Some(pool) = state.pools.get(path.as_str()) {
            let profiles: Vec<RedundancyProfile> = pool
                .members
                .iter()
                .filter_map(|m| state.devices.get(m.as_str()))
                .map(|d| d.profile)
                .collect();
            if profiles.is_empty() {
                return Ok(RedundancyProfile::default());
            }
            return Ok(RedundancyProfile::combine(&profiles, None));
        }
        Err(Error::DeviceNotFound {
            path: path.to_string(),
        })
    }

    async fn create_volume_group(
        &self,
        name: Option<&str>,
        devices: &[DevicePath],
        extent_size_bytes: Option<u64>,
    ) -> Result<PoolDescription> {
        self.check_failure("create_volume_group")?;
        let mut state = self.state.lock();
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                state.volume_counter += 1;
                format!("vg{}", state.volume_counter)
            }
        };
        let path = format!("/dev/{name}");
        let size_bytes = devices
            .iter()
            .filter_map(|d| state.devices.get(d.as_str()))
            .map(|d| d.description.size_bytes)
            .sum();
        let pool = PoolDescription {
            path: DevicePath::from(path.as_str()),
            name,
            size_bytes,
            extent_size_bytes: extent_size_bytes.unwrap_or(DEFAULT_EXTENT_SIZE),
            element_ref: ElementRef::new(format!("pool:{path}")),
            members: devices.to_vec(),
        };
        state.pools.insert(path, pool.clone());
        Ok(pool)
    }

    async fn delete_volume_group(&self, pool: &DevicePath) -> Result<()> {
        self.check_failure("delete_volume_group")?;
        let mut state = self.state.lock();
        if state.pools.remove(pool.as_str()).is_none() {
            return Err(Error::DeviceNotFound {
                path: pool.to_string(),
            });
        }
        Ok(())
    }

    async fn create_raid(
        &self,
        name: Option<&str>,
        level: RaidLevel,
        devices: &[DevicePath],
    ) -> Result<DeviceDescription> {
        self.check_failure("create_raid")?;
        let mut state = self.state.lock();
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                state.volume_counter += 1;
                format!("md{}", state.volume_counter)
            }
        };
        let path = format!("/dev/{name}");
        let profiles: Vec<RedundancyProfile> = devices
            .iter()
            .filter_map(|d| state.devices.get(d.as_str()))
            .map(|d| d.profile)
            .collect();
        let size_bytes = devices
            .iter()
            .filter_map(|d| state.devices.get(d.as_str()))
            .map(|d| d.description.size_bytes)
            .min()
            .unwrap_or(0);
        let description = DeviceDescription {
            path: DevicePath::from(path.as_str()),
            name,
            kind: DeviceKind::RaidArray,
            size_bytes,
            element_ref: ElementRef::new(format!("device:{path}")),
            pool: None,
        };
        state.devices.insert(
            path,
            MockDevice {
                description: description.clone(),
                profile: RedundancyProfile::combine(&profiles, Some(level)),
            },
        );
        state.last_raid_level = Some(level);
        Ok(description)
    }

    async fn delete_raid(&self, device: &DevicePath) -> Result<()> {
        self.check_failure("delete_raid")?;
        let mut state = self.state.lock();
        if state.devices.remove(device.as_str()).is_none() {
            return Err(Error::DeviceNotFound {
                path: device.to_string(),
            });
        }
        Ok(())
    }

    async fn create_logical_volume(
        &self,
        pool: &DevicePath,
        name: Option<&str>,
        size_bytes: u64,
    ) -> Result<DeviceDescription> {
        self.check_failure("create_logical_volume")?;
        let mut state = self.state.lock();
        let extent_size = state
            .pools
            .get(pool.as_str())
            .map(|p| p.extent_size_bytes)
            .ok_or_else(|| Error::DeviceNotFound {
                path: pool.to_string(),
            })?;
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                state.volume_counter += 1;
                format!("lv{}", state.volume_counter)
            }
        };
        let path = format!("{pool}/{name}");
        let achieved = align_up(size_bytes, extent_size);
        let description = DeviceDescription {
            path: DevicePath::from(path.as_str()),
            name,
            kind: DeviceKind::LogicalVolume,
            size_bytes: achieved,
            element_ref: ElementRef::new(format!("device:{path}")),
            pool: Some(pool.clone()),
        };
        state.devices.insert(
            path,
            MockDevice {
                description: description.clone(),
                profile: RedundancyProfile::default(),
            },
        );
        Ok(description)
    }

    async fn resize_logical_volume(&self, device: &DevicePath, size_bytes: u64) -> Result<u64> {
        self.check_failure("resize_logical_volume")?;
        let mut state = self.state.lock();
        let extent_size = {
            let entry = state
                .devices
                .get(device.as_str())
                .ok_or_else(|| Error::DeviceNotFound {
                    path: device.to_string(),
                })?;
            entry
                .description
                .pool
                .as_ref()
                .and_then(|p| state.pools.get(p.as_str()))
                .map(|p| p.extent_size_bytes)
                .unwrap_or(DEFAULT_EXTENT_SIZE)
        };
        let achieved = align_up(size_bytes, extent_size);
        if let Some(entry) = state.devices.get_mut(device.as_str()) {
            entry.description.size_bytes = achieved;
        }
        Ok(achieved)
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}
