//! Domain Ports - trait boundaries between the engine and the outside
//!
//! The engine never manipulates storage itself. Everything slow, failing
//! or privileged sits behind [`StorageBackend`], and deferred job actions
//! receive an [`ExecutionContext`] instead of reaching for ambient state.

use crate::error::Result;
use crate::redundancy::{RaidLevel, RedundancyProfile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// References
// =============================================================================

/// Stable path of a block device or pool (e.g. `/dev/md0`, `/dev/vg0`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevicePath(pub String);

impl DevicePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DevicePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DevicePath {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DevicePath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque reference to a managed element, as rendered to remote clients.
///
/// Never a live handle; safe to snapshot into job arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ElementRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Device Descriptions
// =============================================================================

/// Kind of managed block device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Disk,
    Partition,
    RaidArray,
    VolumeGroup,
    LogicalVolume,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Disk => write!(f, "disk"),
            DeviceKind::Partition => write!(f, "partition"),
            DeviceKind::RaidArray => write!(f, "RAID array"),
            DeviceKind::VolumeGroup => write!(f, "volume group"),
            DeviceKind::LogicalVolume => write!(f, "logical volume"),
        }
    }
}

/// Point-in-time description of a device, as returned by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub path: DevicePath,
    pub name: String,
    pub kind: DeviceKind,
    pub size_bytes: u64,
    /// Protocol-facing reference for this device
    pub element_ref: ElementRef,
    /// Containing pool, for logical volumes
    pub pool: Option<DevicePath>,
}

/// Point-in-time description of a storage pool (volume group)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolDescription {
    pub path: DevicePath,
    pub name: String,
    pub size_bytes: u64,
    pub extent_size_bytes: u64,
    /// Protocol-facing reference for this pool
    pub element_ref: ElementRef,
    /// Member physical devices
    pub members: Vec<DevicePath>,
}

// =============================================================================
// Storage Backend Port
// =============================================================================

/// Port to the storage-manipulation subsystem.
///
/// Every method may be slow and may fail; none of them is assumed safe to
/// call concurrently for overlapping devices — callers must not schedule
/// two mutating jobs against the same physical device.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Describe a device, or `None` when the path is unknown
    async fn find_device(&self, path: &DevicePath) -> Result<Option<DeviceDescription>>;

    /// Describe a pool, or `None` when the path is unknown
    async fn find_pool(&self, path: &DevicePath) -> Result<Option<PoolDescription>>;

    /// Redundancy characteristics of a device or pool
    async fn redundancy(&self, path: &DevicePath) -> Result<RedundancyProfile>;

    /// Create a volume group over the given devices
    async fn create_volume_group(
        &self,
        name: Option<&str>,
        devices: &[DevicePath],
        extent_size_bytes: Option<u64>,
    ) -> Result<PoolDescription>;

    /// Destroy a volume group
    async fn delete_volume_group(&self, pool: &DevicePath) -> Result<()>;

    /// Assemble a RAID array with the given level over the given devices
    async fn create_raid(
        &self,
        name: Option<&str>,
        level: RaidLevel,
        devices: &[DevicePath],
    ) -> Result<DeviceDescription>;

    /// Tear down a RAID array and erase member metadata
    async fn delete_raid(&self, device: &DevicePath) -> Result<()>;

    /// Allocate a logical volume inside a pool; returns its description
    /// with the size rounded to the pool's extent size
    async fn create_logical_volume(
        &self,
        pool: &DevicePath,
        name: Option<&str>,
        size_bytes: u64,
    ) -> Result<DeviceDescription>;

    /// Grow a logical volume; returns the size actually achieved
    async fn resize_logical_volume(&self, device: &DevicePath, size_bytes: u64) -> Result<u64>;
}

/// Shared handle to a backend
pub type StorageBackendRef = Arc<dyn StorageBackend>;

// =============================================================================
// Execution Context
// =============================================================================

/// Everything a deferred job action is allowed to touch.
///
/// Passed explicitly into each action so the engine carries no ambient
/// mutable globals.
pub struct ExecutionContext {
    pub backend: StorageBackendRef,
}

impl ExecutionContext {
    pub fn new(backend: StorageBackendRef) -> Arc<Self> {
        Arc::new(Self { backend })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_kind_display() {
        assert_eq!(format!("{}", DeviceKind::RaidArray), "RAID array");
        assert_eq!(format!("{}", DeviceKind::VolumeGroup), "volume group");
        assert_eq!(format!("{}", DeviceKind::Disk), "disk");
    }

    #[test]
    fn test_refs_serialize_transparently() {
        let path = DevicePath::from("/dev/sda");
        assert_eq!(serde_json::to_string(&path).unwrap(), "\"/dev/sda\"");

        let element = ElementRef::from("device:/dev/sda");
        assert_eq!(
            serde_json::to_string(&element).unwrap(),
            "\"device:/dev/sda\""
        );
    }
}
