//! Core domain types and trait boundaries

pub mod ports;

pub use ports::{
    DeviceDescription, DeviceKind, DevicePath, ElementRef, ExecutionContext, PoolDescription,
    StorageBackend, StorageBackendRef,
};
