//! Blockplane - Storage Configuration Job Engine
//!
//! An asynchronous configuration-job engine and storage-redundancy
//! constraint resolver for a storage management service. Declarative
//! requests (create a RAID with a redundancy goal, create a volume
//! group, resize a logical volume) are validated against device
//! capabilities, executed off the caller's path by a bounded worker
//! pool, and reported as typed, inspectable job results.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                 StorageConfigurationService                        │
//! │   validate parameters ─▶ resolve redundancy ─▶ schedule job        │
//! ├──────────────────────────┬─────────────────────────────────────────┤
//! │   Redundancy Resolver    │              Job Engine                 │
//! │  ┌────────────────────┐  │  ┌───────────┐      ┌────────────────┐  │
//! │  │ RedundancyProfile  │  │  │ JobManager│─────▶│ worker pool    │  │
//! │  │ RedundancyGoal     │  │  │ FIFO queue│      │ (fixed size)   │  │
//! │  │ select_level()     │  │  └───────────┘      └───────┬────────┘  │
//! │  └────────────────────┘  │                             │           │
//! ├──────────────────────────┴─────────────────────────────┼───────────┤
//! │                    StorageBackend port                 ▼           │
//! │        (partitioning / LVM / RAID assembly - external)             │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`redundancy`]: profiles, goals and RAID level selection
//! - [`jobs`]: the job state machine and the worker pool
//! - [`service`]: the declarative operation surface
//! - [`domain`]: ports to the storage-manipulation collaborator
//! - [`error`]: error types and protocol encodings

pub mod domain;
pub mod error;
pub mod jobs;
pub mod redundancy;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use domain::{
    DeviceDescription, DeviceKind, DevicePath, ElementRef, ExecutionContext, PoolDescription,
    StorageBackend, StorageBackendRef,
};

pub use error::{Error, ErrorCode, Result};

pub use jobs::{
    Job, JobError, JobManager, JobManagerConfig, JobManagerStatsSnapshot, JobOutcome, JobResult,
    JobSnapshot, JobSpec, JobState, ReturnValue,
};

pub use redundancy::{
    select_level, Dimension, GoalMismatch, GoalRange, ParityLayout, RaidLevel, RedundancyGoal,
    RedundancyProfile,
};

pub use service::{
    CreateOrModifyElementFromElementsRequest, CreateOrModifyElementFromStoragePoolRequest,
    CreateOrModifyLvRequest, CreateOrModifyRaidRequest, CreateOrModifyStoragePoolRequest,
    CreateOrModifyVgRequest, DeleteRaidRequest, DeleteStoragePoolRequest, DeleteVgRequest,
    MethodReturn, ReturnCode, StorageConfigurationService,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
