//! Storage Configuration Service
//!
//! The operation surface of the engine: declarative create/modify/delete
//! requests for volume groups, logical volumes and RAID arrays. Every
//! operation runs a synchronous validation tier first - parameter
//! checks, device lookups, goal matching - and only then schedules a job
//! carrying a deferred action. Validation failures never create a job;
//! execution failures never reach the caller directly, they land on the
//! job as its terminal error.
//!
//! Successful scheduling returns [`ReturnCode::JobStarted`], which is
//! distinguishable from every true terminal return code.

use crate::domain::{
    DeviceDescription, DeviceKind, DevicePath, ElementRef, ExecutionContext, PoolDescription,
    StorageBackendRef,
};
use crate::error::{Error, Result};
use crate::jobs::{Job, JobManager, JobOutcome, JobSpec, ReturnValue};
use crate::redundancy::{select_level, RaidLevel, RedundancyGoal, RedundancyProfile};
use futures::FutureExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Return Codes
// =============================================================================

/// Operation return codes rendered at the protocol boundary.
///
/// The discriminants are part of the wire contract and must not change.
/// `JobStarted` is the "parameters checked, result is asynchronous"
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ReturnCode {
    CompletedOk = 0,
    NotSupported = 1,
    Unknown = 2,
    Timeout = 3,
    Failed = 4,
    InvalidParameter = 5,
    InUse = 6,
    JobStarted = 4096,
    SizeNotSupported = 4097,
}

impl ReturnCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Element type accepted by the generic element operations
pub const ELEMENT_TYPE_STORAGE_EXTENT: u16 = 3;

/// What a successfully validated operation hands back to the caller
#[derive(Debug, Clone)]
pub struct MethodReturn {
    pub code: ReturnCode,
    /// Handle of the scheduled job; its terminal result carries the
    /// operation's real outcome
    pub job: Arc<Job>,
}

impl MethodReturn {
    fn started(job: Arc<Job>) -> Self {
        Self {
            code: ReturnCode::JobStarted,
            job,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Request to create a volume group or modify an existing one
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrModifyVgRequest {
    pub element_name: Option<String>,
    pub goal: Option<RedundancyGoal>,
    /// Devices the group is built from (or should consist of, on modify)
    pub in_extents: Vec<DevicePath>,
    /// Existing group to modify; absent means create
    pub pool: Option<DevicePath>,
    pub extent_size_bytes: Option<u64>,
}

/// Request for the generic storage-pool operation (delegates to VG)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrModifyStoragePoolRequest {
    pub element_name: Option<String>,
    pub goal: Option<RedundancyGoal>,
    pub in_pools: Vec<DevicePath>,
    pub in_extents: Vec<DevicePath>,
    pub pool: Option<DevicePath>,
    pub size_bytes: Option<u64>,
    pub extent_size_bytes: Option<u64>,
}

/// Request to create a RAID array with an explicit level or a goal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrModifyRaidRequest {
    pub element_name: Option<String>,
    /// Existing array to modify; absent means create
    pub the_element: Option<DevicePath>,
    pub goal: Option<RedundancyGoal>,
    pub level: Option<RaidLevel>,
    pub in_extents: Vec<DevicePath>,
}

/// Request for the generic element-from-elements operation (delegates to RAID)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrModifyElementFromElementsRequest {
    pub in_elements: Vec<DevicePath>,
    pub element_type: Option<u16>,
    pub element_name: Option<String>,
    pub the_element: Option<DevicePath>,
    pub goal: Option<RedundancyGoal>,
    pub size_bytes: Option<u64>,
}

/// Request to create or resize a logical volume
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrModifyLvRequest {
    pub element_name: Option<String>,
    pub goal: Option<RedundancyGoal>,
    /// Existing volume to modify; absent means create
    pub the_element: Option<DevicePath>,
    /// Pool to allocate from
    pub pool: Option<DevicePath>,
    pub size_bytes: Option<u64>,
}

/// Request for the generic element-from-pool operation (delegates to LV)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOrModifyElementFromStoragePoolRequest {
    pub element_name: Option<String>,
    pub goal: Option<RedundancyGoal>,
    pub the_element: Option<DevicePath>,
    pub pool: Option<DevicePath>,
    pub element_type: Option<u16>,
    pub size_bytes: Option<u64>,
}

/// Request to tear down a RAID array
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRaidRequest {
    pub the_element: DevicePath,
}

/// Request to delete a volume group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteVgRequest {
    pub pool: DevicePath,
}

/// Request for the generic pool deletion (delegates to VG)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteStoragePoolRequest {
    pub pool: DevicePath,
}

// =============================================================================
// Service
// =============================================================================

/// Accepts declarative storage requests, validates them and schedules
/// the jobs that carry them out.
pub struct StorageConfigurationService {
    jobs: Arc<JobManager>,
    backend: StorageBackendRef,
    /// Reference under which this service owns its jobs
    instance_ref: ElementRef,
}

impl StorageConfigurationService {
    pub fn new(jobs: Arc<JobManager>, instance_ref: ElementRef) -> Arc<Self> {
        let backend = jobs.context().backend.clone();
        Arc::new(Self {
            jobs,
            backend,
            instance_ref,
        })
    }

    pub fn job_manager(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    // =========================================================================
    // Volume Groups
    // =========================================================================

    /// Create a volume group from devices, or modify an existing one.
    pub async fn create_or_modify_vg(&self, req: CreateOrModifyVgRequest) -> Result<MethodReturn> {
        let input_arguments = args([
            ("ElementName", json!(req.element_name)),
            ("Goal", goal_value(&req.goal)),
            ("InExtents", json!(req.in_extents)),
            ("Pool", json!(req.pool)),
        ]);
        self.schedule_vg(req, input_arguments, "CreateOrModifyVG")
            .await
    }

    /// Generic pool operation; only volume groups can be created this way.
    pub async fn create_or_modify_storage_pool(
        &self,
        req: CreateOrModifyStoragePoolRequest,
    ) -> Result<MethodReturn> {
        if req.size_bytes.is_some() {
            return Err(Error::NotSupported("the Size parameter is not supported".into()));
        }
        if !req.in_pools.is_empty() {
            return Err(Error::NotSupported(
                "the InPools parameter is not supported".into(),
            ));
        }

        let input_arguments = args([
            ("ElementName", json!(req.element_name)),
            ("Goal", goal_value(&req.goal)),
            ("InExtents", json!(req.in_extents)),
            ("InPools", json!(req.in_pools)),
            ("Pool", json!(req.pool)),
            ("Size", json!(req.size_bytes)),
        ]);
        let vg_req = CreateOrModifyVgRequest {
            element_name: req.element_name,
            goal: req.goal,
            in_extents: req.in_extents,
            pool: req.pool,
            extent_size_bytes: req.extent_size_bytes,
        };
        self.schedule_vg(vg_req, input_arguments, "CreateOrModifyStoragePool")
            .await
    }

    async fn schedule_vg(
        &self,
        req: CreateOrModifyVgRequest,
        input_arguments: IndexMap<String, Value>,
        method_name: &str,
    ) -> Result<MethodReturn> {
        let pool = self.resolve_pool(req.pool.as_ref()).await?;
        let (devices, profiles) = self.resolve_extents(&req.in_extents).await?;

        // Devices vs goal: the goal must be achievable by plain
        // concatenation of the inputs.
        if !devices.is_empty() {
            if let Some(goal) = &req.goal {
                let combined = RedundancyProfile::combine(&profiles, None);
                goal.check_profile(&combined)
                    .map_err(|mismatch| Error::GoalUnsatisfied {
                        context: "the input devices' capabilities".into(),
                        mismatch,
                    })?;
            }
        }

        let mut name = req.element_name;
        if let (Some(pool), Some(requested)) = (&pool, &name) {
            if *requested == pool.name {
                // no rename is needed
                name = None;
            }
        }

        if pool.is_none() && devices.is_empty() {
            return Err(Error::InvalidParameter(
                "either a pool or input devices must be specified".into(),
            ));
        }

        let device_paths: Vec<DevicePath> = devices.iter().map(|d| d.path.clone()).collect();
        let affected: Vec<ElementRef> = devices.iter().map(|d| d.element_ref.clone()).collect();
        let extent_size = req.extent_size_bytes;

        let (description, job) = match pool {
            Some(pool) => {
                let description = format!("MODIFY VG {}", pool.path);
                let pool_path = pool.path.clone();
                let action_devices = device_paths.clone();
                let job = self.build_job(
                    &description,
                    method_name,
                    input_arguments,
                    affected,
                    Box::new(move |ctx| {
                        run_modify_vg(ctx, pool_path, action_devices, extent_size, name).boxed()
                    }),
                );
                (description, job)
            }
            None => {
                let description = format!(
                    "CREATE VG {} FROM {}",
                    name.as_deref().unwrap_or("(unnamed)"),
                    join_paths(&device_paths)
                );
                let action_devices = device_paths.clone();
                let job = self.build_job(
                    &description,
                    method_name,
                    input_arguments,
                    affected,
                    Box::new(move |ctx| {
                        run_create_vg(ctx, name, action_devices, extent_size).boxed()
                    }),
                );
                (description, job)
            }
        };

        let handle = self.jobs.add_job(job)?;
        info!(job = handle.name(), method = method_name, %description, "job scheduled");
        Ok(MethodReturn::started(handle))
    }

    /// Delete a volume group.
    pub async fn delete_vg(&self, req: DeleteVgRequest) -> Result<MethodReturn> {
        let input_arguments = args([("Pool", json!(req.pool))]);
        self.schedule_delete_vg(req, input_arguments, "DeleteVG").await
    }

    /// Generic pool deletion; delegates to the volume-group deletion.
    pub async fn delete_storage_pool(&self, req: DeleteStoragePoolRequest) -> Result<MethodReturn> {
        let input_arguments = args([("Pool", json!(req.pool))]);
        self.schedule_delete_vg(
            DeleteVgRequest { pool: req.pool },
            input_arguments,
            "DeleteStoragePool",
        )
        .await
    }

    async fn schedule_delete_vg(
        &self,
        req: DeleteVgRequest,
        input_arguments: IndexMap<String, Value>,
        method_name: &str,
    ) -> Result<MethodReturn> {
        let pool = self
            .backend
            .find_pool(&req.pool)
            .await?
            .ok_or_else(|| Error::DeviceNotFound {
                path: req.pool.to_string(),
            })?;

        let description = format!("DELETE VG {}", pool.path);
        let pool_path = pool.path.clone();
        let job = self.build_job(
            &description,
            method_name,
            input_arguments,
            vec![pool.element_ref.clone()],
            Box::new(move |ctx| run_delete_vg(ctx, pool_path).boxed()),
        );

        let handle = self.jobs.add_job(job)?;
        info!(job = handle.name(), method = method_name, %description, "job scheduled");
        Ok(MethodReturn::started(handle))
    }

    // =========================================================================
    // RAID Arrays
    // =========================================================================

    /// Create a RAID array with an explicit level or a redundancy goal.
    pub async fn create_or_modify_raid(
        &self,
        req: CreateOrModifyRaidRequest,
    ) -> Result<MethodReturn> {
        let input_arguments = args([
            ("ElementName", json!(req.element_name)),
            ("TheElement", json!(req.the_element)),
            ("Goal", goal_value(&req.goal)),
            ("Level", json!(req.level.map(RaidLevel::as_u16))),
            ("InExtents", json!(req.in_extents)),
        ]);
        self.schedule_raid(req, input_arguments, "CreateOrModifyRAID")
            .await
    }

    /// Generic element operation; delegates to the RAID operation.
    pub async fn create_or_modify_element_from_elements(
        &self,
        req: CreateOrModifyElementFromElementsRequest,
    ) -> Result<MethodReturn> {
        if req.size_bytes.is_some() {
            return Err(Error::NotSupported("the Size parameter is not supported".into()));
        }
        if let Some(element_type) = req.element_type {
            if element_type != ELEMENT_TYPE_STORAGE_EXTENT {
                return Err(Error::NotSupported(format!(
                    "the ElementType parameter must be storage extent ({ELEMENT_TYPE_STORAGE_EXTENT})"
                )));
            }
        }

        let input_arguments = args([
            ("InElements", json!(req.in_elements)),
            ("ElementType", json!(req.element_type)),
            ("ElementName", json!(req.element_name)),
            ("TheElement", json!(req.the_element)),
            ("Goal", goal_value(&req.goal)),
            ("Size", json!(req.size_bytes)),
        ]);
        let raid_req = CreateOrModifyRaidRequest {
            element_name: req.element_name,
            the_element: req.the_element,
            goal: req.goal,
            level: None,
            in_extents: req.in_elements,
        };
        self.schedule_raid(raid_req, input_arguments, "CreateOrModifyElementFromElements")
            .await
    }

    async fn schedule_raid(
        &self,
        req: CreateOrModifyRaidRequest,
        input_arguments: IndexMap<String, Value>,
        method_name: &str,
    ) -> Result<MethodReturn> {
        if req.goal.is_some() && req.level.is_some() {
            return Err(Error::InvalidParameter(
                "only one of Level and Goal may be used".into(),
            ));
        }

        let raid = match &req.the_element {
            Some(path) => Some(self.resolve_device(path, DeviceKind::RaidArray).await?),
            None => None,
        };
        let (devices, profiles) = self.resolve_extents(&req.in_extents).await?;

        if raid.is_none() && devices.is_empty() {
            return Err(Error::InvalidParameter(
                "either TheElement or InExtents must be specified".into(),
            ));
        }
        if raid.is_some() {
            return Err(Error::NotSupported("RAID modification is not supported yet".into()));
        }

        let level = match req.level {
            Some(level) => level,
            None => {
                let goal = req.goal.as_ref().ok_or_else(|| {
                    Error::InvalidParameter("either a Level or a Goal must be specified".into())
                })?;
                let level = select_level(&profiles, goal, &RaidLevel::ALL)
                    .ok_or(Error::NoMatchingLevel)?;
                debug!(%level, "redundancy goal resolved to level");
                level
            }
        };
        level.check_device_count(devices.len())?;

        let device_paths: Vec<DevicePath> = devices.iter().map(|d| d.path.clone()).collect();
        let affected: Vec<ElementRef> = devices.iter().map(|d| d.element_ref.clone()).collect();
        let name = req.element_name;

        let description = format!("CREATE {} ON {}", level, join_paths(&device_paths));
        let job = self.build_job(
            &description,
            method_name,
            input_arguments,
            affected,
            Box::new(move |ctx| run_create_raid(ctx, name, level, device_paths).boxed()),
        );

        let handle = self.jobs.add_job(job)?;
        info!(job = handle.name(), method = method_name, %description, "job scheduled");
        Ok(MethodReturn::started(handle))
    }

    /// Tear down a RAID array and erase its members' metadata.
    pub async fn delete_raid(&self, req: DeleteRaidRequest) -> Result<MethodReturn> {
        let device = self
            .resolve_device(&req.the_element, DeviceKind::RaidArray)
            .await?;

        let input_arguments = args([("TheElement", json!(req.the_element))]);
        let description = format!("DELETE RAID {}", device.path);
        let device_path = device.path.clone();
        let job = self.build_job(
            &description,
            "DeleteRAID",
            input_arguments,
            vec![device.element_ref.clone()],
            Box::new(move |ctx| run_delete_raid(ctx, device_path).boxed()),
        );

        let handle = self.jobs.add_job(job)?;
        info!(job = handle.name(), %description, "job scheduled");
        Ok(MethodReturn::started(handle))
    }

    // =========================================================================
    // Logical Volumes
    // =========================================================================

    /// Create a logical volume in a pool, or resize an existing one.
    pub async fn create_or_modify_lv(&self, req: CreateOrModifyLvRequest) -> Result<MethodReturn> {
        let input_arguments = args([
            ("ElementName", json!(req.element_name)),
            ("Goal", goal_value(&req.goal)),
            ("TheElement", json!(req.the_element)),
            ("InPool", json!(req.pool)),
            ("Size", json!(req.size_bytes)),
        ]);
        self.schedule_lv(req, input_arguments, "CreateOrModifyLV").await
    }

    /// Generic element-from-pool operation; delegates to the LV operation.
    pub async fn create_or_modify_element_from_storage_pool(
        &self,
        req: CreateOrModifyElementFromStoragePoolRequest,
    ) -> Result<MethodReturn> {
        if let Some(element_type) = req.element_type {
            if element_type != ELEMENT_TYPE_STORAGE_EXTENT {
                return Err(Error::InvalidParameter(format!(
                    "the only supported ElementType is storage extent ({ELEMENT_TYPE_STORAGE_EXTENT})"
                )));
            }
        }

        let input_arguments = args([
            ("ElementName", json!(req.element_name)),
            ("Goal", goal_value(&req.goal)),
            ("TheElement", json!(req.the_element)),
            ("InPool", json!(req.pool)),
            ("ElementType", json!(req.element_type)),
            ("Size", json!(req.size_bytes)),
        ]);
        let lv_req = CreateOrModifyLvRequest {
            element_name: req.element_name,
            goal: req.goal,
            the_element: req.the_element,
            pool: req.pool,
            size_bytes: req.size_bytes,
        };
        self.schedule_lv(lv_req, input_arguments, "CreateOrModifyElementFromStoragePool")
            .await
    }

    async fn schedule_lv(
        &self,
        req: CreateOrModifyLvRequest,
        input_arguments: IndexMap<String, Value>,
        method_name: &str,
    ) -> Result<MethodReturn> {
        let device = match &req.the_element {
            Some(path) => Some(self.resolve_device(path, DeviceKind::LogicalVolume).await?),
            None => None,
        };
        let pool = self.resolve_pool(req.pool.as_ref()).await?;

        // Resize checks: shrinking is refused, resizing to the current
        // size is a no-op.
        let mut size = req.size_bytes;
        if let (Some(requested), Some(device)) = (size, &device) {
            if requested < device.size_bytes {
                return Err(Error::NotSupported(
                    "shrinking logical volumes is not supported".into(),
                ));
            }
            if requested == device.size_bytes {
                size = None;
            }
        }

        let mut name = req.element_name;
        if let (Some(device), Some(requested)) = (&device, &name) {
            if *requested == device.name {
                // no rename is needed
                name = None;
            }
        }

        // Pool vs goal: the volume inherits the pool's redundancy.
        if let (Some(goal), Some(pool)) = (&req.goal, &pool) {
            let profile = self.backend.redundancy(&pool.path).await?;
            goal.check_profile(&profile)
                .map_err(|mismatch| Error::GoalUnsatisfied {
                    context: "the pool's capabilities".into(),
                    mismatch,
                })?;
        }

        // Pool vs element: moving a volume between pools is not a thing.
        if let (Some(pool), Some(device)) = (&pool, &device) {
            if device.pool.as_ref() != Some(&pool.path) {
                return Err(Error::NotSupported(
                    "moving a logical volume to another pool is not supported".into(),
                ));
            }
        }

        if device.is_none() && pool.is_none() {
            return Err(Error::NotSupported(
                "either a pool or an existing volume must be specified".into(),
            ));
        }

        let (description, job) = match device {
            Some(device) => {
                let description = format!("MODIFY LV {}", device.path);
                let device_path = device.path.clone();
                let job = self.build_job(
                    &description,
                    method_name,
                    input_arguments,
                    vec![device.element_ref.clone()],
                    Box::new(move |ctx| run_modify_lv(ctx, device_path, name, size).boxed()),
                );
                (description, job)
            }
            None => {
                let size = size.ok_or_else(|| {
                    Error::InvalidParameter(
                        "the size must be set when creating a logical volume".into(),
                    )
                })?;
                // resolve_pool above guarantees the pool exists here
                let pool = pool.ok_or_else(|| {
                    Error::InvalidParameter("a pool is required to create a logical volume".into())
                })?;
                let description = format!(
                    "CREATE LV {} IN {}",
                    name.as_deref().unwrap_or("(unnamed)"),
                    pool.path
                );
                let pool_path = pool.path.clone();
                let job = self.build_job(
                    &description,
                    method_name,
                    input_arguments,
                    vec![pool.element_ref.clone()],
                    Box::new(move |ctx| run_create_lv(ctx, pool_path, name, size).boxed()),
                );
                (description, job)
            }
        };

        let handle = self.jobs.add_job(job)?;
        info!(job = handle.name(), method = method_name, %description, "job scheduled");
        Ok(MethodReturn::started(handle))
    }

    // =========================================================================
    // Shared validation helpers
    // =========================================================================

    async fn resolve_pool(&self, path: Option<&DevicePath>) -> Result<Option<PoolDescription>> {
        match path {
            Some(path) => {
                let pool =
                    self.backend
                        .find_pool(path)
                        .await?
                        .ok_or_else(|| Error::DeviceNotFound {
                            path: path.to_string(),
                        })?;
                Ok(Some(pool))
            }
            None => Ok(None),
        }
    }

    async fn resolve_device(
        &self,
        path: &DevicePath,
        expected: DeviceKind,
    ) -> Result<DeviceDescription> {
        let device = self
            .backend
            .find_device(path)
            .await?
            .ok_or_else(|| Error::DeviceNotFound {
                path: path.to_string(),
            })?;
        if device.kind != expected {
            return Err(Error::WrongDeviceKind {
                path: path.to_string(),
                expected: expected.to_string(),
            });
        }
        Ok(device)
    }

    /// Look up every extent and its redundancy profile
    async fn resolve_extents(
        &self,
        paths: &[DevicePath],
    ) -> Result<(Vec<DeviceDescription>, Vec<RedundancyProfile>)> {
        let mut devices = Vec::with_capacity(paths.len());
        let mut profiles = Vec::with_capacity(paths.len());
        for path in paths {
            let device =
                self.backend
                    .find_device(path)
                    .await?
                    .ok_or_else(|| Error::DeviceNotFound {
                        path: path.to_string(),
                    })?;
            profiles.push(self.backend.redundancy(path).await?);
            devices.push(device);
        }
        Ok((devices, profiles))
    }

    fn build_job(
        &self,
        description: &str,
        method_name: &str,
        input_arguments: IndexMap<String, Value>,
        affected_elements: Vec<ElementRef>,
        action: crate::jobs::JobAction,
    ) -> Job {
        let mut job = Job::new(
            self.jobs.next_job_name(),
            JobSpec {
                description: description.to_string(),
                method_name: method_name.to_string(),
                input_arguments,
                affected_elements,
                owning_element: self.instance_ref.clone(),
            },
        );
        job.set_action(action);
        job
    }
}

// =============================================================================
// Deferred actions
// =============================================================================
//
// Each action re-resolves its devices by path: the snapshot taken at
// validation time may be stale by the time a worker runs the job.

async fn run_create_vg(
    ctx: Arc<ExecutionContext>,
    name: Option<String>,
    devices: Vec<DevicePath>,
    extent_size_bytes: Option<u64>,
) -> Result<JobOutcome> {
    ensure_devices_exist(&ctx, &devices).await?;
    let pool = ctx
        .backend
        .create_volume_group(name.as_deref(), &devices, extent_size_bytes)
        .await?;
    Ok(
        JobOutcome::new(ReturnValue::Uint32(ReturnCode::CompletedOk.as_u32()))
            .with_output("Pool", json!(pool.element_ref))
            .with_output("Size", json!(pool.size_bytes))
            .with_affected(pool.element_ref),
    )
}

async fn run_modify_vg(
    ctx: Arc<ExecutionContext>,
    pool_path: DevicePath,
    devices: Vec<DevicePath>,
    extent_size_bytes: Option<u64>,
    name: Option<String>,
) -> Result<JobOutcome> {
    let pool = ctx
        .backend
        .find_pool(&pool_path)
        .await?
        .ok_or_else(|| Error::DeviceDisappeared {
            path: pool_path.to_string(),
        })?;
    ensure_devices_exist(&ctx, &devices).await?;

    if name.is_some() {
        return Err(Error::NotSupported(
            "volume group rename is not yet supported".into(),
        ));
    }
    if let Some(extent_size) = extent_size_bytes {
        if extent_size != pool.extent_size_bytes {
            return Err(Error::NotSupported(
                "changing the extent size is not supported".into(),
            ));
        }
    }

    if !devices.is_empty() {
        if devices.iter().any(|d| !pool.members.contains(d)) {
            return Err(Error::NotSupported(
                "adding devices to a volume group is not yet supported".into(),
            ));
        }
        if pool.members.iter().any(|m| !devices.contains(m)) {
            return Err(Error::NotSupported(
                "removing devices from a volume group is not yet supported".into(),
            ));
        }
    }

    Ok(
        JobOutcome::new(ReturnValue::Uint32(ReturnCode::CompletedOk.as_u32()))
            .with_affected(pool.element_ref),
    )
}

async fn run_delete_vg(ctx: Arc<ExecutionContext>, pool_path: DevicePath) -> Result<JobOutcome> {
    let pool = ctx
        .backend
        .find_pool(&pool_path)
        .await?
        .ok_or_else(|| Error::DeviceDisappeared {
            path: pool_path.to_string(),
        })?;
    ctx.backend.delete_volume_group(&pool.path).await?;
    Ok(JobOutcome::new(ReturnValue::Uint32(
        ReturnCode::CompletedOk.as_u32(),
    )))
}

async fn run_create_raid(
    ctx: Arc<ExecutionContext>,
    name: Option<String>,
    level: RaidLevel,
    devices: Vec<DevicePath>,
) -> Result<JobOutcome> {
    ensure_devices_exist(&ctx, &devices).await?;
    let raid = ctx
        .backend
        .create_raid(name.as_deref(), level, &devices)
        .await?;
    Ok(
        JobOutcome::new(ReturnValue::Uint32(ReturnCode::CompletedOk.as_u32()))
            .with_output("TheElement", json!(raid.element_ref))
            .with_output("Size", json!(raid.size_bytes))
            .with_affected(raid.element_ref),
    )
}

async fn run_delete_raid(ctx: Arc<ExecutionContext>, device_path: DevicePath) -> Result<JobOutcome> {
    let device = ctx
        .backend
        .find_device(&device_path)
        .await?
        .ok_or_else(|| Error::DeviceDisappeared {
            path: device_path.to_string(),
        })?;
    if device.kind != DeviceKind::RaidArray {
        return Err(Error::WrongDeviceKind {
            path: device_path.to_string(),
            expected: DeviceKind::RaidArray.to_string(),
        });
    }
    ctx.backend.delete_raid(&device.path).await?;
    Ok(JobOutcome::new(ReturnValue::Uint32(
        ReturnCode::CompletedOk.as_u32(),
    )))
}

async fn run_create_lv(
    ctx: Arc<ExecutionContext>,
    pool_path: DevicePath,
    name: Option<String>,
    size_bytes: u64,
) -> Result<JobOutcome> {
    let pool = ctx
        .backend
        .find_pool(&pool_path)
        .await?
        .ok_or_else(|| Error::DeviceDisappeared {
            path: pool_path.to_string(),
        })?;
    let volume = ctx
        .backend
        .create_logical_volume(&pool.path, name.as_deref(), size_bytes)
        .await?;
    Ok(
        JobOutcome::new(ReturnValue::Uint32(ReturnCode::CompletedOk.as_u32()))
            .with_output("TheElement", json!(volume.element_ref))
            .with_output("Size", json!(volume.size_bytes))
            .with_affected(volume.element_ref),
    )
}

async fn run_modify_lv(
    ctx: Arc<ExecutionContext>,
    device_path: DevicePath,
    name: Option<String>,
    size_bytes: Option<u64>,
) -> Result<JobOutcome> {
    let device = ctx
        .backend
        .find_device(&device_path)
        .await?
        .ok_or_else(|| Error::DeviceDisappeared {
            path: device_path.to_string(),
        })?;

    if name.is_some() {
        return Err(Error::NotSupported(
            "renaming logical volumes is not yet supported".into(),
        ));
    }

    let achieved = match size_bytes {
        Some(size) => ctx.backend.resize_logical_volume(&device.path, size).await?,
        None => device.size_bytes,
    };

    Ok(
        JobOutcome::new(ReturnValue::Uint32(ReturnCode::CompletedOk.as_u32()))
            .with_output("TheElement", json!(device.element_ref))
            .with_output("Size", json!(achieved))
            .with_affected(device.element_ref),
    )
}

async fn ensure_devices_exist(ctx: &Arc<ExecutionContext>, devices: &[DevicePath]) -> Result<()> {
    for path in devices {
        if ctx.backend.find_device(path).await?.is_none() {
            return Err(Error::DeviceDisappeared {
                path: path.to_string(),
            });
        }
    }
    Ok(())
}

fn args<const N: usize>(entries: [(&str, Value); N]) -> IndexMap<String, Value> {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

fn goal_value(goal: &Option<RedundancyGoal>) -> Value {
    match goal {
        Some(goal) => serde_json::to_value(goal).unwrap_or(Value::Null),
        None => Value::Null,
    }
}

fn join_paths(paths: &[DevicePath]) -> String {
    paths
        .iter()
        .map(DevicePath::as_str)
        .collect::<Vec<_>>()
        .join("+")
}
