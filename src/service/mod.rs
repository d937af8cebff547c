//! Storage configuration operations

pub mod config_service;

pub use config_service::{
    CreateOrModifyElementFromElementsRequest, CreateOrModifyElementFromStoragePoolRequest,
    CreateOrModifyLvRequest, CreateOrModifyRaidRequest, CreateOrModifyStoragePoolRequest,
    CreateOrModifyVgRequest, DeleteRaidRequest, DeleteStoragePoolRequest, DeleteVgRequest,
    MethodReturn, ReturnCode, StorageConfigurationService, ELEMENT_TYPE_STORAGE_EXTENT,
};
