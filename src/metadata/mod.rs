// src/metadata/mod.rs

//! Unit metadata: capabilities, requirements, filters, units, and their
//! on-disk form

pub mod capability;
pub mod filter;
pub mod io;
pub mod unit;

pub use capability::{
    ATTR_VERSION, NAMESPACE_IU_ID, ProvidedCapability, Requirement, RequirementChange,
};
pub use filter::{Filter, FilterError};
pub use unit::{
    ArtifactKey, InstallableUnit, PROP_NAME, PROP_PATCH, PatchDetails, UnitBuilder, UnitKey,
    UpdateDescriptor,
};
