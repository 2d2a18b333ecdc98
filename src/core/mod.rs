//! 活动模型生命周期

pub mod active;
pub mod manager;

pub use active::{ActiveInfo, ActiveModel, ModelSource, Provenance};
pub use manager::{ModelManager, RegistryBinding, RegistrySync, SwitchOutcome};
