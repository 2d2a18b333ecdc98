//! 具体后端实现
//!
//! 包含各种检测后端的具体实现。

pub mod region_head;

// Re-export commonly used types
pub use region_head::{RegionHeadBackend, RegionHeadDetector, RegionHeadWeights};
