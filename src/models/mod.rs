pub mod checkpoint;
pub mod detection;

// Re-export commonly used types
pub use checkpoint::{
    CheckpointFile, LabelMap, LoadedCheckpoint, StateDict, Tensor, DEFAULT_TARGET_CLASSES,
};
pub use detection::{Detection, Prediction};
