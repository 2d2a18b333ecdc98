pub mod checkpoints;
pub mod samples;

pub use checkpoints::{write_checkpoint, CheckpointRef, CheckpointStore};
pub use samples::{SampleStore, SavedSample};
