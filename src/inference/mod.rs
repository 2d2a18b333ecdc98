pub mod backend;
pub mod backends;
pub mod decode;
pub mod postprocess;

// Re-export commonly used types
pub use backend::{BackendRegistry, DetectionBackend, Detector, RawDetections};
pub use decode::decode_rgb;
pub use postprocess::{postprocess, MAX_DETECTIONS};
