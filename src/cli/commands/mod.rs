pub mod list;
pub mod predict;
pub mod pull;
pub mod serve;

pub use list::list;
pub use predict::predict;
pub use pull::pull;
pub use serve::serve;
