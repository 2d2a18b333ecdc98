pub mod files;
pub mod logging;

pub use files::tail_lines;
pub use logging::init_logging;
