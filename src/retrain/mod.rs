//! 重训练触发
//!
//! 重训练本身是外部批处理任务；这里只负责启动、计时与记录结果。

pub mod runner;

pub use runner::{RetrainReport, RetrainRunner, RetrainStatus};
