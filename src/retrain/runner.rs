use crate::api::error::{RetrainError, StorageError};
use crate::config::RetrainConfig;
use crate::Result;
use serde::Serialize;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;

/// 传给外部任务的进度日志路径环境变量
pub const PROGRESS_LOG_ENV: &str = "RETRAIN_PROGRESS_LOG";

/// 任务结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RetrainStatus {
    Done,
    Error,
}

/// 一次重训练的报告
#[derive(Debug, Clone, Serialize)]
pub struct RetrainReport {
    pub status: RetrainStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub command: String,
    pub duration_ms: u64,
}

/// 重训练任务启动器
///
/// 同一时间只允许一个任务运行，第二个请求返回 [`RetrainError::Busy`]。
pub struct RetrainRunner {
    config: RetrainConfig,
    running: Mutex<()>,
}

impl RetrainRunner {
    pub fn new(config: RetrainConfig) -> Self {
        Self {
            config,
            running: Mutex::new(()),
        }
    }

    /// 进度日志路径
    pub fn progress_log(&self) -> &std::path::Path {
        &self.config.progress_log
    }

    fn command_line(&self) -> String {
        std::iter::once(self.config.program.as_str())
            .chain(self.config.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 运行重训练任务直到结束
    ///
    /// 外部任务的失败体现在报告的 `status` 中；只有忙碌或进度日志无法写入时返回错误。
    pub async fn run(&self) -> Result<RetrainReport> {
        let _guard = self.running.try_lock().map_err(|_| RetrainError::Busy)?;

        self.write_start_marker().await?;
        let command = self.command_line();
        tracing::info!(command = %command, "Retrain started");

        let started = Instant::now();
        let outcome = self.execute().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let report = match outcome {
            Ok(()) => RetrainReport {
                status: RetrainStatus::Done,
                error: None,
                exit_code: Some(0),
                command,
                duration_ms,
            },
            Err(e) => {
                let exit_code = match &e {
                    RetrainError::ExternalJobFailure { code } => *code,
                    _ => None,
                };
                RetrainReport {
                    status: RetrainStatus::Error,
                    error: Some(e.to_string()),
                    exit_code,
                    command,
                    duration_ms,
                }
            }
        };

        tracing::info!(status = ?report.status, duration_ms, "Retrain finished");
        Ok(report)
    }

    /// 清空进度日志并写入开始标记
    async fn write_start_marker(&self) -> Result<()> {
        let path = &self.config.progress_log;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::WriteFailed(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let marker = format!(
            "[{}] === RETRAIN START ===\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        tokio::fs::write(path, marker).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to write {}: {}", path.display(), e)).into()
        })
    }

    async fn execute(&self) -> std::result::Result<(), RetrainError> {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .current_dir(&self.config.working_dir)
            .env(PROGRESS_LOG_ENV, &self.config.progress_log)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| RetrainError::Timeout(self.config.timeout_secs))?
            .map_err(|e| RetrainError::Launch(format!("{}: {}", self.config.program, e)))?;

        if output.status.success() {
            return Ok(());
        }

        tracing::error!(
            code = ?output.status.code(),
            stderr = %String::from_utf8_lossy(&output.stderr),
            stdout = %String::from_utf8_lossy(&output.stdout),
            "Retrain job failed"
        );
        Err(RetrainError::ExternalJobFailure {
            code: output.status.code(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn runner(temp_dir: &TempDir, script: &str, timeout_secs: u64) -> RetrainRunner {
        RetrainRunner::new(RetrainConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: temp_dir.path().to_path_buf(),
            timeout_secs,
            progress_log: temp_dir.path().join("logs").join("retrain_progress.log"),
        })
    }

    fn progress(temp_dir: &TempDir) -> String {
        std::fs::read_to_string(temp_dir.path().join("logs").join("retrain_progress.log")).unwrap()
    }

    #[tokio::test]
    async fn test_successful_job() {
        let temp_dir = TempDir::new().unwrap();
        let runner = runner(&temp_dir, "echo epoch 1 >> \"$RETRAIN_PROGRESS_LOG\"", 30);
        std::fs::create_dir_all(temp_dir.path().join("logs")).unwrap();
        std::fs::write(temp_dir.path().join("logs").join("retrain_progress.log"), "stale\n").unwrap();

        let report = runner.run().await.unwrap();
        assert_eq!(report.status, RetrainStatus::Done);
        assert_eq!(report.exit_code, Some(0));

        let log = progress(&temp_dir);
        assert!(!log.contains("stale"));
        assert!(log.starts_with('['));
        assert!(log.contains("=== RETRAIN START ==="));
        assert!(log.contains("epoch 1"));
    }

    #[tokio::test]
    async fn test_failing_job() {
        let temp_dir = TempDir::new().unwrap();
        let report = runner(&temp_dir, "echo boom >&2; exit 3", 30).run().await.unwrap();
        assert_eq!(report.status, RetrainStatus::Error);
        assert_eq!(report.exit_code, Some(3));

        // 失败输出不写入进度日志
        assert!(!progress(&temp_dir).contains("boom"));
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let temp_dir = TempDir::new().unwrap();
        let runner = RetrainRunner::new(RetrainConfig {
            program: "/definitely/not/a/program".to_string(),
            args: vec![],
            working_dir: PathBuf::from("."),
            timeout_secs: 5,
            progress_log: temp_dir.path().join("progress.log"),
        });
        let report = runner.run().await.unwrap();
        assert_eq!(report.status, RetrainStatus::Error);
        assert!(report.exit_code.is_none());
    }

    #[tokio::test]
    async fn test_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let report = runner(&temp_dir, "sleep 5", 1).run().await.unwrap();
        assert_eq!(report.status, RetrainStatus::Error);
        assert!(report.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_second_run_is_busy() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(runner(&temp_dir, "sleep 2", 30));

        let first = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run().await }
        });
        tokio::time::sleep(Duration::from_millis(300)).await;

        let err = runner.run().await.unwrap_err();
        assert!(matches!(
            err,
            crate::DetectForgeError::Retrain(RetrainError::Busy)
        ));
        assert_eq!(first.await.unwrap().unwrap().status, RetrainStatus::Done);
    }
}
