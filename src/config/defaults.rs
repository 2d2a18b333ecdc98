// 默认配置常量

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024; // 32MB

pub const DEFAULT_CHECKPOINT_DIR: &str = "./models/local_checkpoints";
pub const DEFAULT_CHECKPOINT_PREFIX: &str = "best_";
pub const DEFAULT_CHECKPOINT_EXTENSION: &str = "pt";
pub const DEFAULT_SAMPLES_DIR: &str = "./data/new_data";

pub const DEFAULT_TRACKING_URI: &str = "http://127.0.0.1:5000";
pub const DEFAULT_MANIFEST_PATH: &str = "./registry/registry.toml";
pub const DEFAULT_ARTIFACT_ROOT: &str = "./registry/artifacts";
pub const DEFAULT_REGISTERED_MODEL: &str = "frcnn_coco_cpu_person_car_airplane";
pub const DEFAULT_STAGE: &str = "Production";
pub const DEFAULT_REGISTRY_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_BACKEND: &str = "region-head";
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

pub const DEFAULT_RETRAIN_PROGRAM: &str = "python";
pub const DEFAULT_RETRAIN_TIMEOUT_SECS: u64 = 86_400;
pub const DEFAULT_PROGRESS_LOG: &str = "./logs/retrain_progress.log";

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_FORMAT: &str = "compact";
pub const DEFAULT_APP_LOG: &str = "./logs/app.log";

/// 默认重训练命令参数（以 nbconvert 执行增量训练 notebook）
pub fn default_retrain_args() -> Vec<String> {
    [
        "-m",
        "nbconvert",
        "--to",
        "notebook",
        "--execute",
        "--ExecutePreprocessor.timeout=86400",
        "--output",
        "notebooks/_last_run_05.ipynb",
        "notebooks/05_continual_retrain_new_data.ipynb",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
