pub mod health;
pub mod logs;
pub mod models;
pub mod predict;
pub mod retrain;
pub mod samples;

pub use health::{health, root};
pub use logs::logs;
pub use models::{list_models, reload_model};
pub use predict::{predict, predict_multi};
pub use retrain::{retrain, retrain_progress};
pub use samples::new_data;
