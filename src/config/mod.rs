mod cluster;
mod training;

pub use cluster::ClusterConfig;
pub use training::{LauncherConfig, Precision, TrainerConfig, TrainingConfig};
