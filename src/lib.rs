pub mod config;
pub mod errors;
pub mod invocation;
pub mod launch;
pub mod logging;

pub use config::{ClusterConfig, LauncherConfig, Precision, TrainerConfig, TrainingConfig};
pub use errors::{LaunchError, Result};
pub use invocation::Invocation;
pub use launch::{LaunchOutcome, Launcher};
