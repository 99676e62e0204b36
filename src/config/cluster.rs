use crate::errors::{LaunchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Cluster parameters resolved from the process environment.
///
/// Each field is read once at launch time from the corresponding environment
/// variable; absent or empty variables fall back to the documented default.
/// The resolved set is immutable for the lifetime of the launch.
///
/// | Variable      | Field             | Default     |
/// |---------------|-------------------|-------------|
/// | `RANK`        | `rank`            | 0           |
/// | `WORLD_SIZE`  | `world_size`      | 1           |
/// | `MASTER_ADDR` | `master_addr`     | 127.0.0.1   |
/// | `MASTER_PORT` | `master_port`     | 9010        |
/// | `TASK_TAG`    | `task_tag`        | "0000"      |
/// | `BS`          | `batch_size`      | 1           |
/// | `SEQLEN`      | `sequence_length` | 4096        |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Zero-based index of this node among all cooperating nodes
    pub rank: u32,

    /// Total number of cooperating nodes in the job
    pub world_size: u32,

    /// Network address of the rendezvous master
    pub master_addr: String,

    /// TCP port of the rendezvous master
    pub master_port: u16,

    /// Opaque label, used only for naming output artifacts
    pub task_tag: String,

    /// Per-device training batch size
    pub batch_size: u32,

    /// Training sequence (block) length in tokens
    pub sequence_length: u32,
}

impl ClusterConfig {
    /// Resolve the cluster configuration from a variable lookup.
    ///
    /// `lookup` maps a variable name to its value, if set. Absent or empty
    /// values substitute the documented default; malformed numeric values
    /// fail with a configuration error before anything is spawned.
    pub fn resolve<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = ClusterConfig {
            rank: resolve_numeric(&lookup, "RANK", 0)?,
            world_size: resolve_numeric(&lookup, "WORLD_SIZE", 1)?,
            master_addr: resolve_string(&lookup, "MASTER_ADDR", "127.0.0.1"),
            master_port: resolve_numeric(&lookup, "MASTER_PORT", 9010)?,
            task_tag: resolve_string(&lookup, "TASK_TAG", "0000"),
            batch_size: resolve_numeric(&lookup, "BS", 1)?,
            sequence_length: resolve_numeric(&lookup, "SEQLEN", 4096)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Resolve from the real process environment.
    pub fn from_env() -> Result<Self> {
        Self::resolve(|name| std::env::var(name).ok())
    }

    /// Validate resolved values against their documented constraints.
    fn validate(&self) -> Result<()> {
        if self.world_size == 0 {
            return Err(LaunchError::Config(
                "WORLD_SIZE must be at least 1".into(),
            ));
        }

        if self.rank >= self.world_size {
            return Err(LaunchError::Config(format!(
                "RANK {} out of range for WORLD_SIZE {}",
                self.rank, self.world_size
            )));
        }

        if self.master_addr.is_empty() {
            return Err(LaunchError::Config("MASTER_ADDR must not be empty".into()));
        }

        if self.master_port == 0 {
            return Err(LaunchError::Config(
                "MASTER_PORT must be a valid TCP port".into(),
            ));
        }

        if self.batch_size == 0 {
            return Err(LaunchError::Config("BS must be at least 1".into()));
        }

        if self.sequence_length == 0 {
            return Err(LaunchError::Config("SEQLEN must be at least 1".into()));
        }

        Ok(())
    }
}

fn resolve_string<F>(lookup: &F, name: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

fn resolve_numeric<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(value) if !value.is_empty() => value.parse::<T>().map_err(|e| {
            LaunchError::Config(format!("{} must be a number, got {:?}: {}", name, value, e))
        }),
        _ => Ok(default),
    }
}
