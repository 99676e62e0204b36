use crate::errors::{LaunchError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Training recipe forwarded to the external training entry point.
///
/// This struct is serialized to TOML and saved at `~/.distrun/train.toml`.
/// Cluster parameters (rank, world size, batch size, sequence length) are
/// deliberately NOT part of the recipe; those come from the environment at
/// launch time. The recipe holds everything that stays fixed across nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub launcher: LauncherConfig,
    pub trainer: TrainerConfig,
}

/// Distributed-process launcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Launcher program invoked to start the worker processes
    pub program: String,

    /// Worker processes started on each node
    pub nproc_per_node: u32,
}

/// Flags forwarded to the training entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Path to the training entry point script
    pub entry_point: String,

    pub num_train_epochs: u32,

    pub dataset_name: String,
    pub dataset_config_name: String,

    /// Model configuration path or hub identifier
    pub config_name: Option<String>,

    /// Tokenizer path or hub identifier
    pub tokenizer_name: Option<String>,

    /// Numeric precision mode for model computation
    pub precision: Precision,

    /// Optimizer implementation name
    pub optim: String,

    /// Checkpoint save strategy: "no", "steps" or "epoch"
    pub save_strategy: String,

    /// Emit training metrics every N steps
    pub logging_steps: u32,

    pub gradient_checkpointing: bool,

    /// Path to the framework-specific distributed-training configuration file
    pub deepspeed_config: String,

    pub output_dir: String,
}

/// Numeric precision mode used for model computation during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Bf16,
    Fp16,
    Fp32,
}

impl Precision {
    /// Flag forwarded to the training entry point, if any (fp32 is implicit).
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            Precision::Bf16 => Some("--bf16"),
            Precision::Fp16 => Some("--fp16"),
            Precision::Fp32 => None,
        }
    }

    /// Short label used in job and log file names.
    pub fn label(&self) -> &'static str {
        match self {
            Precision::Bf16 => "bf16",
            Precision::Fp16 => "fp16",
            Precision::Fp32 => "fp32",
        }
    }
}

impl TrainingConfig {
    /// Get default recipe file path: `~/.distrun/train.toml`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| LaunchError::Config("Cannot determine home directory".into()))?;
        Ok(home.join(".distrun").join("train.toml"))
    }

    /// Load recipe from file
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading training recipe");

        let content = std::fs::read_to_string(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to read recipe file");
            e
        })?;

        let config: TrainingConfig = toml::from_str(&content)?;

        config.validate()?;

        tracing::info!("Training recipe loaded");
        Ok(config)
    }

    /// Generate default recipe
    pub fn default() -> Self {
        TrainingConfig {
            launcher: LauncherConfig {
                program: "torchrun".to_string(),
                nproc_per_node: 8,
            },
            trainer: TrainerConfig {
                entry_point: "run_clm.py".to_string(),
                num_train_epochs: 1,
                dataset_name: "wikitext".to_string(),
                dataset_config_name: "wikitext-2-raw-v1".to_string(),
                config_name: None,
                tokenizer_name: None,
                precision: Precision::Bf16,
                optim: "adamw_torch".to_string(),
                save_strategy: "no".to_string(),
                logging_steps: 10,
                gradient_checkpointing: true,
                deepspeed_config: "ds_config_zero3.json".to_string(),
                output_dir: "output".to_string(),
            },
        }
    }

    /// Validate recipe fields
    pub fn validate(&self) -> Result<()> {
        if self.launcher.program.is_empty() {
            return Err(LaunchError::Config("launcher.program must not be empty".into()));
        }

        if self.launcher.nproc_per_node == 0 {
            return Err(LaunchError::Config(
                "launcher.nproc_per_node must be at least 1".into(),
            ));
        }

        if self.trainer.entry_point.is_empty() {
            return Err(LaunchError::Config(
                "trainer.entry_point must not be empty".into(),
            ));
        }

        if self.trainer.num_train_epochs == 0 {
            return Err(LaunchError::Config(
                "trainer.num_train_epochs must be at least 1".into(),
            ));
        }

        if self.trainer.logging_steps == 0 {
            return Err(LaunchError::Config(
                "trainer.logging_steps must be at least 1".into(),
            ));
        }

        match self.trainer.save_strategy.as_str() {
            "no" | "steps" | "epoch" => {}
            other => {
                return Err(LaunchError::Config(format!(
                    "trainer.save_strategy must be 'no', 'steps' or 'epoch', got {:?}",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Save recipe to file (atomic write)
    pub fn save(&self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "Saving training recipe");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                tracing::error!(
                    path = %parent.display(),
                    error = %e,
                    "Failed to create recipe directory"
                );
                e
            })?;
        }

        let toml_string = toml::to_string_pretty(self)?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("toml.tmp");
        std::fs::write(&temp_path, &toml_string)?;
        std::fs::rename(&temp_path, path).map_err(|e| {
            tracing::error!(
                from = %temp_path.display(),
                to = %path.display(),
                error = %e,
                "Failed to rename temp recipe file"
            );
            e
        })?;

        Ok(())
    }
}
