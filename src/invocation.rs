//! Assembly of the distributed-training command line.
//!
//! The invocation is a pure function of the resolved cluster parameters and
//! the training recipe: launcher flags first (processes per node, node count,
//! this node's rank, master address/port), then the training entry point and
//! its forwarded flags. Node count and node rank map verbatim from
//! `world_size` and `rank`, with no transformation.

use crate::config::{ClusterConfig, Precision, TrainingConfig};

/// A fully assembled launcher command line plus its derived artifact names.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    job_name: String,
}

impl Invocation {
    /// Build the invocation from the resolved configuration.
    pub fn build(cluster: &ClusterConfig, training: &TrainingConfig) -> Self {
        let mut args: Vec<String> = vec![
            "--nproc_per_node".into(),
            training.launcher.nproc_per_node.to_string(),
            "--nnodes".into(),
            cluster.world_size.to_string(),
            "--node_rank".into(),
            cluster.rank.to_string(),
            "--master_addr".into(),
            cluster.master_addr.clone(),
            "--master_port".into(),
            cluster.master_port.to_string(),
        ];

        let trainer = &training.trainer;
        args.push(trainer.entry_point.clone());

        args.push("--num_train_epochs".into());
        args.push(trainer.num_train_epochs.to_string());
        args.push("--dataset_name".into());
        args.push(trainer.dataset_name.clone());
        args.push("--dataset_config_name".into());
        args.push(trainer.dataset_config_name.clone());

        if let Some(config_name) = &trainer.config_name {
            args.push("--config_name".into());
            args.push(config_name.clone());
        }

        if let Some(tokenizer_name) = &trainer.tokenizer_name {
            args.push("--tokenizer_name".into());
            args.push(tokenizer_name.clone());
        }

        args.push("--per_device_train_batch_size".into());
        args.push(cluster.batch_size.to_string());
        args.push("--block_size".into());
        args.push(cluster.sequence_length.to_string());

        if let Some(flag) = trainer.precision.flag() {
            args.push(flag.into());
        }

        args.push("--optim".into());
        args.push(trainer.optim.clone());
        args.push("--save_strategy".into());
        args.push(trainer.save_strategy.clone());
        args.push("--logging_steps".into());
        args.push(trainer.logging_steps.to_string());

        if trainer.gradient_checkpointing {
            args.push("--gradient_checkpointing".into());
        }

        args.push("--deepspeed".into());
        args.push(trainer.deepspeed_config.clone());
        args.push("--output_dir".into());
        args.push(trainer.output_dir.clone());

        // Widened before multiplying: world_size is only bounded below, so the
        // product can exceed u32.
        let gpu_count =
            u64::from(training.launcher.nproc_per_node) * u64::from(cluster.world_size);
        let job_name = job_name(
            gpu_count,
            cluster.batch_size,
            cluster.sequence_length,
            trainer.precision,
            &cluster.task_tag,
        );

        Invocation {
            program: training.launcher.program.clone(),
            args,
            job_name,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Job-identifying string for output artifacts
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Name of the combined-stream log file, written to the working directory
    pub fn log_file_name(&self) -> String {
        format!("{}.log", self.job_name)
    }

    /// Full command line as a single display string (for `--dry-run`)
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Derive the job-identifying string from the resolved parameters.
///
/// Deterministic: identical inputs always yield the identical name.
pub fn job_name(
    gpu_count: u64,
    batch_size: u32,
    sequence_length: u32,
    precision: Precision,
    task_tag: &str,
) -> String {
    format!(
        "train_g{}_bs{}_seq{}_{}_{}",
        gpu_count,
        batch_size,
        sequence_length,
        precision.label(),
        task_tag
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use std::collections::HashMap;

    fn cluster_from(vars: &[(&str, &str)]) -> ClusterConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClusterConfig::resolve(|name| map.get(name).cloned()).unwrap()
    }

    fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(|s| s.as_str())
    }

    #[test]
    fn test_node_count_and_rank_map_verbatim() {
        let cluster = cluster_from(&[("WORLD_SIZE", "4"), ("RANK", "2")]);
        let invocation = Invocation::build(&cluster, &TrainingConfig::default());

        assert_eq!(flag_value(invocation.args(), "--nnodes"), Some("4"));
        assert_eq!(flag_value(invocation.args(), "--node_rank"), Some("2"));
    }

    #[test]
    fn test_end_to_end_resolution_scenario() {
        let cluster = cluster_from(&[
            ("WORLD_SIZE", "1"),
            ("RANK", "0"),
            ("BS", "2"),
            ("SEQLEN", "2048"),
        ]);

        assert_eq!(cluster.rank, 0);
        assert_eq!(cluster.world_size, 1);
        assert_eq!(cluster.master_addr, "127.0.0.1");
        assert_eq!(cluster.master_port, 9010);
        assert_eq!(cluster.batch_size, 2);
        assert_eq!(cluster.sequence_length, 2048);

        let invocation = Invocation::build(&cluster, &TrainingConfig::default());
        let args = invocation.args();

        assert_eq!(flag_value(args, "--nproc_per_node"), Some("8"));
        assert_eq!(flag_value(args, "--nnodes"), Some("1"));
        assert_eq!(flag_value(args, "--node_rank"), Some("0"));
        assert_eq!(flag_value(args, "--master_addr"), Some("127.0.0.1"));
        assert_eq!(flag_value(args, "--master_port"), Some("9010"));
        assert_eq!(flag_value(args, "--per_device_train_batch_size"), Some("2"));
        assert_eq!(flag_value(args, "--block_size"), Some("2048"));
    }

    #[test]
    fn test_launcher_flags_precede_entry_point() {
        let cluster = cluster_from(&[]);
        let training = TrainingConfig::default();
        let invocation = Invocation::build(&cluster, &training);
        let args = invocation.args();

        let entry_pos = args
            .iter()
            .position(|a| a == &training.trainer.entry_point)
            .expect("entry point present");
        let master_pos = args.iter().position(|a| a == "--master_port").unwrap();
        let epochs_pos = args.iter().position(|a| a == "--num_train_epochs").unwrap();

        assert!(master_pos < entry_pos);
        assert!(entry_pos < epochs_pos);
    }

    #[test]
    fn test_precision_flag_forwarded() {
        let cluster = cluster_from(&[]);
        let mut training = TrainingConfig::default();

        let invocation = Invocation::build(&cluster, &training);
        assert!(invocation.args().iter().any(|a| a == "--bf16"));

        training.trainer.precision = Precision::Fp32;
        let invocation = Invocation::build(&cluster, &training);
        assert!(!invocation.args().iter().any(|a| a == "--bf16"));
        assert!(!invocation.args().iter().any(|a| a == "--fp16"));
    }

    #[test]
    fn test_optional_identifiers_omitted_when_absent() {
        let cluster = cluster_from(&[]);
        let mut training = TrainingConfig::default();
        training.trainer.config_name = None;
        training.trainer.tokenizer_name = None;

        let invocation = Invocation::build(&cluster, &training);
        assert!(!invocation.args().iter().any(|a| a == "--config_name"));
        assert!(!invocation.args().iter().any(|a| a == "--tokenizer_name"));

        training.trainer.tokenizer_name = Some("gpt2".into());
        let invocation = Invocation::build(&cluster, &training);
        assert_eq!(flag_value(invocation.args(), "--tokenizer_name"), Some("gpt2"));
    }

    #[test]
    fn test_log_file_name_is_deterministic() {
        let a = job_name(8, 2, 2048, Precision::Bf16, "0000");
        let b = job_name(8, 2, 2048, Precision::Bf16, "0000");
        assert_eq!(a, b);

        // Any input change changes the name
        assert_ne!(a, job_name(16, 2, 2048, Precision::Bf16, "0000"));
        assert_ne!(a, job_name(8, 4, 2048, Precision::Bf16, "0000"));
        assert_ne!(a, job_name(8, 2, 4096, Precision::Bf16, "0000"));
        assert_ne!(a, job_name(8, 2, 2048, Precision::Fp16, "0000"));
    }

    #[test]
    fn test_gpu_count_does_not_overflow_for_large_world_size() {
        let cluster = cluster_from(&[("WORLD_SIZE", "600000000")]);
        let invocation = Invocation::build(&cluster, &TrainingConfig::default());

        // 8 procs/node * 600M nodes exceeds u32::MAX
        assert!(invocation.log_file_name().starts_with("train_g4800000000_"));
    }

    #[test]
    fn test_log_file_name_content() {
        let cluster = cluster_from(&[("WORLD_SIZE", "2"), ("BS", "4")]);
        let invocation = Invocation::build(&cluster, &TrainingConfig::default());

        // 8 procs/node * 2 nodes = 16 GPUs
        assert_eq!(
            invocation.log_file_name(),
            "train_g16_bs4_seq4096_bf16_0000.log"
        );
    }

    #[test]
    fn test_command_line_starts_with_program() {
        let cluster = cluster_from(&[]);
        let invocation = Invocation::build(&cluster, &TrainingConfig::default());

        let line = invocation.command_line();
        assert!(line.starts_with("torchrun --nproc_per_node 8"));
        assert!(line.contains("--deepspeed ds_config_zero3.json"));
    }
}
