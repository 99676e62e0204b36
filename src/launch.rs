//! Spawning and supervising the distributed job.
//!
//! The launcher performs one blocking spawn-and-wait: the assembled command
//! is started in its own process group with piped stdout/stderr, both streams
//! are multiplexed through a single channel into one writer that duplicates
//! every line to the terminal and to the job's log file, and the child's exit
//! code is surfaced unchanged. A SIGINT/SIGTERM received while waiting is
//! forwarded to the child process group (standard process-group semantics);
//! no retries happen at this layer.

use crate::errors::{LaunchError, Result};
use crate::invocation::Invocation;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::signal;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Result of a completed (or terminated) job run.
#[derive(Debug)]
pub struct LaunchOutcome {
    /// Exit code of the spawned job, unchanged; 128+signal if signal-killed
    pub exit_code: i32,

    /// Path of the combined-stream log file
    pub log_path: PathBuf,
}

impl LaunchOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One line of child output, tagged with its source stream.
#[derive(Debug)]
enum TeeLine {
    Stdout(String),
    Stderr(String),
}

/// Spawns the assembled invocation and supervises it until exit.
pub struct Launcher {
    log_dir: PathBuf,
}

impl Launcher {
    /// Create a launcher writing log files into `log_dir`.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    /// Run the invocation to completion.
    ///
    /// Blocks until the child process group exits. Returns a spawn error if
    /// the launcher binary is missing or not executable, or if the log file
    /// cannot be opened; nothing is started in either case.
    pub async fn launch(&self, invocation: &Invocation) -> Result<LaunchOutcome> {
        let log_path = self.log_dir.join(invocation.log_file_name());

        // The log artifact is part of the contract; an unwritable log
        // location fails before anything is started.
        let log_file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
            .map_err(|e| {
                LaunchError::Spawn(format!(
                    "cannot open log file {}: {}",
                    log_path.display(),
                    e
                ))
            })?;

        let mut cmd = Command::new(invocation.program());
        cmd.args(invocation.args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so termination reaches every local worker the
        // external launcher forks.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| {
            LaunchError::Spawn(format!(
                "failed to start {}: {}",
                invocation.program(),
                e
            ))
        })?;

        let pid = child
            .id()
            .ok_or_else(|| LaunchError::Spawn("child exited before pid was available".into()))?;

        info!(
            pid = pid,
            program = invocation.program(),
            log_file = %log_path.display(),
            "Spawned distributed job"
        );

        // Single logical stream: both readers funnel into one writer task.
        let (tx, rx) = mpsc::channel::<TeeLine>(256);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LaunchError::Spawn("child stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LaunchError::Spawn("child stderr not captured".into()))?;

        spawn_stream_reader(stdout, tx.clone(), false);
        spawn_stream_reader(stderr, tx.clone(), true);
        drop(tx);

        let writer = spawn_log_writer(log_file, rx);

        let mut sigterm = unix_signal(SignalKind::terminate())?;

        let status = tokio::select! {
            status = child.wait() => status?,

            _ = signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), terminating job");
                forward_sigterm(pid);
                child.wait().await?
            }

            _ = sigterm.recv() => {
                info!("Received SIGTERM, terminating job");
                forward_sigterm(pid);
                child.wait().await?
            }
        };

        // Readers end at EOF once the child exits; drain the writer so every
        // line reaches the log file before we report.
        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Log writer error"),
            Err(e) => warn!(error = %e, "Log writer task failed"),
        }

        let exit_code = exit_code(&status);

        if status.success() {
            info!(exit_code = exit_code, "Distributed job completed");
        } else {
            warn!(exit_code = exit_code, "Distributed job failed");
        }

        Ok(LaunchOutcome {
            exit_code,
            log_path,
        })
    }
}

/// Forward SIGTERM to the child's process group.
fn forward_sigterm(pid: u32) {
    let result = unsafe { libc::kill(-(pid as i32), libc::SIGTERM) };
    if result != 0 {
        warn!(
            pid = pid,
            error = %std::io::Error::last_os_error(),
            "Failed to signal child process group"
        );
    }
}

/// Exit code of a finished child; signal-killed children report 128+signal.
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

fn spawn_stream_reader<R>(stream: R, tx: mpsc::Sender<TeeLine>, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = if is_stderr {
                        TeeLine::Stderr(line)
                    } else {
                        TeeLine::Stdout(line)
                    };
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Error reading child stream");
                    break;
                }
            }
        }
    });
}

fn spawn_log_writer(
    mut file: tokio::fs::File,
    mut rx: mpsc::Receiver<TeeLine>,
) -> JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            let text = match &line {
                TeeLine::Stdout(text) => {
                    println!("{}", text);
                    text
                }
                TeeLine::Stderr(text) => {
                    eprintln!("{}", text);
                    text
                }
            };

            file.write_all(text.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }

        file.flush().await?;
        Ok(())
    })
}
