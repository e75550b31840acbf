// Training job data models
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

/// Fully-resolved invocation of the external training program.
///
/// The supervisor copies this at start time, so mutating the caller's value
/// after `start` has no effect on the running job. The contents are passed
/// straight to process spawn without any shell interpretation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainCommand {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: PathBuf,
    pub envs: Vec<(String, String)>,
}

impl TrainCommand {
    pub fn new(program: impl Into<String>, current_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: current_dir.into(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Single-line rendering for logs and history records.
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Point-in-time view of the current job, safe to serialize for the web layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: Option<String>,
    pub state: JobState,
    pub log: Vec<String>,
    pub exit_code: Option<i32>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl JobSnapshot {
    pub fn idle() -> Self {
        Self {
            job_id: None,
            state: JobState::Idle,
            log: Vec::new(),
            exit_code: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Incremental log read: everything appended after the caller's cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogTail {
    pub lines: Vec<String>,
    pub next_cursor: usize,
    pub state: JobState,
    pub exit_code: Option<i32>,
}

/// Persisted history entry for one finished job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub command_line: String,
    pub state: JobState,
    pub exit_code: Option<i32>,
    pub log_path: String,
    pub created_at: String,
    pub finished_at: Option<String>,
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("a training job is already running")]
    AlreadyRunning,
    #[error("failed to spawn training process: {0}")]
    SpawnFailed(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum StopError {
    #[error("no training job is running")]
    NothingRunning,
}
