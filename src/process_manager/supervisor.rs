// Training process supervision
// Owns the lifecycle of at most one running external training job: spawn,
// stream merged output into an append-only log, expose live status, and
// request cooperative or forced termination.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::WorkspaceConfig;
use crate::file_manager::{append_json_record, read_json_file};
use crate::models::{
    JobRecord, JobSnapshot, JobState, LogTail, StartError, StopError, TrainCommand,
};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

const LINE_CHANNEL_CAPACITY: usize = 256;

struct JobInner {
    id: String,
    command_line: String,
    state: JobState,
    log: Vec<String>,
    exit_code: Option<i32>,
    cancel_requested: bool,
    process: Option<Child>,
    started_at: String,
    finished_at: Option<String>,
    log_path: PathBuf,
}

/// Supervises at most one running training job at a time.
///
/// `start` rejects a second concurrent job instead of queuing it; `poll` and
/// `stop` are safe to call from any thread while the drain task runs.
pub struct JobSupervisor {
    config: WorkspaceConfig,
    job: Arc<Mutex<Option<JobInner>>>,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl JobSupervisor {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self {
            config,
            job: Arc::new(Mutex::new(None)),
            drain: Mutex::new(None),
        }
    }

    /// Spawn the training process and return its job id without waiting for
    /// completion. Fails with `AlreadyRunning` while a job is active.
    pub async fn start(&self, command: TrainCommand) -> Result<String, StartError> {
        tokio::fs::create_dir_all(self.config.logs_dir()).await?;

        let mut guard = self.job.lock();
        if guard.as_ref().map_or(false, |j| j.state == JobState::Running) {
            return Err(StartError::AlreadyRunning);
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.current_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &command.envs {
            cmd.env(key, value);
        }

        // New process group so termination reaches the trainer's children
        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd.spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            StartError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::Other,
                "failed to capture stdout",
            ))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            StartError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::Other,
                "failed to capture stderr",
            ))
        })?;

        let id = uuid::Uuid::new_v4().to_string();
        let log_path = self.config.job_log_path(&id);

        *guard = Some(JobInner {
            id: id.clone(),
            command_line: command.display_line(),
            state: JobState::Running,
            log: Vec::new(),
            exit_code: None,
            cancel_requested: false,
            process: Some(child),
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
            log_path: log_path.clone(),
        });
        drop(guard);

        info!("started training job {}: {}", id, command.display_line());

        let handle = tokio::spawn(drain_job(
            self.job.clone(),
            stdout,
            stderr,
            log_path,
            self.config.jobs_json_path(),
        ));
        *self.drain.lock() = Some(handle);

        Ok(id)
    }

    /// Non-blocking snapshot of the current job; `Idle` when none was started.
    pub fn poll(&self) -> JobSnapshot {
        match self.job.lock().as_ref() {
            None => JobSnapshot::idle(),
            Some(job) => JobSnapshot {
                job_id: Some(job.id.clone()),
                state: job.state,
                log: job.log.clone(),
                exit_code: job.exit_code,
                started_at: Some(job.started_at.clone()),
                finished_at: job.finished_at.clone(),
            },
        }
    }

    /// Log lines appended after `cursor`, so pollers do not re-read the
    /// whole log each time.
    pub fn poll_tail(&self, cursor: usize) -> LogTail {
        match self.job.lock().as_ref() {
            None => LogTail {
                lines: Vec::new(),
                next_cursor: 0,
                state: JobState::Idle,
                exit_code: None,
            },
            Some(job) => {
                let start = cursor.min(job.log.len());
                LogTail {
                    lines: job.log[start..].to_vec(),
                    next_cursor: job.log.len(),
                    state: job.state,
                    exit_code: job.exit_code,
                }
            }
        }
    }

    /// Request cooperative termination of the running job.
    ///
    /// Idempotent while shutdown is in flight. There is no implicit deadline:
    /// a caller that needs one should layer a timeout and escalate to
    /// [`JobSupervisor::kill`].
    pub fn stop(&self) -> Result<(), StopError> {
        let mut guard = self.job.lock();
        let job = match guard.as_mut() {
            Some(job) if job.state == JobState::Running => job,
            _ => return Err(StopError::NothingRunning),
        };

        job.cancel_requested = true;
        if let Some(child) = job.process.as_mut() {
            terminate(child);
        }
        info!("requested stop of training job {}", job.id);
        Ok(())
    }

    /// Forcefully kill the running job. Like `stop`, the job ends `Cancelled`.
    pub fn kill(&self) -> Result<(), StopError> {
        let mut guard = self.job.lock();
        let job = match guard.as_mut() {
            Some(job) if job.state == JobState::Running => job,
            _ => return Err(StopError::NothingRunning),
        };

        job.cancel_requested = true;
        if let Some(child) = job.process.as_mut() {
            #[cfg(unix)]
            if let Some(pid) = child.id() {
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
            let _ = child.start_kill();
        }
        warn!("forcefully killed training job {}", job.id);
        Ok(())
    }

    /// Wait for the current job's drain task to finish and return the final
    /// snapshot. Returns immediately when nothing is running.
    pub async fn wait(&self) -> JobSnapshot {
        let handle = self.drain.lock().take();
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    warn!("drain task join error: {}", e);
                }
            }
            None => {
                // Another caller took the join handle; fall back to polling
                while self.poll().state == JobState::Running {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
        self.poll()
    }

    /// Terminal outcomes of past jobs, oldest first.
    pub fn history(&self) -> Result<Vec<JobRecord>, String> {
        let path = self.config.jobs_json_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_json_file(&path)
    }
}

/// Cooperative termination: SIGTERM to the process group on Unix so the
/// trainer's own children get the signal too.
#[cfg(unix)]
fn terminate(child: &mut Child) {
    match child.id() {
        Some(pid) => unsafe {
            libc::kill(-(pid as i32), libc::SIGTERM);
        },
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

/// Progress bars redraw lines with carriage returns; keep the final segment.
fn normalize_line(raw: &str) -> String {
    raw.rsplit('\r').next().unwrap_or(raw).to_string()
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

/// Single writer for the job's log and terminal state: merges stdout and
/// stderr lines as they are produced, mirrors them into the durable log
/// file, reaps the process once both streams close, and records the outcome.
async fn drain_job(
    job: Arc<Mutex<Option<JobInner>>>,
    stdout: tokio::process::ChildStdout,
    stderr: tokio::process::ChildStderr,
    log_path: PathBuf,
    jobs_json_path: PathBuf,
) {
    let mut log_file = match tokio::fs::File::create(&log_path).await {
        Ok(file) => Some(file),
        Err(e) => {
            warn!("could not create job log file {:?}: {}", log_path, e);
            None
        }
    };

    let (tx, mut rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
    let out_task = tokio::spawn(forward_lines(stdout, tx.clone()));
    let err_task = tokio::spawn(forward_lines(stderr, tx));

    // Both forwarders dropping their sender ends the loop
    while let Some(raw) = rx.recv().await {
        let line = normalize_line(&raw);

        if let Some(file) = log_file.as_mut() {
            if file.write_all(line.as_bytes()).await.is_err()
                || file.write_all(b"\n").await.is_err()
            {
                warn!("stopped mirroring job log to {:?}", log_path);
                log_file = None;
            }
        }

        let mut guard = job.lock();
        if let Some(job) = guard.as_mut() {
            job.log.push(line);
        }
    }

    let _ = out_task.await;
    let _ = err_task.await;

    if let Some(file) = log_file.as_mut() {
        let _ = file.flush().await;
    }

    // Streams are closed; release the handle and reap the process
    let child = job.lock().as_mut().and_then(|j| j.process.take());
    let status = match child {
        Some(mut child) => child.wait().await.ok(),
        None => None,
    };
    let exit_code = status.and_then(|s| s.code());

    let record = {
        let mut guard = job.lock();
        let Some(job) = guard.as_mut() else {
            return;
        };

        job.exit_code = exit_code;
        job.finished_at = Some(Utc::now().to_rfc3339());
        // Explicit cancellation wins over whatever exit code the OS reports
        // for the killed process.
        job.state = if job.cancel_requested {
            JobState::Cancelled
        } else if exit_code == Some(0) {
            JobState::Succeeded
        } else {
            JobState::Failed
        };

        info!(
            "training job {} finished: {:?} (exit code {:?})",
            job.id, job.state, exit_code
        );

        JobRecord {
            id: job.id.clone(),
            command_line: job.command_line.clone(),
            state: job.state,
            exit_code: job.exit_code,
            log_path: job.log_path.to_string_lossy().to_string(),
            created_at: job.started_at.clone(),
            finished_at: job.finished_at.clone(),
        }
    };

    if let Err(e) = append_json_record(&jobs_json_path, record) {
        warn!("failed to record job history: {}", e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn supervisor() -> (JobSupervisor, WorkspaceConfig, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = WorkspaceConfig::new(dir.path());
        (JobSupervisor::new(config.clone()), config, dir)
    }

    fn sh(dir: &TempDir, script: &str) -> TrainCommand {
        TrainCommand::new("sh", dir.path()).arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_poll_before_any_job_is_idle() {
        let (supervisor, _config, _dir) = supervisor();
        let snapshot = supervisor.poll();
        assert_eq!(snapshot.state, JobState::Idle);
        assert!(snapshot.log.is_empty());
        assert!(snapshot.exit_code.is_none());
    }

    #[tokio::test]
    async fn test_job_output_is_captured_in_order() {
        let (supervisor, config, dir) = supervisor();
        let id = supervisor
            .start(sh(&dir, "echo one; echo two; echo three"))
            .await
            .unwrap();

        let snapshot = supervisor.wait().await;
        assert_eq!(snapshot.state, JobState::Succeeded);
        assert_eq!(snapshot.exit_code, Some(0));
        assert_eq!(snapshot.log, vec!["one", "two", "three"]);

        // The durable log file mirrors the in-memory log
        let file = std::fs::read_to_string(config.job_log_path(&id)).unwrap();
        assert_eq!(file, "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn test_stderr_is_merged_into_the_log() {
        let (supervisor, _config, dir) = supervisor();
        supervisor
            .start(sh(&dir, "echo out; echo err >&2"))
            .await
            .unwrap();

        let snapshot = supervisor.wait().await;
        assert_eq!(snapshot.state, JobState::Succeeded);
        assert_eq!(snapshot.log.len(), 2);
        assert!(snapshot.log.contains(&"out".to_string()));
        assert!(snapshot.log.contains(&"err".to_string()));
    }

    #[tokio::test]
    async fn test_carriage_return_updates_collapse() {
        let (supervisor, _config, dir) = supervisor();
        supervisor
            .start(sh(&dir, "printf '10%%\\r20%%\\r30%%\\n'"))
            .await
            .unwrap();

        let snapshot = supervisor.wait().await;
        assert_eq!(snapshot.log, vec!["30%"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_a_failed_job() {
        let (supervisor, _config, dir) = supervisor();
        supervisor.start(sh(&dir, "exit 7")).await.unwrap();

        let snapshot = supervisor.wait().await;
        assert_eq!(snapshot.state, JobState::Failed);
        assert_eq!(snapshot.exit_code, Some(7));
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_running() {
        let (supervisor, _config, dir) = supervisor();
        supervisor.start(sh(&dir, "sleep 5")).await.unwrap();

        let second = supervisor.start(sh(&dir, "echo nope")).await;
        assert!(matches!(second, Err(StartError::AlreadyRunning)));

        supervisor.stop().unwrap();
        let snapshot = supervisor.wait().await;
        assert_eq!(snapshot.state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn test_stop_cancels_and_is_idempotent() {
        let (supervisor, _config, dir) = supervisor();
        supervisor.start(sh(&dir, "sleep 30")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        supervisor.stop().unwrap();
        // A second stop while shutdown is in flight must not error
        supervisor.stop().unwrap();

        let snapshot = supervisor.wait().await;
        assert_eq!(snapshot.state, JobState::Cancelled);

        // After the terminal state there is nothing left to stop
        assert!(matches!(supervisor.stop(), Err(StopError::NothingRunning)));
    }

    #[tokio::test]
    async fn test_stop_with_nothing_running_errors() {
        let (supervisor, _config, _dir) = supervisor();
        assert!(matches!(supervisor.stop(), Err(StopError::NothingRunning)));
        assert!(matches!(supervisor.kill(), Err(StopError::NothingRunning)));
    }

    #[tokio::test]
    async fn test_kill_cancels_the_job() {
        let (supervisor, _config, dir) = supervisor();
        supervisor.start(sh(&dir, "sleep 30")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        supervisor.kill().unwrap();
        let snapshot = supervisor.wait().await;
        assert_eq!(snapshot.state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn test_log_grows_monotonically() {
        let (supervisor, _config, dir) = supervisor();
        supervisor
            .start(sh(&dir, "for i in 1 2 3 4 5; do echo $i; sleep 0.2; done"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let earlier = supervisor.poll();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let later = supervisor.poll();

        assert!(later.log.len() >= earlier.log.len());
        assert_eq!(&later.log[..earlier.log.len()], &earlier.log[..]);

        let snapshot = supervisor.wait().await;
        assert_eq!(snapshot.log, vec!["1", "2", "3", "4", "5"]);
    }

    #[tokio::test]
    async fn test_poll_tail_cursors_concatenate() {
        let (supervisor, _config, dir) = supervisor();
        supervisor
            .start(sh(&dir, "echo a; echo b; echo c"))
            .await
            .unwrap();
        supervisor.wait().await;

        let tail = supervisor.poll_tail(0);
        assert_eq!(tail.lines, vec!["a", "b", "c"]);
        assert_eq!(tail.next_cursor, 3);

        let rest = supervisor.poll_tail(tail.next_cursor);
        assert!(rest.lines.is_empty());
        assert_eq!(rest.next_cursor, 3);

        // A cursor past the end clamps instead of panicking
        assert!(supervisor.poll_tail(99).lines.is_empty());
    }

    #[tokio::test]
    async fn test_history_records_each_terminal_job() {
        let (supervisor, _config, dir) = supervisor();

        supervisor.start(sh(&dir, "echo first")).await.unwrap();
        supervisor.wait().await;
        supervisor.start(sh(&dir, "exit 1")).await.unwrap();
        supervisor.wait().await;

        let history = supervisor.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].state, JobState::Succeeded);
        assert_eq!(history[1].state, JobState::Failed);
        assert_eq!(history[1].exit_code, Some(1));
    }

    #[test]
    fn test_normalize_line_keeps_final_segment() {
        assert_eq!(normalize_line("plain"), "plain");
        assert_eq!(normalize_line("10%\r20%\r30%"), "30%");
        assert_eq!(normalize_line(""), "");
    }
}
