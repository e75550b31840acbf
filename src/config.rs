// Workspace configuration and directory layout
//
// A single base directory holds everything the panel touches: model weights,
// job logs, training output, and the job-history ledger. The value is
// injected into the supervisor and fetcher instead of living in globals.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::file_manager::initialize_json_file;
use crate::models::JobRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub base_dir: PathBuf,
    /// Bearer token for gated downloads; never hard-coded.
    pub hf_token: Option<String>,
    /// Hosts that get the Authorization header when a token is configured.
    pub credential_hosts: Vec<String>,
}

impl WorkspaceConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            hf_token: None,
            credential_hosts: vec!["huggingface.co".to_string()],
        }
    }

    /// Resolve from the environment: `DATA_DIRECTORY` for the base directory
    /// (falling back to the platform data dir) and `HF_TOKEN` for the
    /// download credential.
    pub fn from_env() -> Self {
        let base_dir = std::env::var_os("DATA_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("lorakit")
            });

        let mut config = Self::new(base_dir);
        config.hf_token = std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty());
        config
    }

    pub fn with_hf_token(mut self, token: impl Into<String>) -> Self {
        self.hf_token = Some(token.into());
        self
    }

    pub fn models_dir(&self) -> PathBuf {
        self.base_dir.join("models")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.base_dir.join("output")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    pub fn jobs_json_path(&self) -> PathBuf {
        self.data_dir().join("jobs.json")
    }

    pub fn job_log_path(&self, job_id: &str) -> PathBuf {
        self.logs_dir().join(format!("{}.log", job_id))
    }

    /// Create the workspace directory tree and an empty job ledger.
    pub fn initialize(&self) -> Result<(), String> {
        for dir in [
            self.models_dir(),
            self.logs_dir(),
            self.output_dir(),
            self.data_dir(),
        ] {
            fs::create_dir_all(&dir)
                .map_err(|e| format!("Failed to create directory {:?}: {}", dir, e))?;
        }

        initialize_json_file(&self.jobs_json_path(), &Vec::<JobRecord>::new())?;
        Ok(())
    }
}
