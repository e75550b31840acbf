//! Backend core for a LoRA fine-tuning control panel: supervises the
//! external training process and keeps the model weight files it consumes
//! present and valid. The web layer calls into this crate and renders what
//! `poll` and the fetch reports return.

pub mod asset_fetcher;
pub mod checkpoints;
pub mod config;
pub mod file_manager;
pub mod logging;
pub mod models;
pub mod process_manager;

pub use asset_fetcher::{AssetFetcher, DownloadClient};
pub use config::WorkspaceConfig;
pub use models::{
    Asset, DownloadProgress, FetchError, FetchOutcome, FetchReport, JobRecord, JobSnapshot,
    JobState, LogTail, StartError, StopError, TrainCommand,
};
pub use process_manager::JobSupervisor;
