// Checkpoint listing for trained LoRA output
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub file_name: String,
    pub size_bytes: u64,
    pub modified: String,
}

impl CheckpointInfo {
    pub fn size_display(&self) -> String {
        format!("{:.1} MB", self.size_bytes as f64 / 1024.0 / 1024.0)
    }
}

/// List the `.safetensors` checkpoints produced for a LoRA, newest name
/// first. A missing output directory yields an empty list.
pub fn list_checkpoints(output_dir: &Path, lora_name: &str) -> io::Result<Vec<CheckpointInfo>> {
    let lora_name = lora_name.trim().replace(' ', "_");
    let dir = output_dir.join(&lora_name);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut checkpoints = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.extension().map_or(false, |ext| ext == "safetensors") {
            continue;
        }

        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }

        let modified = meta
            .modified()
            .map(|time| DateTime::<Utc>::from(time).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();

        checkpoints.push(CheckpointInfo {
            file_name: entry.file_name().to_string_lossy().to_string(),
            size_bytes: meta.len(),
            modified,
        });
    }

    checkpoints.sort_by(|a, b| b.file_name.cmp(&a.file_name));
    Ok(checkpoints)
}
