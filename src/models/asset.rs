// Model asset data models
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Weight files smaller than this are treated as broken stubs.
pub const DEFAULT_MIN_VALID_SIZE: u64 = 1024 * 1024; // 1 MiB

/// One named, large, immutable binary file expected at a known path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub source_url: String,
    pub destination: PathBuf,
    pub min_valid_size: u64,
}

impl Asset {
    pub fn new(
        name: impl Into<String>,
        source_url: impl Into<String>,
        destination: impl Into<PathBuf>,
        min_valid_size: u64,
    ) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            destination: destination.into(),
            min_valid_size,
        }
    }

    /// A file exists at the destination and is at least `min_valid_size` bytes.
    /// Size is re-read from disk on every call; no checksum is computed.
    pub fn is_valid(&self) -> bool {
        fs::metadata(&self.destination)
            .map(|meta| meta.is_file() && meta.len() >= self.min_valid_size)
            .unwrap_or(false)
    }

    /// The weight files the training script expects in the models directory.
    pub fn catalog(models_dir: &Path) -> Vec<Asset> {
        vec![
            Asset::new(
                "Chroma1-HD",
                "https://huggingface.co/lodestones/Chroma1-HD/resolve/main/Chroma1-HD.safetensors",
                models_dir.join("Chroma1-HD.safetensors"),
                DEFAULT_MIN_VALID_SIZE,
            ),
            Asset::new(
                "T5XXL FP16",
                "https://huggingface.co/UmeAiRT/ComfyUI-Auto_installer/resolve/df511f9f086b2f12e3a81471831ccb23969d8461/t5xxl_fp16.safetensors",
                models_dir.join("t5xxl_fp16.safetensors"),
                DEFAULT_MIN_VALID_SIZE,
            ),
            Asset::new(
                "VAE (AutoEncoder)",
                "https://huggingface.co/receptektas/black-forest-labs-ae_safetensors/resolve/main/ae.safetensors",
                models_dir.join("ae.safetensors"),
                DEFAULT_MIN_VALID_SIZE,
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    /// The file was already present and valid; no network access happened.
    Unchanged,
    Downloaded,
}

/// Transient progress notification; not part of any durable state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    /// 0 when the server omitted a Content-Length header.
    pub bytes_total: u64,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unauthorized (HTTP 401): this asset may require an access token")]
    Unauthorized,
    #[error("forbidden (HTTP 403): the configured credential may not grant access to this asset")]
    Forbidden,
    #[error("download failed with HTTP status {0}")]
    HttpError(u16),
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
}

/// Outcome of one asset within an `ensure_all` batch.
#[derive(Debug)]
pub struct FetchReport {
    pub asset: String,
    pub result: Result<FetchOutcome, FetchError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn asset_with_min(dir: &TempDir, min: u64) -> Asset {
        Asset::new(
            "ae",
            "https://example.com/ae.safetensors",
            dir.path().join("ae.safetensors"),
            min,
        )
    }

    #[test]
    fn test_missing_file_is_invalid() {
        let dir = TempDir::new().unwrap();
        assert!(!asset_with_min(&dir, 10).is_valid());
    }

    #[test]
    fn test_file_at_exact_minimum_size_is_valid() {
        let dir = TempDir::new().unwrap();
        let asset = asset_with_min(&dir, 10);
        let mut file = fs::File::create(&asset.destination).unwrap();
        file.write_all(&[0u8; 10]).unwrap();
        assert!(asset.is_valid());
    }

    #[test]
    fn test_undersized_file_is_invalid() {
        let dir = TempDir::new().unwrap();
        let asset = asset_with_min(&dir, 10);
        let mut file = fs::File::create(&asset.destination).unwrap();
        file.write_all(&[0u8; 9]).unwrap();
        assert!(!asset.is_valid());
    }

    #[test]
    fn test_catalog_targets_the_models_dir() {
        let assets = Asset::catalog(Path::new("/workspace/models"));
        assert_eq!(assets.len(), 3);
        for asset in &assets {
            assert!(asset.destination.starts_with("/workspace/models"));
            assert_eq!(asset.min_valid_size, DEFAULT_MIN_VALID_SIZE);
        }
    }
}
