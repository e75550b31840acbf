// Model asset fetching
// Decides per asset whether a download is required and drives the download
// client; a corrupt or partial file is never left in place silently.
mod download;

pub use download::DownloadClient;

use std::fs;

use log::{debug, info, warn};

use crate::config::WorkspaceConfig;
use crate::models::{Asset, DownloadProgress, FetchError, FetchOutcome, FetchReport};

pub struct AssetFetcher {
    client: DownloadClient,
}

impl AssetFetcher {
    pub fn new(config: &WorkspaceConfig) -> Self {
        Self {
            client: DownloadClient::new(
                config.hf_token.clone(),
                config.credential_hosts.clone(),
            ),
        }
    }

    /// Make sure the asset is present and valid, downloading it if not.
    ///
    /// Idempotent: a second call after a successful one performs no I/O.
    pub fn ensure(&self, asset: &Asset) -> Result<FetchOutcome, FetchError> {
        self.ensure_with_progress(asset, |_| {})
    }

    pub fn ensure_with_progress<F>(
        &self,
        asset: &Asset,
        progress: F,
    ) -> Result<FetchOutcome, FetchError>
    where
        F: FnMut(DownloadProgress),
    {
        if asset.is_valid() {
            debug!(
                "{} already present at {}",
                asset.name,
                asset.destination.display()
            );
            return Ok(FetchOutcome::Unchanged);
        }

        if asset.destination.exists() {
            warn!(
                "{} exists but is smaller than {} bytes, re-downloading",
                asset.name, asset.min_valid_size
            );
            fs::remove_file(&asset.destination)?;
        }

        info!("downloading {} from {}", asset.name, asset.source_url);
        let written = self
            .client
            .fetch(&asset.source_url, &asset.destination, progress)?;
        info!("{} downloaded ({} bytes)", asset.name, written);

        Ok(FetchOutcome::Downloaded)
    }

    /// Process assets strictly in order, stopping at the first failure.
    ///
    /// Downloads of multi-gigabyte weight files stay sequential to bound
    /// bandwidth and memory; the failing asset's report is the last entry.
    pub fn ensure_all<'a, I>(&self, assets: I) -> Vec<FetchReport>
    where
        I: IntoIterator<Item = &'a Asset>,
    {
        let mut reports = Vec::new();

        for asset in assets {
            let result = self.ensure(asset);
            let failed = result.is_err();
            if let Err(err) = &result {
                warn!("failed to fetch {}: {}", asset.name, err);
            }
            reports.push(FetchReport {
                asset: asset.name.clone(),
                result,
            });
            if failed {
                break;
            }
        }

        reports
    }
}
