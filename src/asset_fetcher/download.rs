// Streaming HTTP download of large model files
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use log::debug;
use url::Url;

use crate::models::{DownloadProgress, FetchError};

const CHUNK_SIZE: usize = 64 * 1024;
// Progress cadence when the server did not send a Content-Length: every
// 256 chunks (16 MiB at the current chunk size).
const UNKNOWN_TOTAL_CADENCE: u64 = 256;

pub struct DownloadClient {
    agent: ureq::Agent,
    credential: Option<String>,
    credential_hosts: Vec<String>,
}

impl DownloadClient {
    pub fn new(credential: Option<String>, credential_hosts: Vec<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .build();

        Self {
            agent,
            credential,
            credential_hosts,
        }
    }

    /// Whether requests to `url` should carry the bearer credential.
    fn is_credential_host(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };

        self.credential_hosts
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed)))
    }

    /// Stream `url` to `dest`, reporting progress along the way.
    ///
    /// The body is written through a fixed-size buffer and is never held in
    /// memory. On failure mid-stream the partial file is removed.
    pub fn fetch<F>(&self, url: &str, dest: &Path, mut progress: F) -> Result<u64, FetchError>
    where
        F: FnMut(DownloadProgress),
    {
        let mut request = self.agent.get(url);
        if self.is_credential_host(url) {
            if let Some(token) = &self.credential {
                request = request.set("Authorization", &format!("Bearer {}", token));
            }
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(401, _)) => return Err(FetchError::Unauthorized),
            Err(ureq::Error::Status(403, _)) => return Err(FetchError::Forbidden),
            Err(ureq::Error::Status(status, _)) => return Err(FetchError::HttpError(status)),
            Err(ureq::Error::Transport(err)) => {
                return Err(FetchError::NetworkError(err.to_string()))
            }
        };

        // Informational only; servers may omit it
        let total: u64 = response
            .header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        debug!("downloading {} ({} bytes expected)", url, total);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut reader = response.into_reader();
        match stream_to_file(&mut reader, dest, total, &mut progress) {
            Ok(written) => Ok(written),
            Err(err) => {
                let _ = fs::remove_file(dest);
                Err(err)
            }
        }
    }
}

fn stream_to_file<R, F>(
    reader: &mut R,
    dest: &Path,
    total: u64,
    progress: &mut F,
) -> Result<u64, FetchError>
where
    R: Read + ?Sized,
    F: FnMut(DownloadProgress),
{
    let mut file = File::create(dest)?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut downloaded = 0u64;
    let mut chunks = 0u64;
    let mut last_percent = 0u64;

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| FetchError::NetworkError(e.to_string()))?;
        if read == 0 {
            break;
        }

        file.write_all(&buffer[..read])?;
        downloaded += read as u64;
        chunks += 1;

        if total > 0 {
            let percent = downloaded * 100 / total;
            if percent >= last_percent + 10 {
                last_percent = percent - percent % 10;
                progress(DownloadProgress {
                    bytes_downloaded: downloaded,
                    bytes_total: total,
                });
            }
        } else if chunks % UNKNOWN_TOTAL_CADENCE == 0 {
            progress(DownloadProgress {
                bytes_downloaded: downloaded,
                bytes_total: 0,
            });
        }
    }

    file.flush()?;
    progress(DownloadProgress {
        bytes_downloaded: downloaded,
        bytes_total: total,
    });

    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(hosts: &[&str]) -> DownloadClient {
        DownloadClient::new(
            Some("token".to_string()),
            hosts.iter().map(|h| h.to_string()).collect(),
        )
    }

    #[test]
    fn test_credential_host_matches_exact_and_subdomains() {
        let client = client_for(&["huggingface.co"]);
        assert!(client.is_credential_host("https://huggingface.co/some/model"));
        assert!(client.is_credential_host("https://cdn.huggingface.co/some/model"));
        assert!(!client.is_credential_host("https://example.com/huggingface.co"));
        assert!(!client.is_credential_host("https://nothuggingface.co/model"));
    }

    #[test]
    fn test_invalid_url_is_not_a_credential_host() {
        let client = client_for(&["huggingface.co"]);
        assert!(!client.is_credential_host("not a url"));
    }
}
