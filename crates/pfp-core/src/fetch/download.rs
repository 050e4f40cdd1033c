//! Image download: single GET into `<dest>.part`, renamed on success.

use async_trait::async_trait;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::retry::{classify_curl_error, AttemptError};
use crate::storage;

/// Saves the resource at `url` to `dest`. Returns bytes written.
#[async_trait]
pub trait ResourceDownloader: Send + Sync {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        user_agent: Option<&str>,
    ) -> Result<u64, AttemptError>;
}

/// libcurl-backed downloader; each transfer runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct CurlDownloader {
    timeout: Duration,
}

impl CurlDownloader {
    /// `timeout` bounds the whole transfer, connect included.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ResourceDownloader for CurlDownloader {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        user_agent: Option<&str>,
    ) -> Result<u64, AttemptError> {
        let url = url.to_string();
        let dest = dest.to_path_buf();
        let user_agent = user_agent.map(str::to_string);
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || download_to(&url, &dest, user_agent.as_deref(), timeout))
            .await
            .map_err(|e| AttemptError::Download(format!("download task: {}", e)))?
    }
}

fn download_to(
    url: &str,
    dest: &Path,
    user_agent: Option<&str>,
    timeout: Duration,
) -> Result<u64, AttemptError> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = storage::temp_path(dest);
    match get_into(url, &tmp, user_agent, timeout) {
        Ok(n) => {
            storage::finalize(&tmp, dest)
                .map_err(|e| AttemptError::Download(format!("{:#}", e)))?;
            Ok(n)
        }
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(&tmp) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %tmp.display(), "could not remove partial file: {}", rm);
                }
            }
            Err(e)
        }
    }
}

fn get_into(
    url: &str,
    tmp: &Path,
    user_agent: Option<&str>,
    timeout: Duration,
) -> Result<u64, AttemptError> {
    let mut file = File::create(tmp).map_err(|e| io_err(tmp, e))?;
    let mut written = 0u64;
    let mut write_error: Option<std::io::Error> = None;

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(curl_err)?;
    easy.follow_location(true).map_err(curl_err)?;
    easy.max_redirections(10).map_err(curl_err)?;
    easy.connect_timeout(timeout.min(Duration::from_secs(10)))
        .map_err(curl_err)?;
    easy.timeout(timeout).map_err(curl_err)?;
    if let Some(ua) = user_agent {
        easy.useragent(ua).map_err(curl_err)?;
    }

    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| match file.write_all(data) {
                Ok(()) => {
                    written += data.len() as u64;
                    Ok(data.len())
                }
                Err(e) => {
                    write_error = Some(e);
                    Ok(0) // abort transfer
                }
            })
            .map_err(curl_err)?;
        transfer.perform()
    };
    if let Some(e) = write_error {
        return Err(io_err(tmp, e));
    }
    performed.map_err(curl_err)?;

    let code = easy.response_code().map_err(curl_err)?;
    if !(200..300).contains(&code) {
        return Err(AttemptError::Download(format!("HTTP {}", code)));
    }
    if written == 0 {
        return Err(AttemptError::Download("empty response body".to_string()));
    }
    file.sync_all().map_err(|e| io_err(tmp, e))?;
    Ok(written)
}

fn curl_err(e: curl::Error) -> AttemptError {
    AttemptError::Download(classify_curl_error(&e))
}

fn io_err(path: &Path, e: std::io::Error) -> AttemptError {
    AttemptError::Download(format!("write {}: {}", path.display(), e))
}
