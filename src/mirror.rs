use crate::date::{format_date, parse_iso_date};
use crate::error::ApodError;
use crate::models::ApodResult;
use crate::upstream::describe;
use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// URL path mirrored files are served under.
pub const MEDIA_ROUTE: &str = "/static/apod_cache";

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_EXTENSION_LEN: usize = 5;
const UNKNOWN_EXTENSION: &str = "unknown";
const KNOWN_EXTENSIONS: [&str; 5] = ["jpeg", "jpg", "png", "gif", "mp4"];

/// Keeps one local copy of each day's image.
///
/// Files are named `apod_<date>.<ext>` and never rewritten once present.
/// Nothing is ever evicted from the directory.
#[derive(Clone)]
pub struct MediaMirror {
    client: Client,
    cache_dir: PathBuf,
}

impl MediaMirror {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .context("failed to build media HTTP client")?;
        Ok(Self { client, cache_dir })
    }

    /// Creates the cache directory if needed.
    pub async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .with_context(|| format!("cannot create media cache dir {:?}", self.cache_dir))
    }

    /// Returns `result` with `local_url` set when the image is (now) on disk.
    /// Any failure leaves the result pointing at the remote URL.
    pub async fn mirror(&self, result: ApodResult) -> ApodResult {
        if !result.is_image() {
            return result;
        }
        let Some(remote) = result.remote_media_url().map(str::to_string) else {
            return result;
        };
        let Some(filename) = result
            .date
            .as_deref()
            .and_then(|date| local_filename(date, &remote))
        else {
            debug!(date = ?result.date, "Skipping mirror for entry without a usable date");
            return result;
        };

        match self.ensure_local(&remote, &filename).await {
            Ok(()) => result.with_local_url(format!("{}/{}", MEDIA_ROUTE, filename)),
            Err(e) => {
                warn!(error = %e, filename = %filename, "Serving remote media URL instead");
                result
            }
        }
    }

    async fn ensure_local(&self, remote: &str, filename: &str) -> Result<(), ApodError> {
        let target = self.cache_dir.join(filename);
        if path_exists(&target).await {
            debug!(filename = %filename, "Reusing mirrored media");
            return Ok(());
        }

        let remote = Url::parse(remote)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| ApodError::MediaMirror(format!("unsupported media URL {}", remote)))?;

        let partial = self
            .cache_dir
            .join(format!(".{}.{}.part", filename, Uuid::new_v4().simple()));
        match self.download(remote, &partial).await {
            Ok(bytes) => {
                if path_exists(&target).await {
                    // another request finished first
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Ok(());
                }
                tokio::fs::rename(&partial, &target)
                    .await
                    .map_err(|e| io_error(&target, e))?;
                info!(filename = %filename, bytes, "Mirrored APOD media");
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    async fn download(&self, remote: Url, partial: &Path) -> Result<u64, ApodError> {
        let response = self
            .client
            .get(remote)
            .send()
            .await
            .map_err(|e| ApodError::MediaMirror(describe(&e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApodError::MediaMirror(format!("media host answered {}", status)));
        }

        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(|e| io_error(partial, e))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ApodError::MediaMirror(describe(&e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| io_error(partial, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| io_error(partial, e))?;

        Ok(written)
    }
}

/// `apod_<date>.<ext>`, or `None` when the date is not a real `YYYY-MM-DD`.
pub fn local_filename(date: &str, remote: &str) -> Option<String> {
    let date = parse_iso_date(date)?;
    Some(format!(
        "apod_{}.{}",
        format_date(date),
        infer_extension(remote)
    ))
}

/// Lower-cased extension of the URL's last path segment, with a fallback
/// scan for well-known media suffixes and `"unknown"` as the last resort.
pub fn infer_extension(remote: &str) -> String {
    let Ok(url) = Url::parse(remote) else {
        return UNKNOWN_EXTENSION.to_string();
    };
    let path = url.path().to_ascii_lowercase();
    let last_segment = path.rsplit('/').next().unwrap_or_default();

    if let Some((_, ext)) = last_segment.rsplit_once('.') {
        if !ext.is_empty()
            && ext.len() <= MAX_EXTENSION_LEN
            && ext.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return ext.to_string();
        }
    }

    KNOWN_EXTENSIONS
        .iter()
        .find(|ext| path.contains(&format!(".{}", ext)))
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| UNKNOWN_EXTENSION.to_string())
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

fn io_error(path: &Path, err: std::io::Error) -> ApodError {
    ApodError::MediaMirror(format!("{}: {}", path.display(), err))
}
