//! Streaming download of file resources
//!
//! Bytes go to a temporary file next to the destination. Only a complete,
//! verified payload is moved into place: a plain file is renamed onto the
//! destination, an archive is unpacked into a staging directory that is then
//! renamed onto the extraction target. Failure or cancellation leaves nothing
//! behind at either path.

use crate::auth::{Credentials, redact_url};
use crate::common::{CancelToken, FormatUtils, Outcome, PathUtils, Timer};
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{CatalogueError, Result};
use crate::provision::archive::{ArchiveFormat, ArchiveUtils};
use futures_util::StreamExt;
use reqwest::Client;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// What the caller wants downloaded and where
#[derive(Debug, Clone)]
pub struct DownloadRequest<'a> {
    pub dataset_id: &'a str,
    pub url: &'a str,
    pub credentials: &'a Credentials,
    pub destination: &'a Path,
    /// The catalogue marked the resource as an archive
    pub expect_archive: bool,
}

/// Releases the claimed destination when dropped
struct DestinationGuard {
    busy: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for DestinationGuard {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    busy: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Downloader {
    /// `connect_timeout` bounds connection setup only; transfers may take as
    /// long as they need
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("geo-catalogue/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CatalogueError::download(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            busy: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    fn claim(&self, destination: &Path) -> Result<DestinationGuard> {
        let path = std::path::absolute(destination).unwrap_or_else(|_| destination.to_path_buf());
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(path.clone()) {
            return Err(CatalogueError::DestinationBusy(destination.to_path_buf()));
        }
        Ok(DestinationGuard {
            busy: Arc::clone(&self.busy),
            path,
        })
    }

    /// Whether a download currently targets `destination`
    pub fn is_busy(&self, destination: &Path) -> bool {
        let path = std::path::absolute(destination).unwrap_or_else(|_| destination.to_path_buf());
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&path)
    }

    /// Download, and unpack if the payload is an archive.
    ///
    /// Returns the resulting file paths in sorted order.
    pub async fn download(&self, request: DownloadRequest<'_>, cancel: &CancelToken) -> Result<Outcome<Vec<PathBuf>>> {
        let _guard = self.claim(request.destination)?;
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let shown_url = redact_url(request.url);
        let timer = Timer::start(format!("download of {}", shown_url));
        let dir = PathUtils::parent_dir(request.destination);
        PathUtils::ensure_dir_exists(&dir)?;

        let http = request.credentials.apply_to_request(self.client.get(request.url));
        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(Outcome::Cancelled),
            response = http.send() => {
                response.map_err(|e| NetworkErrorHandler::handle_download_error(&e, request.url))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HttpErrorHandler::handle_download_error(status, &error_text, request.url));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let (file, temp_path) = tempfile::Builder::new()
            .prefix(".geo-catalogue-")
            .suffix(".part")
            .tempfile_in(&dir)?
            .into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(url = %shown_url, "download cancelled");
                    return Ok(Outcome::Cancelled);
                }
                chunk = stream.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    file.write_all(&bytes).await?;
                    received += bytes.len() as u64;
                }
                Some(Err(e)) => return Err(NetworkErrorHandler::handle_download_error(&e, request.url)),
                None => break,
            }
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tracing::info!(
            url = %shown_url,
            size = %FormatUtils::format_bytes(received),
            speed = %FormatUtils::format_speed(received, timer.elapsed()),
            "download finished"
        );

        let placement = Placement {
            temp_path,
            destination: request.destination.to_path_buf(),
            content_type,
            file_name: PathUtils::url_file_name(request.url),
            expect_archive: request.expect_archive,
            dataset_id: request.dataset_id.to_string(),
            cancel: cancel.clone(),
        };
        let outcome = tokio::task::spawn_blocking(move || placement.finish())
            .await
            .map_err(|e| CatalogueError::extraction(format!("Extraction task failed: {}", e)))??;

        timer.log_elapsed();
        Ok(outcome)
    }
}

/// Moves a completed download into place; runs on the blocking pool
struct Placement {
    temp_path: TempPath,
    destination: PathBuf,
    content_type: Option<String>,
    file_name: Option<String>,
    expect_archive: bool,
    dataset_id: String,
    cancel: CancelToken,
}

impl Placement {
    fn finish(self) -> Result<Outcome<Vec<PathBuf>>> {
        let head = ArchiveUtils::read_head(&self.temp_path, 512)?;
        let format = ArchiveUtils::detect(self.content_type.as_deref(), self.file_name.as_deref(), &head);

        match format {
            Some(format) => self.extract(format),
            None if self.expect_archive => Err(CatalogueError::extraction(format!(
                "Payload for dataset '{}' is not a recognised archive",
                self.dataset_id
            ))),
            None => {
                if self.cancel.is_cancelled() {
                    return Ok(Outcome::Cancelled);
                }
                self.temp_path.persist(&self.destination).map_err(|e| {
                    CatalogueError::Storage(format!(
                        "Failed to move download to {}: {}",
                        self.destination.display(),
                        e
                    ))
                })?;
                Ok(Outcome::Completed(vec![self.destination]))
            }
        }
    }

    fn extract(self, format: ArchiveFormat) -> Result<Outcome<Vec<PathBuf>>> {
        let base = PathUtils::strip_archive_suffix(&self.destination);
        let dir = PathUtils::parent_dir(&self.destination);
        let staging = tempfile::Builder::new()
            .prefix(".geo-catalogue-extract-")
            .tempdir_in(&dir)?;

        let extracted = ArchiveUtils::extract(&self.temp_path, format, staging.path())?;
        if extracted.is_empty() {
            return Err(CatalogueError::EmptyDataset {
                dataset: self.dataset_id,
            });
        }
        if self.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let target = claim_target(staging.path(), &base)?;

        let files = extracted
            .iter()
            .filter_map(|path| path.strip_prefix(staging.path()).ok())
            .map(|relative| target.join(relative))
            .collect::<Vec<_>>();

        tracing::info!(
            dataset = %self.dataset_id,
            target = %target.display(),
            files = files.len(),
            "archive extracted"
        );
        Ok(Outcome::Completed(files))
    }
}

/// Upper bound on numbered names tried next to an existing extraction target
const MAX_TARGET_ATTEMPTS: usize = 1000;

/// Rename `staging` to `base`, or to the first free `base (n)` when something
/// already lives there. Existing paths are never touched.
fn claim_target(staging: &Path, base: &Path) -> Result<PathBuf> {
    for attempt in 0..MAX_TARGET_ATTEMPTS {
        let candidate = PathUtils::numbered_sibling(base, attempt);
        if candidate.exists() {
            continue;
        }
        match std::fs::rename(staging, &candidate) {
            Ok(()) => return Ok(candidate),
            // Another writer took the name between the check and the rename
            Err(_) if candidate.exists() => continue,
            Err(e) => {
                return Err(CatalogueError::Storage(format!(
                    "Failed to move extracted files to {}: {}",
                    candidate.display(),
                    e
                )));
            }
        }
    }
    Err(CatalogueError::Storage(format!(
        "No free directory name next to {}",
        base.display()
    )))
}
