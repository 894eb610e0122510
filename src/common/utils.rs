//! Common utilities and helper functions
//!
//! Timing, path and formatting helpers shared by the cache, the downloader and
//! the archive extractor.

use crate::error::{CatalogueError, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Timing utilities
pub struct Timer {
    start: Instant,
    description: String,
}

impl Timer {
    /// Start a new timer
    pub fn start(description: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            description: description.into(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Emit the elapsed time as a debug event
    pub fn log_elapsed(&self) {
        tracing::debug!(
            operation = %self.description,
            elapsed = %FormatUtils::format_duration(self.elapsed()),
            "operation finished"
        );
    }
}

/// File and path utilities
pub struct PathUtils;

impl PathUtils {
    /// Ensure directory exists, create if not
    pub fn ensure_dir_exists(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| {
                CatalogueError::Storage(format!(
                    "Failed to create directory {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Directory that holds `path`, falling back to the working directory
    pub fn parent_dir(path: &Path) -> PathBuf {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Lowercased file name of the last URL path segment, without query
    pub fn url_file_name(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let name = parsed.path_segments()?.next_back()?.to_lowercase();
        if name.is_empty() { None } else { Some(name) }
    }

    /// Strip archive suffixes: `roads.tar.gz` -> `roads`
    pub fn strip_archive_suffix(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let lower = name.to_ascii_lowercase();

        for suffix in [".tar.gz", ".tgz", ".tar", ".zip"] {
            if lower.ends_with(suffix) && lower.len() > suffix.len() {
                let stem = &name[..name.len() - suffix.len()];
                return path.with_file_name(stem);
            }
        }

        let mut fallback = path.as_os_str().to_owned();
        fallback.push(".d");
        PathBuf::from(fallback)
    }
}

impl PathUtils {
    /// `base` itself for `n == 0`, otherwise `base (n)` in the same directory
    pub fn numbered_sibling(base: &Path, n: usize) -> PathBuf {
        if n == 0 {
            return base.to_path_buf();
        }
        let name = base
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        base.with_file_name(format!("{} ({})", name, n))
    }
}

/// Format utilities
pub struct FormatUtils;

impl FormatUtils {
    /// Format bytes as human readable size
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

        if bytes == 0 {
            return "0 B".to_string();
        }

        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Format speed in bytes/sec
    pub fn format_speed(bytes: u64, duration: Duration) -> String {
        let secs = duration.as_secs_f64();
        let per_sec = if secs > 0.0 { (bytes as f64 / secs) as u64 } else { bytes };
        format!("{}/s", Self::format_bytes(per_sec))
    }

    /// Format duration as human readable
    pub fn format_duration(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{}h{}m{}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m{}s", minutes, seconds)
        } else if total_secs > 0 {
            format!("{}s", seconds)
        } else {
            format!("{}ms", duration.as_millis())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_format_bytes() {
        assert_eq!(FormatUtils::format_bytes(0), "0 B");
        assert_eq!(FormatUtils::format_bytes(1024), "1.00 KB");
        assert_eq!(FormatUtils::format_bytes(1536), "1.50 KB");
        assert_eq!(FormatUtils::format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(FormatUtils::format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(FormatUtils::format_duration(Duration::from_secs(59)), "59s");
        assert_eq!(FormatUtils::format_duration(Duration::from_secs(61)), "1m1s");
        assert_eq!(FormatUtils::format_duration(Duration::from_secs(3661)), "1h1m1s");
    }

    #[test]
    fn test_url_file_name() {
        assert_eq!(
            PathUtils::url_file_name("https://example.com/files/Roads.ZIP?token=abc"),
            Some("roads.zip".to_string())
        );
        assert_eq!(PathUtils::url_file_name("https://example.com/"), None);
        assert_eq!(PathUtils::url_file_name("not a url"), None);
    }

    #[test]
    fn test_strip_archive_suffix() {
        assert_eq!(
            PathUtils::strip_archive_suffix(Path::new("/data/roads.tar.gz")),
            PathBuf::from("/data/roads")
        );
        assert_eq!(
            PathUtils::strip_archive_suffix(Path::new("/data/Lakes.ZIP")),
            PathBuf::from("/data/Lakes")
        );
        assert_eq!(
            PathUtils::strip_archive_suffix(Path::new("/data/bundle")),
            PathBuf::from("/data/bundle.d")
        );
    }

    #[test]
    fn test_numbered_sibling() {
        let base = Path::new("/data/Documents");
        assert_eq!(PathUtils::numbered_sibling(base, 0), PathBuf::from("/data/Documents"));
        assert_eq!(PathUtils::numbered_sibling(base, 2), PathBuf::from("/data/Documents (2)"));
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(PathUtils::parent_dir(Path::new("file.zip")), PathBuf::from("."));
        assert_eq!(PathUtils::parent_dir(Path::new("/tmp/file.zip")), PathBuf::from("/tmp"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start("test operation");
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed() >= Duration::from_millis(10));
    }
}
