//! Archive detection and extraction for downloaded file resources
//!
//! This module provides [`ArchiveUtils`] for recognising zip, tar and
//! gzip-compressed tar payloads and unpacking them into a directory. Entries
//! that would land outside the target directory are skipped.

use crate::error::{CatalogueError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tar::Archive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
}

/// Archive utilities for detection and extraction
pub struct ArchiveUtils;

impl ArchiveUtils {
    /// Identify an archive by content type, then file name, then magic bytes.
    ///
    /// Tar formats are refined by the gzip magic number so that a mislabeled
    /// `.tar.gz` that is really plain tar still extracts.
    pub fn detect(content_type: Option<&str>, file_name: Option<&str>, head: &[u8]) -> Option<ArchiveFormat> {
        let declared = content_type
            .and_then(Self::format_from_content_type)
            .or_else(|| file_name.and_then(Self::format_from_name))
            .or_else(|| Self::format_from_magic(head))?;

        Some(match declared {
            ArchiveFormat::Tar | ArchiveFormat::TarGz if !head.is_empty() => {
                if Self::is_gzipped(head) {
                    ArchiveFormat::TarGz
                } else {
                    ArchiveFormat::Tar
                }
            }
            other => other,
        })
    }

    pub fn format_from_content_type(content_type: &str) -> Option<ArchiveFormat> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/zip" | "application/x-zip" | "application/x-zip-compressed" => Some(ArchiveFormat::Zip),
            "application/x-tar" => Some(ArchiveFormat::Tar),
            "application/gzip" | "application/x-gzip" | "application/x-gtar" | "application/x-compressed-tar" => {
                Some(ArchiveFormat::TarGz)
            }
            _ => None,
        }
    }

    pub fn format_from_name(name: &str) -> Option<ArchiveFormat> {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }

    pub fn format_from_magic(head: &[u8]) -> Option<ArchiveFormat> {
        if head.starts_with(b"PK\x03\x04") {
            Some(ArchiveFormat::Zip)
        } else if Self::is_gzipped(head) {
            Some(ArchiveFormat::TarGz)
        } else if head.len() >= 262 && &head[257..262] == b"ustar" {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }

    /// Check if data is in gzip format by examining the gzip magic number (0x1f 0x8b)
    pub fn is_gzipped(data: &[u8]) -> bool {
        data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
    }

    /// First `len` bytes of `path`, fewer if the file is shorter
    pub fn read_head(path: &Path, len: usize) -> Result<Vec<u8>> {
        let file = File::open(path)
            .map_err(|e| CatalogueError::Storage(format!("Failed to open {}: {}", path.display(), e)))?;
        let mut head = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut head)?;
        Ok(head)
    }

    /// Unpack `archive_path` into `target_dir` and return the extracted files,
    /// sorted, as paths inside `target_dir`
    pub fn extract(archive_path: &Path, format: ArchiveFormat, target_dir: &Path) -> Result<Vec<PathBuf>> {
        let file = File::open(archive_path).map_err(|e| {
            CatalogueError::extraction(format!("Failed to open archive {}: {}", archive_path.display(), e))
        })?;

        match format {
            ArchiveFormat::Zip => Self::extract_zip(file, target_dir)?,
            ArchiveFormat::Tar => Self::extract_tar(Archive::new(BufReader::new(file)), target_dir)?,
            ArchiveFormat::TarGz => {
                Self::extract_tar(Archive::new(GzDecoder::new(BufReader::new(file))), target_dir)?
            }
        }

        let mut files = Vec::new();
        Self::collect_files(target_dir, &mut files)?;
        files.sort();
        Ok(files)
    }

    fn extract_tar<R: Read>(mut archive: Archive<R>, target_dir: &Path) -> Result<()> {
        archive.set_preserve_permissions(false);

        for entry_result in archive
            .entries()
            .map_err(|e| CatalogueError::extraction(format!("Failed to read tar entries: {}", e)))?
        {
            let mut entry = entry_result
                .map_err(|e| CatalogueError::extraction(format!("Failed to read tar entry: {}", e)))?;

            let path = entry
                .path()
                .map_err(|e| CatalogueError::extraction(format!("Failed to read entry path: {}", e)))?
                .to_string_lossy()
                .to_string();

            let unpacked = entry
                .unpack_in(target_dir)
                .map_err(|e| CatalogueError::extraction(format!("Failed to unpack {}: {}", path, e)))?;
            if !unpacked {
                tracing::warn!(entry = %path, "skipping tar entry outside the target directory");
            }
        }
        Ok(())
    }

    fn extract_zip(file: File, target_dir: &Path) -> Result<()> {
        let mut archive = zip::ZipArchive::new(BufReader::new(file))
            .map_err(|e| CatalogueError::extraction(format!("Failed to read zip archive: {}", e)))?;

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| CatalogueError::extraction(format!("Failed to read zip entry {}: {}", index, e)))?;

            let Some(relative) = entry.enclosed_name() else {
                tracing::warn!(entry = %entry.name(), "skipping zip entry outside the target directory");
                continue;
            };
            let out_path = target_dir.join(relative);

            if entry.is_dir() {
                std::fs::create_dir_all(&out_path)?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&out_path)?;
            std::io::copy(&mut entry, &mut out).map_err(|e| {
                CatalogueError::extraction(format!("Failed to extract {}: {}", out_path.display(), e))
            })?;
        }
        Ok(())
    }

    fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                Self::collect_files(&entry.path(), files)?;
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
        Ok(())
    }
}
