//! Error types for catalogue, credential and provisioning operations

pub mod handlers;

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogueError>;

/// Every failure the engine reports to its host.
///
/// The type is `Clone` because one refresh outcome is handed to every caller
/// that joined the in-flight refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogueError {
    /// Transport errors and non-success HTTP statuses from the catalogue API
    #[error("Network request failed: {message}")]
    NetworkFailure { message: String },
    /// Malformed catalogue payloads
    #[error("Failed to parse catalogue data: {message}")]
    ParseFailure { message: String },
    /// The datasource needs credentials that are not configured
    #[error("Missing {scheme} credentials for datasource '{datasource}'")]
    MissingCredentials { datasource: String, scheme: String },
    /// The dataset has no resource matching the requested protocols
    #[error("No layers available for dataset '{dataset}'")]
    NoResourceAvailable { dataset: String },
    #[error("Download failed: {message}")]
    DownloadFailed { message: String },
    #[error("Extraction failed: {message}")]
    ExtractionFailed { message: String },
    /// Extraction succeeded but produced no files
    #[error("Dataset '{dataset}' contains no files")]
    EmptyDataset { dataset: String },
    /// Invalid configuration or caller input
    #[error("Validation error: {0}")]
    Validation(String),
    /// Persistent key-value storage and disk cache errors
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),
    /// Another download already targets this path
    #[error("Destination {} is already being written", .0.display())]
    DestinationBusy(PathBuf),
    /// A host capability reported a failure
    #[error("Host error: {0}")]
    Host(String),
}

impl CatalogueError {
    pub fn network(message: impl Into<String>) -> Self {
        CatalogueError::NetworkFailure {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        CatalogueError::ParseFailure {
            message: message.into(),
        }
    }

    pub fn download(message: impl Into<String>) -> Self {
        CatalogueError::DownloadFailed {
            message: message.into(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        CatalogueError::ExtractionFailed {
            message: message.into(),
        }
    }

    /// Failures that leave the catalogue usable in offline mode
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CatalogueError::NetworkFailure { .. } | CatalogueError::DownloadFailed { .. }
        )
    }
}

impl From<std::io::Error> for CatalogueError {
    fn from(err: std::io::Error) -> Self {
        CatalogueError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CatalogueError {
    fn from(err: serde_json::Error) -> Self {
        CatalogueError::parse(err.to_string())
    }
}

impl From<reqwest::Error> for CatalogueError {
    fn from(err: reqwest::Error) -> Self {
        handlers::NetworkErrorHandler::handle_network_error(&err, "catalogue request")
    }
}

impl From<url::ParseError> for CatalogueError {
    fn from(err: url::ParseError) -> Self {
        CatalogueError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_subject() {
        let err = CatalogueError::MissingCredentials {
            datasource: "datafordeler".to_string(),
            scheme: "basic-login".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing basic-login credentials for datasource 'datafordeler'"
        );

        let err = CatalogueError::NoResourceAvailable {
            dataset: "d2".to_string(),
        };
        assert_eq!(err.to_string(), "No layers available for dataset 'd2'");
    }

    #[test]
    fn io_errors_become_storage_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(CatalogueError::from(io), CatalogueError::Storage(_)));
    }

    #[test]
    fn only_network_side_failures_are_transient() {
        assert!(CatalogueError::network("timeout").is_transient());
        assert!(CatalogueError::download("reset").is_transient());
        assert!(!CatalogueError::parse("bad json").is_transient());
        assert!(!CatalogueError::Validation("x".into()).is_transient());
    }
}
