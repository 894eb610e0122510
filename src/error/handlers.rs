//! Standardized mapping from HTTP statuses and transport errors to catalogue errors

use crate::auth::redact_url;
use crate::error::CatalogueError;
use reqwest::StatusCode;

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Handle a non-success response from the catalogue API
    pub fn handle_catalogue_error(status: StatusCode, error_text: &str, context: &str) -> CatalogueError {
        let error_msg = match status.as_u16() {
            401 => format!("Unauthorized to fetch {}: {}", context, error_text),
            403 => format!("Access denied for {}: {}", context, error_text),
            404 => format!("Catalogue endpoint not found for {}: {}", context, error_text),
            429 => format!("Rate limited while fetching {}: {}", context, error_text),
            500 => format!("Catalogue server error during {}: {}", context, error_text),
            502 | 503 => format!("Catalogue unavailable for {}: {}", context, error_text),
            504 => format!("Catalogue gateway timeout for {}", context),
            _ => format!("{} failed (status {}): {}", context, status, error_text),
        };

        CatalogueError::network(error_msg)
    }

    /// Handle a non-success response while downloading a file resource
    pub fn handle_download_error(status: StatusCode, error_text: &str, url: &str) -> CatalogueError {
        let url = redact_url(url);
        let error_msg = match status.as_u16() {
            401 => format!("Credentials rejected by {}", url),
            403 => format!("Permission denied for {}", url),
            404 => format!("File not found: {}", url),
            408 | 504 => format!("Download timed out: {}", url),
            500 => format!("Server error while downloading {}: {}", url, error_text),
            502 | 503 => format!("Server temporarily unavailable: {}", url),
            _ => format!("Download of {} failed (status {}): {}", url, status, error_text),
        };

        CatalogueError::download(error_msg)
    }
}

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Categorize and format transport errors with helpful context
    pub fn handle_network_error(error: &reqwest::Error, context: &str) -> CatalogueError {
        let context = redact_url(context);
        let mut detail = error.to_string();
        if let Some(url) = error.url() {
            detail = detail.replace(url.as_str(), &redact_url(url.as_str()));
        }

        let message = if error.is_timeout() {
            format!("{} timed out: {}", context, detail)
        } else if error.is_connect() {
            format!("Connection error during {}: {}", context, detail)
        } else if error.is_decode() || error.is_body() {
            format!("Interrupted response during {}: {}", context, detail)
        } else {
            format!("{} network error: {}", context, detail)
        };

        CatalogueError::network(message)
    }

    /// Same categorization, reported as a download failure
    pub fn handle_download_error(error: &reqwest::Error, url: &str) -> CatalogueError {
        match Self::handle_network_error(error, url) {
            CatalogueError::NetworkFailure { message } => CatalogueError::download(message),
            other => other,
        }
    }
}

/// Validation error utilities
pub struct ValidationErrorHandler;

impl ValidationErrorHandler {
    /// Catalogue endpoints must be absolute http(s) URLs
    pub fn validate_endpoint(endpoint: &str) -> crate::error::Result<url::Url> {
        if endpoint.trim().is_empty() {
            return Err(CatalogueError::Validation(
                "Catalogue URL cannot be empty".to_string(),
            ));
        }

        let url = url::Url::parse(endpoint)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CatalogueError::Validation(format!(
                "Invalid catalogue URL: {}. Must start with http:// or https://",
                endpoint
            )));
        }

        Ok(url)
    }

    /// Standard numeric range validation
    pub fn validate_timeout(timeout: u64) -> crate::error::Result<()> {
        if timeout == 0 {
            return Err(CatalogueError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if timeout > 3600 {
            return Err(CatalogueError::Validation(
                "Timeout cannot exceed one hour (3600 seconds)".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_statuses_map_to_network_failures() {
        let err = HttpErrorHandler::handle_catalogue_error(StatusCode::SERVICE_UNAVAILABLE, "", "datasets");
        match err {
            CatalogueError::NetworkFailure { message } => assert!(message.contains("unavailable")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn download_statuses_map_to_download_failures() {
        let err = HttpErrorHandler::handle_download_error(StatusCode::NOT_FOUND, "", "http://x/f.zip");
        assert_eq!(err, CatalogueError::download("File not found: http://x/f.zip"));
    }

    #[test]
    fn download_errors_never_carry_credentials() {
        let err = HttpErrorHandler::handle_download_error(
            StatusCode::UNAUTHORIZED,
            "",
            "https://api.dataforsyningen.dk/f.zip?token=SECRET123",
        );
        let message = err.to_string();
        assert!(!message.contains("SECRET123"));
        assert!(message.contains("token=REDACTED"));
    }

    #[test]
    fn endpoints_must_be_http() {
        assert!(ValidationErrorHandler::validate_endpoint("").is_err());
        assert!(ValidationErrorHandler::validate_endpoint("ftp://example.com/api").is_err());
        assert!(ValidationErrorHandler::validate_endpoint("not a url").is_err());
        assert!(ValidationErrorHandler::validate_endpoint("https://example.com/api").is_ok());
    }

    #[test]
    fn timeouts_are_bounded() {
        assert!(ValidationErrorHandler::validate_timeout(0).is_err());
        assert!(ValidationErrorHandler::validate_timeout(30).is_ok());
        assert!(ValidationErrorHandler::validate_timeout(7200).is_err());
    }
}
