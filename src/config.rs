//! Engine configuration: catalogue endpoint, datasources, provisioning
//! defaults and credentials

use crate::auth::{CredentialStore, Credentials};
use crate::catalogue::model::Protocol;
use crate::datasource::{AuthScheme, Datasource, DatasourcePriority};
use crate::error::handlers::ValidationErrorHandler;
use crate::error::{CatalogueError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CATALOGUE_URL: &str = "https://datakatalog.miljoeportal.dk/api";
pub const DEFAULT_LOCALE: &str = "da";
pub const SUPPORTED_LOCALES: &[&str] = &["da", "en"];
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CRS: &str = "EPSG:25832";
/// Snapshots older than a day are refreshed on startup
pub const DEFAULT_MAX_AGE_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub catalogue_url: String,
    pub locale: String,
    pub timeout_secs: u64,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    pub max_age_secs: u64,
    /// Datasources in priority order, most preferred first
    pub datasources: Vec<Datasource>,
    /// Tie-break between service protocols of the same datasource
    pub protocol_preference: Vec<Protocol>,
    pub crs: String,
    pub restrict_wfs_to_request_bbox: bool,
    #[serde(default)]
    pub credentials: CredentialStore,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalogue_url: DEFAULT_CATALOGUE_URL.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            cache_dir: None,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            datasources: DatasourcePriority::default().datasources().to_vec(),
            protocol_preference: vec![Protocol::Wfs, Protocol::Wmts, Protocol::Wms],
            crs: DEFAULT_CRS.to_string(),
            restrict_wfs_to_request_bbox: true,
            credentials: CredentialStore::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(catalogue_url: impl Into<String>) -> Self {
        Self {
            catalogue_url: catalogue_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `GEO_CATALOGUE_*` environment variables.
    ///
    /// Recognised: `URL`, `LOCALE`, `TIMEOUT`, `CACHE_DIR`, `CRS`,
    /// `DATASOURCE_ORDER` (comma separated ids), `TOKEN`, `LOGIN` and
    /// `PASSWORD`. A token or login given here becomes an enabled override.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("GEO_CATALOGUE_URL") {
            config.catalogue_url = url;
        }
        if let Ok(locale) = env::var("GEO_CATALOGUE_LOCALE") {
            config = config.with_locale(locale);
        }
        if let Ok(timeout) = env::var("GEO_CATALOGUE_TIMEOUT") {
            config.timeout_secs = timeout.trim().parse().map_err(|_| {
                CatalogueError::Validation(format!("Invalid GEO_CATALOGUE_TIMEOUT: {}", timeout))
            })?;
        }
        if let Ok(dir) = env::var("GEO_CATALOGUE_CACHE_DIR") {
            config.cache_dir = Some(PathBuf::from(dir));
        }
        if let Ok(crs) = env::var("GEO_CATALOGUE_CRS") {
            config.crs = crs;
        }
        if let Ok(order) = env::var("GEO_CATALOGUE_DATASOURCE_ORDER") {
            let ids: Vec<String> = order
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            config = config.with_datasource_order(&ids)?;
        }
        if let Ok(token) = env::var("GEO_CATALOGUE_TOKEN") {
            config
                .credentials
                .configure(AuthScheme::BearerToken, Credentials::bearer(token), true)?;
        }
        if let Ok(login) = env::var("GEO_CATALOGUE_LOGIN") {
            let password = env::var("GEO_CATALOGUE_PASSWORD").unwrap_or_default();
            config
                .credentials
                .configure(AuthScheme::BasicLogin, Credentials::basic(login, password), true)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ValidationErrorHandler::validate_endpoint(&self.catalogue_url)?;
        ValidationErrorHandler::validate_timeout(self.timeout_secs)?;
        self.priority()?;

        if self.locale.trim().is_empty() {
            return Err(CatalogueError::Validation("Locale cannot be empty".to_string()));
        }
        if self.crs.trim().is_empty() {
            return Err(CatalogueError::Validation("CRS cannot be empty".to_string()));
        }
        if self.protocol_preference.contains(&Protocol::File) {
            return Err(CatalogueError::Validation(
                "Protocol preference only orders service protocols".to_string(),
            ));
        }
        Ok(())
    }

    pub fn priority(&self) -> Result<DatasourcePriority> {
        DatasourcePriority::new(self.datasources.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Unsupported locales fall back to [`DEFAULT_LOCALE`]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        let locale = locale.into().to_lowercase();
        let short = locale.split(['_', '-']).next().unwrap_or_default();
        self.locale = if SUPPORTED_LOCALES.contains(&short) {
            short.to_string()
        } else {
            DEFAULT_LOCALE.to_string()
        };
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_datasources(mut self, datasources: Vec<Datasource>) -> Self {
        self.datasources = datasources;
        self
    }

    pub fn with_datasource_order(mut self, ordered_ids: &[String]) -> Result<Self> {
        let mut priority = self.priority()?;
        priority.reorder(ordered_ids)?;
        self.datasources = priority.datasources().to_vec();
        Ok(self)
    }

    pub fn with_protocol_preference(mut self, preference: Vec<Protocol>) -> Self {
        self.protocol_preference = preference;
        self
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = crs.into();
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = credentials;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.crs, "EPSG:25832");
        assert_eq!(
            config.protocol_preference,
            vec![Protocol::Wfs, Protocol::Wmts, Protocol::Wms]
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(EngineConfig::new("").validate().is_err());
        assert!(EngineConfig::new("ftp://x").validate().is_err());
        assert!(EngineConfig::default().with_timeout_secs(0).validate().is_err());
        assert!(EngineConfig::default()
            .with_protocol_preference(vec![Protocol::File])
            .validate()
            .is_err());
        assert!(EngineConfig::default().with_datasources(Vec::new()).validate().is_err());
    }

    #[test]
    fn locales_fall_back_to_default() {
        assert_eq!(EngineConfig::default().with_locale("en_US").locale, "en");
        assert_eq!(EngineConfig::default().with_locale("fr").locale, "da");
    }

    #[test]
    fn datasource_order_must_be_a_permutation() {
        let ids = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let config = EngineConfig::default()
            .with_datasource_order(&ids(&["public", "dataforsyningen", "datafordeler"]))
            .unwrap();
        assert_eq!(config.datasources[0].id, "public");
        assert!(EngineConfig::default()
            .with_datasource_order(&ids(&["public"]))
            .is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = EngineConfig::default().with_cache_dir("/tmp/catalogue");
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
