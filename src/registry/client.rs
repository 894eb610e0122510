// RegistryClient fetches the three catalogue documents concurrently and turns
// them into one Snapshot. It holds no catalogue state of its own.

use crate::auth::Credentials;
use crate::catalogue::model::Snapshot;
use crate::common::Timer;
use crate::config::{DEFAULT_LOCALE, DEFAULT_TIMEOUT_SECS, EngineConfig};
use crate::datasource::DatasourcePriority;
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler, ValidationErrorHandler};
use crate::error::{CatalogueError, Result};
use crate::registry::CatalogueSource;
use crate::registry::wire::{Document, build_snapshot};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const DATASETS_INCLUDE: &str = "wfsSource,wmsSource,wmtsSource,fileSources,category,tags,owners,thumbnail,fileSources.fileSourceType";
const COLLECTIONS_INCLUDE: &str = "datasetCollectionItems,datasetCollectionItems.dataset";

pub struct RegistryClientBuilder {
    endpoint: String,
    locale: String,
    timeout: Duration,
    credentials: Option<Credentials>,
    datasources: DatasourcePriority,
}

impl RegistryClientBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            locale: DEFAULT_LOCALE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            credentials: None,
            datasources: DatasourcePriority::default(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Credentials for the catalogue endpoint itself, sent as an auth header
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_datasources(mut self, datasources: DatasourcePriority) -> Self {
        self.datasources = datasources;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        let endpoint = ValidationErrorHandler::validate_endpoint(&self.endpoint)?;
        ValidationErrorHandler::validate_timeout(self.timeout.as_secs().max(1))?;

        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("geo-catalogue/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CatalogueError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(RegistryClient {
            client,
            endpoint: endpoint.as_str().trim_end_matches('/').to_string(),
            locale: self.locale,
            credentials: self.credentials,
            datasources: self.datasources,
        })
    }
}

pub struct RegistryClient {
    client: Client,
    endpoint: String,
    locale: String,
    credentials: Option<Credentials>,
    datasources: DatasourcePriority,
}

impl RegistryClient {
    pub fn builder(endpoint: impl Into<String>) -> RegistryClientBuilder {
        RegistryClientBuilder::new(endpoint)
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::builder(config.catalogue_url.clone())
            .with_locale(config.locale.clone())
            .with_timeout(config.timeout())
            .with_datasources(config.priority()?)
            .build()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch from the configured endpoint
    pub async fn fetch(&self) -> Result<Snapshot> {
        self.fetch_catalogue_from(&self.endpoint, self.credentials.as_ref())
            .await
    }

    /// Fetch the catalogue tree rooted at `endpoint`.
    ///
    /// Dataset and collection documents are required; the availability
    /// document is best effort. Dropping the future abandons the requests.
    pub async fn fetch_catalogue_from(
        &self,
        endpoint: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Snapshot> {
        let base = ValidationErrorHandler::validate_endpoint(endpoint)?;
        let base = base.as_str().trim_end_matches('/');
        let timer = Timer::start(format!("catalogue fetch from {}", base));

        let datasets_url = format!(
            "{}/datasets?include={}&locale={}",
            base, DATASETS_INCLUDE, self.locale
        );
        let collections_url = format!(
            "{}/datasetCollections?include={}&locale={}",
            base, COLLECTIONS_INCLUDE, self.locale
        );
        let availability_url = format!("{}/datasetAvailabilities?locale={}", base, self.locale);

        let (datasets, collections, availability) = tokio::join!(
            self.get_document(&datasets_url, "datasets", credentials),
            self.get_document(&collections_url, "collections", credentials),
            self.get_document(&availability_url, "availability", credentials),
        );
        let datasets = datasets?;
        let collections = collections?;
        let availability = match availability {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!(error = %e, "dataset availability unavailable, continuing without statuses");
                None
            }
        };

        let snapshot = build_snapshot(&datasets, &collections, availability.as_ref(), &self.datasources);
        tracing::info!(
            datasets = snapshot.len(),
            collections = snapshot.collections.len(),
            "catalogue fetched"
        );
        timer.log_elapsed();
        Ok(snapshot)
    }

    async fn get_document(
        &self,
        url: &str,
        context: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Document> {
        tracing::debug!(url, "requesting catalogue document");
        let mut request = self.client.get(url).header("Accept", "application/vnd.api+json, application/json");
        if let Some(credentials) = credentials {
            request = credentials.apply_to_request(request);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, context))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HttpErrorHandler::handle_catalogue_error(status, &error_text, context));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, context))?;
        Document::from_slice(&body, context)
    }
}

#[async_trait]
impl CatalogueSource for RegistryClient {
    async fn fetch_catalogue(&self) -> Result<Snapshot> {
        self.fetch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_validates_endpoint() {
        assert!(RegistryClient::builder("").build().is_err());
        assert!(RegistryClient::builder("file:///tmp/api").build().is_err());

        let client = RegistryClient::builder("https://catalogue.example/api/").build().unwrap();
        assert_eq!(client.endpoint(), "https://catalogue.example/api");
    }

    #[test]
    fn client_from_default_config() {
        let client = RegistryClient::from_config(&EngineConfig::default()).unwrap();
        assert_eq!(client.endpoint(), "https://datakatalog.miljoeportal.dk/api");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_failure() {
        let client = RegistryClient::builder("http://127.0.0.1:9")
            .with_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err, CatalogueError::NetworkFailure { .. }));
    }
}
