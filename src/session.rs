//! Host-facing entry point
//!
//! A [`CatalogueSession`] owns one cache, the favorites and the user's
//! credential and datasource settings for one catalogue. Hosts drive it from
//! their UI and receive results through [`HostCapabilities`].

use crate::auth::{CredentialResolver, CredentialStore, Credentials};
use crate::catalogue::{
    CatalogueCache, Collection, Dataset, DatasetFilter, GroupBy, LocalStatus, ProtocolFilter, RefreshReport,
    Resource, Snapshot,
};
use crate::common::{CancelToken, Outcome};
use crate::config::EngineConfig;
use crate::datasource::{AuthScheme, DatasourcePriority};
use crate::error::{CatalogueError, Result};
use crate::favorites::FavoritesStore;
use crate::provision::{ProvisionOptions, ProvisionResult, RemoteLayerDescriptor, ResourceProvisioner, select_resource};
use crate::registry::{CatalogueSource, RegistryClient};
use crate::storage::{KeyValueStore, load_json, store_json};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

pub const CREDENTIALS_KEY: &str = "credentials";
pub const DATASOURCE_PRIORITY_KEY: &str = "datasource_priority";

/// Services the host application provides to the engine
#[async_trait]
pub trait HostCapabilities: Send + Sync {
    async fn create_remote_layer(&self, descriptor: &RemoteLayerDescriptor) -> Result<()>;

    async fn load_files_as_layers(&self, paths: &[PathBuf]) -> Result<()>;

    /// Where to save a file resource; `None` means the user cancelled
    async fn choose_destination_path(&self, dataset: &Dataset, resource: &Resource) -> Option<PathBuf>;
}

#[derive(Debug, Clone)]
struct Settings {
    credentials: CredentialStore,
    priority: DatasourcePriority,
}

pub struct CatalogueSession {
    config: EngineConfig,
    cache: CatalogueCache,
    favorites: FavoritesStore,
    store: Arc<dyn KeyValueStore>,
    host: Arc<dyn HostCapabilities>,
    provisioner: ResourceProvisioner,
    settings: RwLock<Settings>,
}

impl CatalogueSession {
    /// Session fetching from the catalogue API named in `config`
    pub fn new(config: EngineConfig, store: Arc<dyn KeyValueStore>, host: Arc<dyn HostCapabilities>) -> Result<Self> {
        config.validate()?;
        let client = RegistryClient::from_config(&config)?;
        Self::with_source(config, Arc::new(client), store, host)
    }

    /// Session over any catalogue source
    pub fn with_source(
        config: EngineConfig,
        source: Arc<dyn CatalogueSource>,
        store: Arc<dyn KeyValueStore>,
        host: Arc<dyn HostCapabilities>,
    ) -> Result<Self> {
        config.validate()?;

        let credentials: CredentialStore =
            load_json(store.as_ref(), CREDENTIALS_KEY)?.unwrap_or_else(|| config.credentials.clone());
        let mut priority = config.priority()?;
        if let Some(order) = load_json::<Vec<String>>(store.as_ref(), DATASOURCE_PRIORITY_KEY)? {
            if let Err(e) = priority.reorder(&order) {
                tracing::warn!(error = %e, "ignoring stored datasource order that no longer matches the configuration");
            }
        }

        let favorites = FavoritesStore::load(Arc::clone(&store))?;
        let mut cache = CatalogueCache::new(source).with_favorites(favorites.ids());
        if let Some(dir) = &config.cache_dir {
            cache = cache.with_cache_dir(dir.clone());
        }
        let provisioner = ResourceProvisioner::new(ProvisionOptions::from(&config))?;

        tracing::debug!(
            endpoint = %config.catalogue_url,
            datasources = ?priority.ids(),
            "catalogue session created"
        );

        Ok(Self {
            config,
            cache,
            favorites,
            store,
            host,
            provisioner,
            settings: RwLock::new(Settings { credentials, priority }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &CatalogueCache {
        &self.cache
    }

    /// Restore the snapshot saved by an earlier session, if caching is on
    pub async fn load_cached(&self) -> Result<Option<Arc<Snapshot>>> {
        self.cache.load_persisted().await
    }

    pub async fn refresh_catalogue(&self) -> RefreshReport {
        self.cache.refresh().await
    }

    /// Refresh, giving up the wait when the requesting view goes away
    pub async fn refresh_catalogue_cancellable(&self, cancel: &CancelToken) -> Outcome<RefreshReport> {
        self.cache.refresh_cancellable(cancel).await
    }

    /// Refresh only when the view is missing, too old or after a failure
    pub async fn refresh_if_stale(&self) -> Option<RefreshReport> {
        if self.is_stale() {
            Some(self.cache.refresh().await)
        } else {
            None
        }
    }

    pub fn is_stale(&self) -> bool {
        self.cache.is_stale(self.config.max_age())
    }

    /// Matching datasets ordered by title; empty before the first snapshot
    pub fn query_catalogue(&self, filter: &DatasetFilter) -> Vec<Dataset> {
        self.cache
            .index()
            .map(|index| index.query(filter).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn group_catalogue(&self, filter: &DatasetFilter, key: GroupBy) -> BTreeMap<String, Vec<Dataset>> {
        self.cache
            .index()
            .map(|index| {
                index
                    .group_matching(filter, key)
                    .into_iter()
                    .map(|(group, datasets)| (group, datasets.into_iter().cloned().collect()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn collections(&self) -> Vec<Collection> {
        self.cache
            .current()
            .map(|snapshot| snapshot.collections.clone())
            .unwrap_or_default()
    }

    pub fn collection_members(&self, collection_id: &str) -> Result<Vec<Dataset>> {
        let index = self
            .cache
            .index()
            .ok_or_else(|| CatalogueError::UnknownDataset(collection_id.to_string()))?;
        let collection = index
            .collections()
            .iter()
            .find(|c| c.id == collection_id)
            .ok_or_else(|| CatalogueError::UnknownDataset(collection_id.to_string()))?;
        Ok(index.collection_members(collection).into_iter().cloned().collect())
    }

    pub fn dataset(&self, id: &str) -> Option<Dataset> {
        self.cache.index().and_then(|index| index.dataset(id).cloned())
    }

    /// Flip the favorite flag of `id`, persisted before returning
    pub fn toggle_favorite(&self, id: &str) -> Result<bool> {
        let favorite = self.favorites.toggle(id)?;
        self.cache.set_favorite(id, favorite);
        tracing::debug!(dataset = id, favorite, "favorite toggled");
        Ok(favorite)
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.favorites.is_favorite(id)
    }

    /// Pick, authorize and provision a resource of dataset `id`, then hand
    /// the result to the host.
    ///
    /// A user declining the destination dialog or cancelling `cancel` yields
    /// [`Outcome::Cancelled`].
    pub async fn provision_dataset(
        &self,
        id: &str,
        filter: ProtocolFilter,
        cancel: &CancelToken,
    ) -> Result<Outcome<ProvisionResult>> {
        let dataset = self
            .dataset(id)
            .ok_or_else(|| CatalogueError::UnknownDataset(id.to_string()))?;

        let (resource, credentials) = {
            let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
            let resource = select_resource(&dataset, &settings.priority, filter, &self.config.protocol_preference)?.clone();
            let credentials = CredentialResolver::new(&settings.credentials, &settings.priority)
                .resolve_resource(&resource)?;
            (resource, credentials)
        };
        tracing::info!(
            dataset = id,
            protocol = resource.protocol().label(),
            datasource = %resource.datasource,
            "provisioning dataset"
        );

        let result = self.provision_resource(&dataset, &resource, &credentials, cancel).await;
        match &result {
            Ok(Outcome::Completed(ProvisionResult::RemoteLayer(_))) => {
                self.record(id, LocalStatus::LayerAdded);
            }
            Ok(Outcome::Completed(ProvisionResult::Files(paths))) => {
                self.record(id, LocalStatus::Downloaded { paths: paths.clone() });
            }
            Ok(Outcome::Cancelled) => tracing::info!(dataset = id, "provisioning cancelled"),
            Err(e) => {
                tracing::warn!(dataset = id, error = %e, "provisioning failed");
                self.record(id, LocalStatus::Failed { message: e.to_string() });
            }
        }
        result
    }

    async fn provision_resource(
        &self,
        dataset: &Dataset,
        resource: &Resource,
        credentials: &Credentials,
        cancel: &CancelToken,
    ) -> Result<Outcome<ProvisionResult>> {
        let destination = if resource.is_ows() {
            None
        } else {
            match self.host.choose_destination_path(dataset, resource).await {
                Some(path) => Some(path),
                None => return Ok(Outcome::Cancelled),
            }
        };

        let outcome = self
            .provisioner
            .provision(dataset, resource, credentials, destination.as_deref(), cancel)
            .await?;

        if let Outcome::Completed(result) = &outcome {
            match result {
                ProvisionResult::RemoteLayer(descriptor) => self.host.create_remote_layer(descriptor).await?,
                ProvisionResult::Files(paths) => self.host.load_files_as_layers(paths).await?,
            }
        }
        Ok(outcome)
    }

    fn record(&self, id: &str, status: LocalStatus) {
        if let Err(e) = self.cache.annotate(id, status) {
            tracing::debug!(dataset = id, error = %e, "could not record local status");
        }
    }

    /// Set the credential override for `scheme`, persisted before returning
    pub fn configure_credentials(&self, scheme: AuthScheme, value: Credentials, override_enabled: bool) -> Result<()> {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let mut credentials = settings.credentials.clone();
        credentials.configure(scheme, value, override_enabled)?;
        store_json(self.store.as_ref(), CREDENTIALS_KEY, &credentials)?;
        settings.credentials = credentials;
        tracing::info!(scheme = %scheme, override_enabled, "credentials configured");
        Ok(())
    }

    /// Reorder datasources; `ordered_ids` must be a permutation of the known
    /// ids. Persisted before returning.
    pub fn reorder_datasource_priority(&self, ordered_ids: &[String]) -> Result<()> {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let mut priority = settings.priority.clone();
        priority.reorder(ordered_ids)?;
        store_json(self.store.as_ref(), DATASOURCE_PRIORITY_KEY, &priority.ids())?;
        settings.priority = priority;
        tracing::info!(order = ?ordered_ids, "datasource priority changed");
        Ok(())
    }

    pub fn datasource_priority(&self) -> DatasourcePriority {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .priority
            .clone()
    }

    pub fn credentials(&self) -> CredentialStore {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .credentials
            .clone()
    }
}
