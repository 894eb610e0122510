//! Geo Catalogue Library
//!
//! Catalogue engine for geospatial dataset browsers. It fetches a remote
//! dataset catalogue, keeps the last good snapshot with a filterable index,
//! resolves credentials per datasource and turns a chosen dataset into a
//! service layer descriptor or a downloaded file set.

pub mod auth;
pub mod catalogue;
pub mod common;
pub mod config;
pub mod datasource;
pub mod error;
pub mod favorites;
pub mod logging;
pub mod provision;
pub mod registry;
pub mod session;
pub mod storage;

pub use auth::{CredentialResolver, CredentialStore, Credentials, redact_url};
pub use catalogue::{
    CatalogueCache, CatalogueIndex, Collection, Dataset, DatasetFilter, GroupBy, LocalStatus, Protocol,
    ProtocolFilter, RefreshReport, Resource, ResourceKind, Snapshot,
};
pub use common::{CancelToken, Outcome};
pub use config::EngineConfig;
pub use datasource::{AuthScheme, Datasource, DatasourcePriority};
pub use error::{CatalogueError, Result};
pub use favorites::FavoritesStore;
pub use provision::{ProvisionResult, RemoteLayerDescriptor, ResourceProvisioner};
pub use registry::{CatalogueSource, RegistryClient};
pub use session::{CatalogueSession, HostCapabilities};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
