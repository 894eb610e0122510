use crate::auth::{CredentialStore, Credentials};
use crate::catalogue::model::Resource;
use crate::datasource::{AuthScheme, DatasourcePriority};
use crate::error::{CatalogueError, Result};

/// Picks the credentials for one request from the configured store
#[derive(Debug, Clone, Copy)]
pub struct CredentialResolver<'a> {
    store: &'a CredentialStore,
    datasources: &'a DatasourcePriority,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(store: &'a CredentialStore, datasources: &'a DatasourcePriority) -> Self {
        Self { store, datasources }
    }

    /// Credentials for a request to `datasource_id`.
    ///
    /// Unknown datasources and the `none` scheme resolve to anonymous access.
    /// A missing value is only an error when the request is access-gated.
    pub fn resolve_for(&self, datasource_id: &str, gated: bool) -> Result<Credentials> {
        let Some(datasource) = self.datasources.get(datasource_id) else {
            return Ok(Credentials::Anonymous);
        };
        let Some(slot) = self.store.for_scheme(datasource.scheme) else {
            return Ok(Credentials::Anonymous);
        };

        match slot.effective() {
            Some(credentials) => Ok(credentials.clone()),
            None if gated && datasource.scheme.requires_value() => {
                Err(CatalogueError::MissingCredentials {
                    datasource: datasource.id.clone(),
                    scheme: datasource.scheme.to_string(),
                })
            }
            None => Ok(Credentials::Anonymous),
        }
    }

    /// Credentials for `resource`, with gating read from its URL
    pub fn resolve_resource(&self, resource: &Resource) -> Result<Credentials> {
        let scheme = self
            .datasources
            .get(&resource.datasource)
            .map(|d| d.scheme)
            .unwrap_or(AuthScheme::None);
        self.resolve_for(&resource.datasource, scheme.gates_url(resource.url()))
    }
}
