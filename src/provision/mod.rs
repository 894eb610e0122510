//! Turning a chosen dataset resource into something the host can load
//!
//! Service resources become a [`RemoteLayerDescriptor`] without any network
//! traffic. File resources are downloaded (and unpacked) by the
//! [`download::Downloader`].

pub mod archive;
pub mod download;
pub mod select;

pub use archive::{ArchiveFormat, ArchiveUtils};
pub use download::{DownloadRequest, Downloader};
pub use select::{DEFAULT_PROTOCOL_PREFERENCE, select_resource};

use crate::auth::Credentials;
use crate::catalogue::model::{Dataset, Protocol, Resource, ResourceKind};
use crate::common::{CancelToken, Outcome};
use crate::config::{DEFAULT_CRS, EngineConfig};
use crate::error::{CatalogueError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Protocol-specific fields of a remote layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum LayerParams {
    Wms {
        layer: String,
        style: String,
        format: String,
    },
    Wfs {
        type_name: String,
        restrict_to_request_bbox: bool,
    },
    Wmts {
        layer: String,
        tile_matrix: String,
        style: String,
        format: String,
    },
}

/// Everything a host needs to create a live service layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLayerDescriptor {
    pub dataset_id: String,
    pub title: String,
    pub description: String,
    /// Credentials already applied
    pub url: String,
    pub crs: String,
    pub params: LayerParams,
}

impl RemoteLayerDescriptor {
    pub fn protocol(&self) -> Protocol {
        match self.params {
            LayerParams::Wms { .. } => Protocol::Wms,
            LayerParams::Wfs { .. } => Protocol::Wfs,
            LayerParams::Wmts { .. } => Protocol::Wmts,
        }
    }

    pub fn label(&self) -> &'static str {
        self.protocol().label()
    }

    /// Data source parameters in the key vocabulary GIS hosts use for OGC
    /// layers, in a stable order
    pub fn uri_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("url", self.url.clone())];
        match &self.params {
            LayerParams::Wms { layer, style, format } => {
                params.push(("layers", layer.clone()));
                params.push(("styles", style.clone()));
                params.push(("format", format.clone()));
                params.push(("crs", self.crs.clone()));
            }
            LayerParams::Wfs {
                type_name,
                restrict_to_request_bbox,
            } => {
                params.push(("typename", type_name.clone()));
                params.push(("srsname", self.crs.clone()));
                if *restrict_to_request_bbox {
                    params.push(("restrictToRequestBBOX", "1".to_string()));
                }
            }
            LayerParams::Wmts {
                layer,
                tile_matrix,
                style,
                format,
            } => {
                params.push(("layers", layer.clone()));
                params.push(("styles", style.clone()));
                params.push(("format", format.clone()));
                params.push(("tileMatrixSet", tile_matrix.clone()));
                params.push(("crs", self.crs.clone()));
            }
        }
        params
    }
}

/// What provisioning produced for the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionResult {
    RemoteLayer(RemoteLayerDescriptor),
    /// Downloaded or extracted files, sorted
    Files(Vec<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOptions {
    pub crs: String,
    pub restrict_wfs_to_request_bbox: bool,
    pub connect_timeout: Duration,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            crs: DEFAULT_CRS.to_string(),
            restrict_wfs_to_request_bbox: true,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&EngineConfig> for ProvisionOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            crs: config.crs.clone(),
            restrict_wfs_to_request_bbox: config.restrict_wfs_to_request_bbox,
            connect_timeout: config.timeout(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceProvisioner {
    options: ProvisionOptions,
    downloader: Downloader,
}

impl ResourceProvisioner {
    pub fn new(options: ProvisionOptions) -> Result<Self> {
        let downloader = Downloader::new(options.connect_timeout)?;
        Ok(Self { options, downloader })
    }

    pub fn options(&self) -> &ProvisionOptions {
        &self.options
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    /// Build the layer descriptor for a service resource.
    ///
    /// Fails with `Validation` for file resources.
    pub fn describe(
        &self,
        dataset: &Dataset,
        resource: &Resource,
        credentials: &Credentials,
    ) -> Result<RemoteLayerDescriptor> {
        let url = credentials.apply_to_url(resource.url())?;
        let (url, params) = match &resource.kind {
            ResourceKind::Wms {
                layer, style, format, ..
            } => (
                url,
                LayerParams::Wms {
                    layer: layer.clone(),
                    style: style.clone(),
                    format: format.clone(),
                },
            ),
            ResourceKind::Wfs { type_name, .. } => (
                url,
                LayerParams::Wfs {
                    type_name: type_name.clone(),
                    restrict_to_request_bbox: self.options.restrict_wfs_to_request_bbox,
                },
            ),
            ResourceKind::Wmts {
                layer,
                tile_matrix,
                style,
                format,
                ..
            } => (
                with_capabilities_request(&url),
                LayerParams::Wmts {
                    layer: layer.clone(),
                    tile_matrix: tile_matrix.clone(),
                    style: style.clone(),
                    format: format.clone(),
                },
            ),
            ResourceKind::File { .. } => {
                return Err(CatalogueError::Validation(format!(
                    "Dataset '{}' resource is a file and has no layer descriptor",
                    dataset.id
                )));
            }
        };

        Ok(RemoteLayerDescriptor {
            dataset_id: dataset.id.clone(),
            title: dataset.title.clone(),
            description: dataset.description.clone(),
            url,
            crs: self.options.crs.clone(),
            params,
        })
    }

    /// Provision `resource` of `dataset`.
    ///
    /// Service resources never touch the network and never need
    /// `destination`. File resources require it.
    pub async fn provision(
        &self,
        dataset: &Dataset,
        resource: &Resource,
        credentials: &Credentials,
        destination: Option<&Path>,
        cancel: &CancelToken,
    ) -> Result<Outcome<ProvisionResult>> {
        let ResourceKind::File { url, is_archive, .. } = &resource.kind else {
            let descriptor = self.describe(dataset, resource, credentials)?;
            tracing::info!(
                dataset = %dataset.id,
                protocol = descriptor.label(),
                "remote layer described"
            );
            return Ok(Outcome::Completed(ProvisionResult::RemoteLayer(descriptor)));
        };

        let destination = destination.ok_or_else(|| {
            CatalogueError::Validation(format!("A destination is required to download dataset '{}'", dataset.id))
        })?;
        let url = credentials.apply_to_url(url)?;
        let request = DownloadRequest {
            dataset_id: &dataset.id,
            url: &url,
            credentials,
            destination,
            expect_archive: *is_archive,
        };

        let outcome = self.downloader.download(request, cancel).await?;
        Ok(outcome.map(ProvisionResult::Files))
    }
}

/// Make `url` a WMTS GetCapabilities request.
///
/// `SERVICE` and `REQUEST` keys match case-insensitively; existing ones get
/// the capabilities values, missing ones are appended. Other query pairs keep
/// their order. URLs that already ask for capabilities are returned as is.
pub fn with_capabilities_request(url: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(url) else {
        return url.to_string();
    };
    let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    let value_of = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    };
    let service = value_of("service");
    let request = value_of("request");
    if service.is_some_and(|v| v.eq_ignore_ascii_case("wmts"))
        && request.is_some_and(|v| v.eq_ignore_ascii_case("getcapabilities"))
    {
        return url.to_string();
    }
    let (has_service, has_request) = (service.is_some(), request.is_some());

    let mut completed: Vec<(String, String)> = pairs
        .into_iter()
        .map(|(key, value)| {
            if key.eq_ignore_ascii_case("service") {
                (key, "WMTS".to_string())
            } else if key.eq_ignore_ascii_case("request") {
                (key, "GetCapabilities".to_string())
            } else {
                (key, value)
            }
        })
        .collect();
    if !has_service {
        completed.push(("SERVICE".to_string(), "WMTS".to_string()));
    }
    if !has_request {
        completed.push(("REQUEST".to_string(), "GetCapabilities".to_string()));
    }

    parsed.query_pairs_mut().clear().extend_pairs(completed);
    parsed.to_string()
}
