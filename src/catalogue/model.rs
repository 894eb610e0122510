//! Catalogue data model: datasets, resources, collections and snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

/// Resource protocol; the display label is an explicit mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Wms,
    Wfs,
    Wmts,
    File,
}

impl Protocol {
    /// Label shown by host UIs
    pub fn label(self) -> &'static str {
        match self {
            Protocol::Wms => "WMS",
            Protocol::Wfs => "WFS",
            Protocol::Wmts => "WMTS",
            Protocol::File => "File",
        }
    }

    /// Stable key used in configuration
    pub fn key(self) -> &'static str {
        match self {
            Protocol::Wms => "wms",
            Protocol::Wfs => "wfs",
            Protocol::Wmts => "wmts",
            Protocol::File => "file",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "wms" => Some(Protocol::Wms),
            "wfs" => Some(Protocol::Wfs),
            "wmts" => Some(Protocol::Wmts),
            "file" => Some(Protocol::File),
            _ => None,
        }
    }

    pub fn is_ows(self) -> bool {
        self != Protocol::File
    }
}

/// Which resource kinds a caller accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFilter {
    #[default]
    All,
    Ows,
    File,
}

impl ProtocolFilter {
    pub fn matches(self, protocol: Protocol) -> bool {
        match self {
            ProtocolFilter::All => true,
            ProtocolFilter::Ows => protocol.is_ows(),
            ProtocolFilter::File => protocol == Protocol::File,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ResourceKind {
    Wms {
        url: String,
        layer: String,
        style: String,
        format: String,
    },
    Wfs {
        url: String,
        type_name: String,
    },
    Wmts {
        url: String,
        layer: String,
        tile_matrix: String,
        #[serde(default)]
        style: String,
        #[serde(default)]
        format: String,
    },
    File {
        url: String,
        is_archive: bool,
        /// Format label from the catalogue, e.g. "SHP" or "TAB"
        #[serde(default)]
        file_type: Option<String>,
    },
}

/// A concrete access point of a dataset, owned by one datasource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub datasource: String,
    #[serde(flatten)]
    pub kind: ResourceKind,
}

impl Resource {
    pub fn new(datasource: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            datasource: datasource.into(),
            kind,
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self.kind {
            ResourceKind::Wms { .. } => Protocol::Wms,
            ResourceKind::Wfs { .. } => Protocol::Wfs,
            ResourceKind::Wmts { .. } => Protocol::Wmts,
            ResourceKind::File { .. } => Protocol::File,
        }
    }

    pub fn url(&self) -> &str {
        match &self.kind {
            ResourceKind::Wms { url, .. }
            | ResourceKind::Wfs { url, .. }
            | ResourceKind::Wmts { url, .. }
            | ResourceKind::File { url, .. } => url,
        }
    }

    pub fn is_ows(&self) -> bool {
        self.protocol().is_ows()
    }
}

/// Annotation the engine or host keeps on a dataset across refreshes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LocalStatus {
    LayerAdded,
    Downloaded { paths: Vec<PathBuf> },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub support_contact: Option<String>,
    #[serde(default)]
    pub metadata_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    /// Availability status reported by the catalogue
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub local_status: Option<LocalStatus>,
}

impl Dataset {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn has_ows_source(&self) -> bool {
        self.resources.iter().any(Resource::is_ows)
    }

    pub fn has_files(&self) -> bool {
        self.resources.iter().any(|r| r.protocol() == Protocol::File)
    }

    /// Whether the dataset offers anything a caller with `filter` can load
    pub fn offers(&self, filter: ProtocolFilter) -> bool {
        self.resources.iter().any(|r| filter.matches(r.protocol()))
    }

    /// Distinct datasource ids of the resources, in first-seen order
    pub fn datasource_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for resource in &self.resources {
            if !ids.contains(&resource.datasource.as_str()) {
                ids.push(resource.datasource.as_str());
            }
        }
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Member dataset ids, in display order
    #[serde(default)]
    pub datasets: Vec<String>,
}

/// One complete catalogue tree as fetched from the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub collections: Vec<Collection>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(datasets: Vec<Dataset>, collections: Vec<Collection>) -> Self {
        Self {
            datasets,
            collections,
            fetched_at: Utc::now(),
        }
    }

    pub fn dataset(&self, id: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Carry local annotations forward from `previous` by dataset id.
    ///
    /// Datasets present in both snapshots keep their favorite flag and local
    /// status; datasets new to this snapshot take their flag from `favorites`.
    pub fn merge_from(&mut self, previous: &Snapshot, favorites: &BTreeSet<String>) {
        let carried: HashMap<&str, &Dataset> = previous
            .datasets
            .iter()
            .map(|d| (d.id.as_str(), d))
            .collect();

        for dataset in &mut self.datasets {
            match carried.get(dataset.id.as_str()) {
                Some(old) => {
                    dataset.favorite = old.favorite;
                    dataset.local_status = old.local_status.clone();
                }
                None => dataset.favorite = favorites.contains(&dataset.id),
            }
        }
    }

    /// Mark favorites on a snapshot that has no predecessor
    pub fn apply_favorites(&mut self, favorites: &BTreeSet<String>) {
        for dataset in &mut self.datasets {
            dataset.favorite = favorites.contains(&dataset.id);
        }
    }
}
