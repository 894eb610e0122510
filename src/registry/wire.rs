//! JSON:API documents served by the catalogue and their conversion to a
//! [`Snapshot`]

use crate::catalogue::model::{Collection, Dataset, Resource, ResourceKind, Snapshot};
use crate::common::PathUtils;
use crate::datasource::DatasourcePriority;
use crate::error::{CatalogueError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub data: Vec<ResourceObject>,
    #[serde(default)]
    pub included: Vec<ResourceObject>,
    #[serde(default)]
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub relationships: HashMap<String, Relationship>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub data: Option<Linkage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    One(Identifier),
    Many(Vec<Identifier>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl Document {
    pub fn from_slice(bytes: &[u8], context: &str) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| CatalogueError::parse(format!("Invalid {} document: {}", context, e)))
    }
}

impl ResourceObject {
    fn text(&self, key: &str) -> Option<String> {
        match self.attributes.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    fn text_or_empty(&self, key: &str) -> String {
        self.text(key).unwrap_or_default()
    }

    fn related(&self, name: &str) -> Vec<&Identifier> {
        match self.relationships.get(name).and_then(|r| r.data.as_ref()) {
            Some(Linkage::One(id)) => vec![id],
            Some(Linkage::Many(ids)) => ids.iter().collect(),
            None => Vec::new(),
        }
    }
}

/// `included` objects by (type, id)
struct Lookup<'a> {
    objects: HashMap<(&'a str, &'a str), &'a ResourceObject>,
}

impl<'a> Lookup<'a> {
    fn new(included: &'a [ResourceObject]) -> Self {
        let mut objects = HashMap::with_capacity(included.len());
        for object in included {
            objects
                .entry((object.kind.as_str(), object.id.as_str()))
                .or_insert(object);
        }
        Self { objects }
    }

    fn get(&self, id: &Identifier) -> Option<&'a ResourceObject> {
        self.objects.get(&(id.kind.as_str(), id.id.as_str())).copied()
    }

    fn related(&self, object: &ResourceObject, name: &str) -> Vec<&'a ResourceObject> {
        object
            .related(name)
            .into_iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    fn first(&self, object: &ResourceObject, name: &str) -> Option<&'a ResourceObject> {
        self.related(object, name).into_iter().next()
    }
}

/// Build a snapshot from the dataset, collection and (optional) availability
/// documents
pub fn build_snapshot(
    datasets: &Document,
    collections: &Document,
    availability: Option<&Document>,
    datasources: &DatasourcePriority,
) -> Snapshot {
    let statuses: HashMap<&str, String> = availability
        .map(|doc| {
            doc.data
                .iter()
                .filter_map(|item| item.text("status").map(|s| (item.id.as_str(), s)))
                .collect()
        })
        .unwrap_or_default();

    let lookup = Lookup::new(&datasets.included);
    let mut parsed = Vec::with_capacity(datasets.data.len());
    for item in &datasets.data {
        let mut dataset = parse_dataset(item, &lookup, datasources);
        dataset.availability = statuses.get(item.id.as_str()).cloned();
        parsed.push(dataset);
    }

    let lookup = Lookup::new(&collections.included);
    let collections = collections
        .data
        .iter()
        .map(|item| parse_collection(item, &lookup))
        .collect();

    if let Some(total) = datasets.meta.as_ref().and_then(|m| m.total) {
        if total as usize != parsed.len() {
            tracing::debug!(total, received = parsed.len(), "catalogue reports a different dataset total");
        }
    }

    Snapshot::new(parsed, collections)
}

fn parse_dataset(item: &ResourceObject, lookup: &Lookup<'_>, datasources: &DatasourcePriority) -> Dataset {
    let mut dataset = Dataset::new(item.id.clone(), item.text_or_empty("title"));
    dataset.description = item.text_or_empty("description");
    dataset.support_contact = item.text("supportContact");
    dataset.metadata_url = item.text("metadata").map(|u| decode_url(&u));
    dataset.created = item.text("created").and_then(|s| parse_timestamp(&s));
    dataset.updated = item.text("updated").and_then(|s| parse_timestamp(&s));

    let category = lookup.first(item, "category");
    dataset.category = category.and_then(|c| c.text("name"));
    dataset.tags = lookup
        .related(item, "tags")
        .into_iter()
        .filter_map(|t| t.text("name"))
        .collect();
    dataset.owners = lookup
        .related(item, "owners")
        .into_iter()
        .filter_map(|o| o.text("title"))
        .collect();

    // Datasets without their own thumbnail borrow the category's
    dataset.thumbnail_url = lookup
        .first(item, "thumbnail")
        .or_else(|| category.and_then(|c| lookup.first(c, "thumbnail")))
        .and_then(|t| t.text("url"))
        .map(|u| decode_url(&u));

    let mut kinds = Vec::new();
    if let Some(source) = lookup.first(item, "wfsSource") {
        kinds.push(ResourceKind::Wfs {
            url: source.text_or_empty("url"),
            type_name: source.text_or_empty("typeName"),
        });
    }
    if let Some(source) = lookup.first(item, "wmtsSource") {
        kinds.push(ResourceKind::Wmts {
            url: source.text_or_empty("url"),
            layer: source.text_or_empty("layer"),
            tile_matrix: source.text_or_empty("matrixSet"),
            style: source.text_or_empty("style"),
            format: source.text_or_empty("format"),
        });
    }
    if let Some(source) = lookup.first(item, "wmsSource") {
        kinds.push(ResourceKind::Wms {
            url: source.text_or_empty("url"),
            layer: source.text_or_empty("layer"),
            style: source.text_or_empty("style"),
            format: source.text_or_empty("format"),
        });
    }
    for source in lookup.related(item, "fileSources") {
        let url = source.text_or_empty("url");
        let file_type = lookup
            .first(source, "fileSourceType")
            .and_then(|t| t.text("name"));
        kinds.push(ResourceKind::File {
            is_archive: looks_like_archive(&decode_url(&url)),
            url,
            file_type,
        });
    }

    for kind in kinds {
        let resource = with_decoded_url(kind);
        let url = resource_url(&resource);
        if url.is_empty() {
            tracing::debug!(dataset = %item.id, "skipping resource without url");
            continue;
        }
        let datasource = datasources.classify(url).to_string();
        dataset.resources.push(Resource::new(datasource, resource));
    }

    dataset
}

fn parse_collection(item: &ResourceObject, lookup: &Lookup<'_>) -> Collection {
    let datasets = lookup
        .related(item, "datasetCollectionItems")
        .into_iter()
        .filter_map(|member| member.related("dataset").into_iter().next())
        .map(|id| id.id.clone())
        .collect();

    Collection {
        id: item.id.clone(),
        title: item.text_or_empty("title"),
        description: item.text_or_empty("description"),
        datasets,
    }
}

fn with_decoded_url(kind: ResourceKind) -> ResourceKind {
    match kind {
        ResourceKind::Wms { url, layer, style, format } => ResourceKind::Wms {
            url: decode_url(&url),
            layer,
            style,
            format,
        },
        ResourceKind::Wfs { url, type_name } => ResourceKind::Wfs {
            url: decode_url(&url),
            type_name,
        },
        ResourceKind::Wmts {
            url,
            layer,
            tile_matrix,
            style,
            format,
        } => ResourceKind::Wmts {
            url: decode_url(&url),
            layer,
            tile_matrix,
            style,
            format,
        },
        ResourceKind::File {
            url,
            is_archive,
            file_type,
        } => ResourceKind::File {
            url: decode_url(&url),
            is_archive,
            file_type,
        },
    }
}

fn resource_url(kind: &ResourceKind) -> &str {
    match kind {
        ResourceKind::Wms { url, .. }
        | ResourceKind::Wfs { url, .. }
        | ResourceKind::Wmts { url, .. }
        | ResourceKind::File { url, .. } => url,
    }
}

/// URLs arrive percent-encoded
pub fn decode_url(url: &str) -> String {
    percent_encoding::percent_decode_str(url.trim())
        .decode_utf8_lossy()
        .into_owned()
}

fn looks_like_archive(url: &str) -> bool {
    PathUtils::url_file_name(url)
        .map(|name| [".zip", ".tar", ".tar.gz", ".tgz"].iter().any(|ext| name.ends_with(ext)))
        .unwrap_or(false)
}

/// RFC 3339, or a naive timestamp/date taken as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
