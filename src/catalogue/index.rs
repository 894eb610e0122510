//! Facet indexes over one snapshot
//!
//! The index is immutable: the cache builds a new one whenever the view
//! changes and swaps it in together with its snapshot.

use crate::catalogue::model::{Collection, Dataset, ProtocolFilter, Snapshot};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Filter for [`CatalogueIndex::query`].
///
/// Facets combine with AND, values inside one facet with OR. Empty facets
/// do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetFilter {
    pub text: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub owners: Vec<String>,
    pub datasource_ids: Vec<String>,
    pub favorites_only: bool,
    pub availability: ProtocolFilter,
}

impl DatasetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_categories<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.categories = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.tags = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_owners<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.owners = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_datasources<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.datasource_ids = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn favorites_only(mut self) -> Self {
        self.favorites_only = true;
        self
    }

    pub fn with_availability(mut self, availability: ProtocolFilter) -> Self {
        self.availability = availability;
        self
    }

    fn terms(&self) -> Vec<String> {
        self.text
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_lowercase)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    Owner,
    Datasource,
    Category,
    #[default]
    None,
}

type Postings = BTreeMap<String, BTreeSet<usize>>;

#[derive(Debug)]
pub struct CatalogueIndex {
    snapshot: Arc<Snapshot>,
    by_id: HashMap<String, usize>,
    by_owner: Postings,
    by_category: Postings,
    by_tag: Postings,
    by_datasource: Postings,
    favorites: BTreeSet<usize>,
    /// Lowercased title, description and tags, one field per line
    search_text: Vec<String>,
    /// Dataset positions sorted by title (case-insensitive), then id
    title_order: Vec<usize>,
}

impl CatalogueIndex {
    pub fn build(snapshot: Arc<Snapshot>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_owner = Postings::new();
        let mut by_category = Postings::new();
        let mut by_tag = Postings::new();
        let mut by_datasource = Postings::new();
        let mut favorites = BTreeSet::new();
        let mut search_text = Vec::with_capacity(snapshot.datasets.len());

        for (pos, dataset) in snapshot.datasets.iter().enumerate() {
            by_id.entry(dataset.id.clone()).or_insert(pos);
            for owner in &dataset.owners {
                by_owner.entry(owner.clone()).or_default().insert(pos);
            }
            if let Some(category) = &dataset.category {
                by_category.entry(category.clone()).or_default().insert(pos);
            }
            for tag in &dataset.tags {
                by_tag.entry(tag.clone()).or_default().insert(pos);
            }
            for datasource in dataset.datasource_ids() {
                by_datasource.entry(datasource.to_string()).or_default().insert(pos);
            }
            if dataset.favorite {
                favorites.insert(pos);
            }

            let mut text = format!("{}\n{}", dataset.title, dataset.description);
            for tag in &dataset.tags {
                text.push('\n');
                text.push_str(tag);
            }
            search_text.push(text.to_lowercase());
        }

        let mut title_order: Vec<usize> = (0..snapshot.datasets.len()).collect();
        title_order.sort_by_cached_key(|&pos| {
            let dataset = &snapshot.datasets[pos];
            (dataset.title.to_lowercase(), dataset.id.clone())
        });

        tracing::debug!(
            datasets = snapshot.datasets.len(),
            owners = by_owner.len(),
            tags = by_tag.len(),
            "catalogue index built"
        );

        Self {
            snapshot,
            by_id,
            by_owner,
            by_category,
            by_tag,
            by_datasource,
            favorites,
            search_text,
            title_order,
        }
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn len(&self) -> usize {
        self.snapshot.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.datasets.is_empty()
    }

    pub fn dataset(&self, id: &str) -> Option<&Dataset> {
        self.by_id.get(id).map(|&pos| &self.snapshot.datasets[pos])
    }

    /// Datasets matching `filter`, ordered by title
    pub fn query(&self, filter: &DatasetFilter) -> Vec<&Dataset> {
        let facets = [
            (&self.by_category, &filter.categories),
            (&self.by_tag, &filter.tags),
            (&self.by_owner, &filter.owners),
            (&self.by_datasource, &filter.datasource_ids),
        ];
        let allowed: Vec<BTreeSet<usize>> = facets
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(postings, values)| union_of(postings, values))
            .collect();
        let terms = filter.terms();

        self.title_order
            .iter()
            .copied()
            .filter(|pos| allowed.iter().all(|set| set.contains(pos)))
            .filter(|pos| !filter.favorites_only || self.favorites.contains(pos))
            .filter(|&pos| {
                let haystack = &self.search_text[pos];
                terms.iter().all(|term| haystack.contains(term.as_str()))
            })
            .map(|pos| &self.snapshot.datasets[pos])
            .filter(|dataset| {
                filter.availability == ProtocolFilter::All || dataset.offers(filter.availability)
            })
            .collect()
    }

    /// Every dataset grouped by `key`
    pub fn group_by(&self, key: GroupBy) -> BTreeMap<String, Vec<&Dataset>> {
        self.group_matching(&DatasetFilter::default(), key)
    }

    /// Datasets matching `filter`, grouped by `key`, each group ordered by
    /// title. Multi-valued keys place a dataset in every group it belongs to;
    /// datasets without a value land in the empty-string group.
    pub fn group_matching(&self, filter: &DatasetFilter, key: GroupBy) -> BTreeMap<String, Vec<&Dataset>> {
        let mut groups: BTreeMap<String, Vec<&Dataset>> = BTreeMap::new();

        for dataset in self.query(filter) {
            let keys: Vec<String> = match key {
                GroupBy::None => Vec::new(),
                GroupBy::Owner => dataset
                    .owners
                    .iter()
                    .filter(|o| !o.is_empty())
                    .cloned()
                    .collect(),
                GroupBy::Datasource => dataset
                    .datasource_ids()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                GroupBy::Category => dataset
                    .category
                    .iter()
                    .filter(|c| !c.is_empty())
                    .cloned()
                    .collect(),
            };

            if keys.is_empty() {
                groups.entry(String::new()).or_default().push(dataset);
            } else {
                for group in keys {
                    let members = groups.entry(group).or_default();
                    if !members.iter().any(|d| d.id == dataset.id) {
                        members.push(dataset);
                    }
                }
            }
        }

        groups
    }

    /// Members of `collection` present in this snapshot, in collection order
    pub fn collection_members(&self, collection: &Collection) -> Vec<&Dataset> {
        collection
            .datasets
            .iter()
            .filter_map(|id| self.dataset(id))
            .collect()
    }

    pub fn collections(&self) -> &[Collection] {
        &self.snapshot.collections
    }

    /// Facet values with their dataset counts, for building filter pickers
    pub fn owners(&self) -> Vec<(&str, usize)> {
        facet_counts(&self.by_owner)
    }

    pub fn categories(&self) -> Vec<(&str, usize)> {
        facet_counts(&self.by_category)
    }

    pub fn tags(&self) -> Vec<(&str, usize)> {
        facet_counts(&self.by_tag)
    }
}

fn union_of(postings: &Postings, values: &[String]) -> BTreeSet<usize> {
    values
        .iter()
        .filter_map(|value| postings.get(value))
        .flat_map(|set| set.iter().copied())
        .collect()
}

fn facet_counts(postings: &Postings) -> Vec<(&str, usize)> {
    postings
        .iter()
        .map(|(value, set)| (value.as_str(), set.len()))
        .collect()
}
