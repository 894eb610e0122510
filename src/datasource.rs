//! Datasources and their preference order
//!
//! A datasource is an upstream provider of resources. Its rank is its
//! position in [`DatasourcePriority`]; rank 0 is the most preferred. Resource
//! URLs are attributed to a datasource by host fragment.

use crate::error::{CatalogueError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Id given to resources whose URL matches no configured datasource
pub const UNATTRIBUTED: &str = "unattributed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthScheme {
    None,
    BasicLogin,
    BearerToken,
}

impl AuthScheme {
    pub fn label(self) -> &'static str {
        match self {
            AuthScheme::None => "none",
            AuthScheme::BasicLogin => "basic-login",
            AuthScheme::BearerToken => "bearer-token",
        }
    }

    pub fn requires_value(self) -> bool {
        self != AuthScheme::None
    }

    /// Query keys that carry this scheme's credentials inside a resource URL
    pub fn query_keys(self) -> &'static [&'static str] {
        match self {
            AuthScheme::None => &[],
            AuthScheme::BasicLogin => &["username", "password"],
            AuthScheme::BearerToken => &["token"],
        }
    }

    /// A URL is access-gated when it carries every credential key of the scheme
    pub fn gates_url(self, url: &str) -> bool {
        let keys = self.query_keys();
        if keys.is_empty() {
            return false;
        }
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        let present: HashSet<String> = parsed.query_pairs().map(|(k, _)| k.into_owned()).collect();
        keys.iter().all(|key| present.contains(*key))
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datasource {
    pub id: String,
    pub name: String,
    pub scheme: AuthScheme,
    /// Host fragments attributed to this datasource; empty means catch-all
    #[serde(default)]
    pub hosts: Vec<String>,
}

impl Datasource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, scheme: AuthScheme) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            scheme,
            hosts: Vec::new(),
        }
    }

    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_catch_all(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn matches_url(&self, url: &str) -> bool {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase));
        match host {
            Some(host) => self
                .hosts
                .iter()
                .any(|fragment| host.contains(&fragment.to_lowercase())),
            None => false,
        }
    }
}

/// Ordered datasource list; position is rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourcePriority {
    datasources: Vec<Datasource>,
}

impl Default for DatasourcePriority {
    fn default() -> Self {
        Self {
            datasources: vec![
                Datasource::new("datafordeler", "Datafordeler", AuthScheme::BasicLogin)
                    .with_hosts(["datafordeler.dk"]),
                Datasource::new("dataforsyningen", "Dataforsyningen", AuthScheme::BearerToken)
                    .with_hosts(["dataforsyningen.dk"]),
                Datasource::new("public", "Public services", AuthScheme::None),
            ],
        }
    }
}

impl DatasourcePriority {
    pub fn new(datasources: Vec<Datasource>) -> Result<Self> {
        if datasources.is_empty() {
            return Err(CatalogueError::Validation(
                "At least one datasource must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for datasource in &datasources {
            if datasource.id.trim().is_empty() {
                return Err(CatalogueError::Validation(
                    "Datasource id cannot be empty".to_string(),
                ));
            }
            if !seen.insert(datasource.id.as_str()) {
                return Err(CatalogueError::Validation(format!(
                    "Duplicate datasource id: {}",
                    datasource.id
                )));
            }
        }

        Ok(Self { datasources })
    }

    pub fn datasources(&self) -> &[Datasource] {
        &self.datasources
    }

    pub fn ids(&self) -> Vec<&str> {
        self.datasources.iter().map(|d| d.id.as_str()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Datasource> {
        self.datasources.iter().find(|d| d.id == id)
    }

    pub fn rank_of(&self, id: &str) -> Option<usize> {
        self.datasources.iter().position(|d| d.id == id)
    }

    /// Unknown ids sort after every known datasource
    pub fn sort_key(&self, id: &str) -> usize {
        self.rank_of(id).unwrap_or(usize::MAX)
    }

    /// Datasource id for a resource URL: first host match, else the first
    /// catch-all datasource, else [`UNATTRIBUTED`].
    pub fn classify(&self, url: &str) -> &str {
        self.datasources
            .iter()
            .find(|d| d.matches_url(url))
            .or_else(|| self.datasources.iter().find(|d| d.is_catch_all()))
            .map(|d| d.id.as_str())
            .unwrap_or(UNATTRIBUTED)
    }

    /// Reorder to `ordered_ids`, which must be a permutation of the known ids
    pub fn reorder(&mut self, ordered_ids: &[String]) -> Result<()> {
        if ordered_ids.len() != self.datasources.len() {
            return Err(CatalogueError::Validation(format!(
                "Expected {} datasource ids, got {}",
                self.datasources.len(),
                ordered_ids.len()
            )));
        }

        let mut reordered = Vec::with_capacity(ordered_ids.len());
        let mut seen = HashSet::new();
        for id in ordered_ids {
            if !seen.insert(id.as_str()) {
                return Err(CatalogueError::Validation(format!(
                    "Datasource id listed twice: {}",
                    id
                )));
            }
            let datasource = self.get(id).ok_or_else(|| {
                CatalogueError::Validation(format!("Unknown datasource id: {}", id))
            })?;
            reordered.push(datasource.clone());
        }

        self.datasources = reordered;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn classify_by_host_then_catch_all() {
        let priority = DatasourcePriority::default();
        assert_eq!(
            priority.classify("https://services.datafordeler.dk/wms?username=&password="),
            "datafordeler"
        );
        assert_eq!(
            priority.classify("https://api.dataforsyningen.dk/wfs?token=x"),
            "dataforsyningen"
        );
        assert_eq!(priority.classify("https://example.org/wms"), "public");
    }

    #[test]
    fn classify_without_catch_all_is_unattributed() {
        let priority = DatasourcePriority::new(vec![
            Datasource::new("a", "A", AuthScheme::None).with_hosts(["a.example"]),
        ])
        .unwrap();
        assert_eq!(priority.classify("https://b.example/x"), UNATTRIBUTED);
        assert_eq!(priority.sort_key(UNATTRIBUTED), usize::MAX);
    }

    #[test]
    fn reorder_accepts_permutations_only() {
        let mut priority = DatasourcePriority::default();
        priority
            .reorder(&ids(&["public", "datafordeler", "dataforsyningen"]))
            .unwrap();
        assert_eq!(priority.ids(), vec!["public", "datafordeler", "dataforsyningen"]);
        assert_eq!(priority.rank_of("public"), Some(0));

        let before = priority.clone();
        assert!(priority.reorder(&ids(&["public", "datafordeler"])).is_err());
        assert!(priority.reorder(&ids(&["public", "public", "datafordeler"])).is_err());
        assert!(priority.reorder(&ids(&["public", "datafordeler", "nope"])).is_err());
        assert_eq!(priority, before);
    }

    #[test]
    fn new_rejects_duplicates() {
        let result = DatasourcePriority::new(vec![
            Datasource::new("a", "A", AuthScheme::None),
            Datasource::new("a", "A again", AuthScheme::None),
        ]);
        assert!(result.is_err());
        assert!(DatasourcePriority::new(Vec::new()).is_err());
    }

    #[test]
    fn gated_urls_carry_scheme_keys() {
        assert!(AuthScheme::BasicLogin.gates_url("https://x.dk/wms?username=&password=&service=WMS"));
        assert!(!AuthScheme::BasicLogin.gates_url("https://x.dk/wms?username=a"));
        assert!(AuthScheme::BearerToken.gates_url("https://x.dk/wfs?token=abc"));
        assert!(!AuthScheme::BearerToken.gates_url("https://x.dk/wfs"));
        assert!(!AuthScheme::None.gates_url("https://x.dk/wfs?token=abc"));
    }
}
