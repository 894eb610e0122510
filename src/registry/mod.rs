//! Remote catalogue access
//!
//! [`RegistryClient`] talks to the JSON:API catalogue; [`wire`] holds the
//! document types and their conversion into a [`Snapshot`]. The cache only
//! depends on the [`CatalogueSource`] seam, so tests can script fetches.

pub mod client;
pub mod wire;

pub use client::{RegistryClient, RegistryClientBuilder};

use crate::catalogue::model::Snapshot;
use crate::error::Result;
use async_trait::async_trait;

/// Something that can produce a complete catalogue snapshot
#[async_trait]
pub trait CatalogueSource: Send + Sync {
    async fn fetch_catalogue(&self) -> Result<Snapshot>;
}
