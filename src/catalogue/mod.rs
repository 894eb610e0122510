//! Catalogue data model, cached view and query index

pub mod cache;
pub mod index;
pub mod model;

pub use cache::{CatalogueCache, RefreshReport};
pub use index::{CatalogueIndex, DatasetFilter, GroupBy};
pub use model::{
    Collection, Dataset, LocalStatus, Protocol, ProtocolFilter, Resource, ResourceKind, Snapshot,
};
