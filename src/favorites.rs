//! Persisted set of favorite dataset ids

use crate::error::Result;
use crate::storage::{KeyValueStore, load_json, store_json};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

pub const FAVORITES_KEY: &str = "favorites";

/// Favorite ids, independent of catalogue state.
///
/// Ids of datasets that disappeared from the catalogue are kept, so the
/// favorite comes back with the dataset.
pub struct FavoritesStore {
    store: Arc<dyn KeyValueStore>,
    ids: Mutex<BTreeSet<String>>,
}

impl FavoritesStore {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let ids: BTreeSet<String> = load_json(store.as_ref(), FAVORITES_KEY)?.unwrap_or_default();
        tracing::debug!(count = ids.len(), "favorites loaded");
        Ok(Self {
            store,
            ids: Mutex::new(ids),
        })
    }

    /// Flip `id` and persist before returning the new state.
    ///
    /// A failed write leaves the set unchanged.
    pub fn toggle(&self, id: &str) -> Result<bool> {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        let now_favorite = !ids.contains(id);
        let mut next = ids.clone();
        if now_favorite {
            next.insert(id.to_string());
        } else {
            next.remove(id);
        }

        store_json(self.store.as_ref(), FAVORITES_KEY, &next)?;
        *ids = next;
        Ok(now_favorite)
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn toggle_twice_is_not_favorite() {
        let favorites = FavoritesStore::load(Arc::new(MemoryStore::new())).unwrap();
        assert!(favorites.toggle("d1").unwrap());
        assert!(favorites.is_favorite("d1"));
        assert!(!favorites.toggle("d1").unwrap());
        assert!(!favorites.is_favorite("d1"));
    }

    #[test]
    fn toggles_are_persisted() {
        let backend = Arc::new(MemoryStore::new());
        let favorites = FavoritesStore::load(backend.clone()).unwrap();
        favorites.toggle("b").unwrap();
        favorites.toggle("a").unwrap();

        let reloaded = FavoritesStore::load(backend).unwrap();
        assert_eq!(reloaded.ids().into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn failed_write_keeps_previous_state() {
        let backend = Arc::new(MemoryStore::new());
        let favorites = FavoritesStore::load(backend.clone()).unwrap();
        favorites.toggle("a").unwrap();

        backend.set_read_only(true);
        assert!(favorites.toggle("a").is_err());
        assert!(favorites.is_favorite("a"));
    }
}
