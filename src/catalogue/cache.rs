//! Last good catalogue snapshot with single-flight refresh
//!
//! The live view is a pair of `Arc`s (snapshot and its index) swapped under
//! one lock, so readers see either the old tree or the new one, never a mix.
//! A refresh runs on its own task; callers that arrive while it is running
//! await the same shared future instead of fetching again.

use crate::catalogue::index::CatalogueIndex;
use crate::catalogue::model::{LocalStatus, Snapshot};
use crate::common::{CancelToken, Outcome, Timer};
use crate::error::{CatalogueError, Result};
use crate::registry::CatalogueSource;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// File name of the persisted snapshot inside the cache directory
pub const CACHE_FILE_NAME: &str = "catalogue.json";

type SharedRefresh = Shared<BoxFuture<'static, Result<Arc<Snapshot>>>>;

/// What a refresh produced, plus the view that is usable afterwards
#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub outcome: Result<Arc<Snapshot>>,
    /// Current view; after a failure this is the retained previous view
    pub view: Option<Arc<CatalogueIndex>>,
    pub stale: bool,
}

impl RefreshReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    snapshot: Option<Arc<Snapshot>>,
    index: Option<Arc<CatalogueIndex>>,
    favorites: BTreeSet<String>,
    last_refresh_failed: bool,
}

impl CacheState {
    fn install(&mut self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.index = Some(Arc::new(CatalogueIndex::build(Arc::clone(&snapshot))));
        self.snapshot = Some(Arc::clone(&snapshot));
        snapshot
    }
}

struct Inner {
    source: Arc<dyn CatalogueSource>,
    state: RwLock<CacheState>,
    in_flight: Mutex<Option<SharedRefresh>>,
    cache_dir: Option<PathBuf>,
}

#[derive(Clone)]
pub struct CatalogueCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CatalogueCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = read(&self.inner.state);
        f.debug_struct("CatalogueCache")
            .field("datasets", &state.snapshot.as_ref().map(|s| s.len()))
            .field("last_refresh_failed", &state.last_refresh_failed)
            .field("cache_dir", &self.inner.cache_dir)
            .finish()
    }
}

impl CatalogueCache {
    pub fn new(source: Arc<dyn CatalogueSource>) -> Self {
        Self::build(source, BTreeSet::new(), None)
    }

    /// Seed the favorite ids applied to every snapshot this cache installs
    pub fn with_favorites<I: IntoIterator<Item = String>>(self, ids: I) -> Self {
        write(&self.inner.state).favorites = ids.into_iter().collect();
        self
    }

    /// Persist successful snapshots under `dir` and allow [`Self::load_persisted`]
    pub fn with_cache_dir(self, dir: impl Into<PathBuf>) -> Self {
        let state = std::mem::take(&mut *write(&self.inner.state));
        let cache = Self::build(Arc::clone(&self.inner.source), BTreeSet::new(), Some(dir.into()));
        *write(&cache.inner.state) = state;
        cache
    }

    fn build(source: Arc<dyn CatalogueSource>, favorites: BTreeSet<String>, cache_dir: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                state: RwLock::new(CacheState {
                    favorites,
                    ..CacheState::default()
                }),
                in_flight: Mutex::new(None),
                cache_dir,
            }),
        }
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        read(&self.inner.state).snapshot.clone()
    }

    pub fn index(&self) -> Option<Arc<CatalogueIndex>> {
        read(&self.inner.state).index.clone()
    }

    pub fn favorites(&self) -> BTreeSet<String> {
        read(&self.inner.state).favorites.clone()
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.inner.cache_dir.as_deref()
    }

    /// Fetch and merge a new snapshot.
    ///
    /// Joins the refresh already in flight if there is one. Dropping the
    /// returned future does not abort the fetch; other waiters still get it.
    pub async fn refresh(&self) -> RefreshReport {
        let pending = self.join_or_start();
        let outcome = pending.await;

        let state = read(&self.inner.state);
        RefreshReport {
            outcome,
            view: state.index.clone(),
            stale: state.last_refresh_failed || state.snapshot.is_none(),
        }
    }

    /// [`CatalogueCache::refresh`] that stops waiting once `cancel` fires.
    ///
    /// Only the wait is abandoned: the shared fetch keeps running for other
    /// waiters and still commits. The live view is untouched either way.
    pub async fn refresh_cancellable(&self, cancel: &CancelToken) -> Outcome<RefreshReport> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("stopped waiting for catalogue refresh");
                Outcome::Cancelled
            }
            report = self.refresh() => Outcome::Completed(report),
        }
    }

    fn join_or_start(&self) -> SharedRefresh {
        let mut slot = lock(&self.inner.in_flight);
        if let Some(pending) = slot.as_ref() {
            tracing::debug!("joining catalogue refresh in flight");
            return pending.clone();
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run_refresh().await });
        let pending = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(CatalogueError::network(format!("Refresh task aborted: {}", e))))
        }
        .boxed()
        .shared();

        // The task clears the slot under this same lock, so it cannot finish
        // clearing before the slot is filled.
        *slot = Some(pending.clone());
        pending
    }

    /// Snapshot is older than `max_age`, missing, or the last refresh failed
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.is_stale_at(max_age, Utc::now())
    }

    pub fn is_stale_at(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let state = read(&self.inner.state);
        let Some(snapshot) = &state.snapshot else {
            return true;
        };
        if state.last_refresh_failed {
            return true;
        }
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now.signed_duration_since(snapshot.fetched_at) > max_age,
            Err(_) => false,
        }
    }

    /// Set the favorite flag of `id` in the live view and in every future
    /// snapshot. Unknown ids are remembered for when the dataset appears.
    pub fn set_favorite(&self, id: &str, favorite: bool) {
        let mut state = write(&self.inner.state);
        if favorite {
            state.favorites.insert(id.to_string());
        } else {
            state.favorites.remove(id);
        }

        let Some(current) = state.snapshot.clone() else {
            return;
        };
        if current.dataset(id).is_none_or(|d| d.favorite == favorite) {
            return;
        }

        let mut next = (*current).clone();
        if let Some(dataset) = next.datasets.iter_mut().find(|d| d.id == id) {
            dataset.favorite = favorite;
        }
        state.install(next);
    }

    /// Record a local status on a dataset of the live view
    pub fn annotate(&self, id: &str, status: LocalStatus) -> Result<()> {
        let mut state = write(&self.inner.state);
        let current = state
            .snapshot
            .clone()
            .ok_or_else(|| CatalogueError::UnknownDataset(id.to_string()))?;

        let mut next = (*current).clone();
        let dataset = next
            .datasets
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| CatalogueError::UnknownDataset(id.to_string()))?;
        dataset.local_status = Some(status);
        state.install(next);
        Ok(())
    }

    /// Install the snapshot persisted by an earlier session, if any.
    ///
    /// Does nothing when a snapshot is already live.
    pub async fn load_persisted(&self) -> Result<Option<Arc<Snapshot>>> {
        let Some(dir) = self.inner.cache_dir.clone() else {
            return Ok(None);
        };
        let path = dir.join(CACHE_FILE_NAME);

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CatalogueError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        let mut snapshot: Snapshot = serde_json::from_slice(&raw)?;

        let mut state = write(&self.inner.state);
        if let Some(existing) = &state.snapshot {
            return Ok(Some(Arc::clone(existing)));
        }
        snapshot.apply_favorites(&state.favorites);
        let installed = state.install(snapshot);
        tracing::info!(
            datasets = installed.len(),
            fetched_at = %installed.fetched_at,
            "restored catalogue from disk cache"
        );
        Ok(Some(installed))
    }
}

impl Inner {
    async fn run_refresh(self: Arc<Self>) -> Result<Arc<Snapshot>> {
        let timer = Timer::start("catalogue refresh");
        let outcome = match self.source.fetch_catalogue().await {
            Ok(snapshot) => {
                let committed = self.commit(snapshot);
                self.persist(Arc::clone(&committed)).await;
                Ok(committed)
            }
            Err(e) => {
                let mut state = write(&self.state);
                state.last_refresh_failed = true;
                tracing::warn!(
                    error = %e,
                    retained = state.snapshot.is_some(),
                    "catalogue refresh failed"
                );
                Err(e)
            }
        };

        *lock(&self.in_flight) = None;
        timer.log_elapsed();
        outcome
    }

    fn commit(&self, mut snapshot: Snapshot) -> Arc<Snapshot> {
        let mut state = write(&self.state);
        match &state.snapshot {
            Some(previous) => snapshot.merge_from(previous, &state.favorites),
            None => snapshot.apply_favorites(&state.favorites),
        }
        state.last_refresh_failed = false;
        let installed = state.install(snapshot);
        tracing::info!(
            datasets = installed.len(),
            collections = installed.collections.len(),
            "catalogue refreshed"
        );
        installed
    }

    async fn persist(&self, snapshot: Arc<Snapshot>) {
        let Some(dir) = self.cache_dir.clone() else {
            return;
        };
        let result = tokio::task::spawn_blocking(move || write_snapshot(&dir, &snapshot)).await;
        match result {
            Ok(Ok(())) => tracing::debug!("catalogue snapshot persisted"),
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to persist catalogue snapshot"),
            Err(e) => tracing::warn!(error = %e, "catalogue persist task failed"),
        }
    }
}

fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<()> {
    crate::common::PathUtils::ensure_dir_exists(dir)?;
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut file, snapshot)?;
    file.flush()?;
    file.persist(dir.join(CACHE_FILE_NAME))
        .map_err(|e| CatalogueError::Storage(format!("Failed to write catalogue cache: {}", e)))?;
    Ok(())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
