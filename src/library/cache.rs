//! In-memory cache for library snapshots.
//!
//! One `user.groups` call returns every library, so the whole snapshot is
//! cached as a unit, with a per-id index for direct lookups. Entries expire
//! after the configured TTL and are dropped on explicit invalidation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::models::{Library, LibraryId};

/// Result of a cache lookup
#[derive(Debug)]
pub enum CacheResult<T> {
    /// Item was found and is valid
    Hit(T),

    /// Item was not found
    Miss,

    /// Item was found but has expired
    Expired,
}

#[derive(Debug)]
struct CachedSnapshot {
    fetched_at: Instant,
    libraries: Arc<Vec<Library>>,
    by_id: HashMap<LibraryId, usize>,
}

/// TTL cache for the library/collection tree
#[derive(Debug)]
pub struct LibraryCache {
    ttl: Duration,
    entry: Mutex<Option<CachedSnapshot>>,
}

impl LibraryCache {
    /// A zero TTL disables caching
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached snapshot, if still fresh
    pub fn get(&self) -> CacheResult<Arc<Vec<Library>>> {
        if !self.is_enabled() {
            return CacheResult::Miss;
        }

        let guard = self.lock();
        match guard.as_ref() {
            Some(cached) if cached.fetched_at.elapsed() < self.ttl => {
                tracing::debug!("Cache HIT for library snapshot");
                CacheResult::Hit(Arc::clone(&cached.libraries))
            }
            Some(_) => {
                tracing::debug!("Cache expired for library snapshot");
                CacheResult::Expired
            }
            None => {
                tracing::debug!("Cache MISS for library snapshot");
                CacheResult::Miss
            }
        }
    }

    /// One library from the cached snapshot, if still fresh
    pub fn library(&self, id: LibraryId) -> CacheResult<Library> {
        match self.get() {
            CacheResult::Hit(_) => {
                let guard = self.lock();
                let found = guard.as_ref().and_then(|cached| {
                    cached
                        .by_id
                        .get(&id)
                        .and_then(|&index| cached.libraries.get(index))
                        .cloned()
                });
                match found {
                    Some(library) => CacheResult::Hit(library),
                    None => CacheResult::Miss,
                }
            }
            CacheResult::Miss => CacheResult::Miss,
            CacheResult::Expired => CacheResult::Expired,
        }
    }

    /// Store a freshly fetched snapshot
    pub fn set(&self, libraries: Arc<Vec<Library>>) {
        if !self.is_enabled() {
            return;
        }

        let mut by_id = HashMap::with_capacity(libraries.len());
        for (index, library) in libraries.iter().enumerate() {
            // First occurrence wins, matching name resolution order
            by_id.entry(library.id).or_insert(index);
        }

        *self.lock() = Some(CachedSnapshot {
            fetched_at: Instant::now(),
            libraries,
            by_id,
        });
    }

    /// Drop the cached snapshot
    pub fn invalidate(&self) {
        if self.lock().take().is_some() {
            tracing::debug!("Library snapshot invalidated");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CachedSnapshot>> {
        // A poisoned cache only means a panic mid-update; the data is still usable.
        self.entry.lock().unwrap_or_else(|e| e.into_inner())
    }
}
