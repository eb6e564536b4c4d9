//! Collection path resolution.
//!
//! A path `Library/A/B/C` is resolved in two stages: the first segment picks a
//! library by exact name, then the remaining segments walk that library's
//! collection forest from the top level down. Names are compared exactly (no
//! case folding). The forest index is built from the snapshot handed in and is
//! never kept between calls.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::{CacheResult, LibraryCache, LibraryError};
use crate::models::{Collection, CollectionPath, Library, ResolvedCollection};
use crate::rpc::{methods, RpcChannel};

/// What to do when several siblings carry the requested name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Take the first match in snapshot order
    #[default]
    FirstMatch,
    /// Fail with [`LibraryError::AmbiguousName`]
    Reject,
}

/// Parent key -> children, in snapshot order. `None` holds the top level.
struct CollectionForest<'a> {
    children: HashMap<Option<&'a str>, Vec<&'a Collection>>,
}

impl<'a> CollectionForest<'a> {
    fn build(collections: &'a [Collection]) -> Self {
        let mut children: HashMap<Option<&'a str>, Vec<&'a Collection>> = HashMap::new();
        for collection in collections {
            children
                .entry(collection.parent_key.as_deref())
                .or_default()
                .push(collection);
        }
        Self { children }
    }

    fn named(&self, parent: Option<&'a str>, name: &str) -> Vec<&'a Collection> {
        self.children
            .get(&parent)
            .map(|siblings| {
                siblings
                    .iter()
                    .copied()
                    .filter(|c| c.name == name)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn pick<'a, T>(
    candidates: Vec<&'a T>,
    policy: AmbiguityPolicy,
    path: &CollectionPath,
    segment: &str,
    depth: usize,
) -> Result<&'a T, LibraryError> {
    match candidates.len() {
        0 => Err(LibraryError::PathNotFound {
            path: path.to_string(),
            segment: segment.to_string(),
            depth,
        }),
        1 => Ok(candidates[0]),
        count => match policy {
            AmbiguityPolicy::FirstMatch => {
                tracing::debug!(%path, segment, depth, count, "ambiguous name, taking first match");
                Ok(candidates[0])
            }
            AmbiguityPolicy::Reject => Err(LibraryError::AmbiguousName {
                path: path.to_string(),
                segment: segment.to_string(),
                depth,
                count,
            }),
        },
    }
}

/// Resolve `path` against a library snapshot.
pub fn resolve_in(
    libraries: &[Library],
    path: &CollectionPath,
    policy: AmbiguityPolicy,
) -> Result<ResolvedCollection, LibraryError> {
    let library_name = path.library();
    let segments = path.segments();

    if segments.is_empty() {
        return Err(LibraryError::EmptyPath(path.to_string()));
    }

    let candidates: Vec<&Library> = libraries
        .iter()
        .filter(|l| l.name == library_name)
        .collect();
    let library = pick(candidates, policy, path, library_name, 0)?;

    let forest = CollectionForest::build(&library.collections);

    let mut current: Option<&str> = None;
    for (index, segment) in segments.iter().enumerate() {
        let matched = pick(forest.named(current, segment), policy, path, segment, index + 1)?;
        current = Some(matched.key.as_str());
    }

    // segments is non-empty, so at least one match was recorded
    let collection_key = current
        .ok_or_else(|| LibraryError::EmptyPath(path.to_string()))?
        .to_string();

    Ok(ResolvedCollection {
        library_id: library.id,
        collection_key,
    })
}

/// Validate a `user.groups` result into library snapshots
pub fn parse_libraries(value: Value) -> Result<Vec<Library>, LibraryError> {
    let libraries: Vec<Library> = serde_json::from_value(value)
        .map_err(|e| LibraryError::MalformedResponse(format!("user.groups: {}", e)))?;

    for library in &libraries {
        library
            .validate()
            .map_err(LibraryError::MalformedResponse)?;
    }

    Ok(libraries)
}

/// Resolves collection paths against the live library tree
#[derive(Debug, Clone)]
pub struct CollectionPathResolver {
    channel: Arc<dyn RpcChannel>,
    policy: AmbiguityPolicy,
    cache: Option<Arc<LibraryCache>>,
}

impl CollectionPathResolver {
    pub fn new(channel: Arc<dyn RpcChannel>) -> Self {
        Self {
            channel,
            policy: AmbiguityPolicy::default(),
            cache: None,
        }
    }

    pub fn with_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Reuse snapshots through `cache` instead of refetching on every call
    pub fn with_cache(mut self, cache: Arc<LibraryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn policy(&self) -> AmbiguityPolicy {
        self.policy
    }

    /// Fetch a fresh snapshot of every library and its collections
    pub async fn fetch_libraries(&self) -> Result<Vec<Library>, LibraryError> {
        let result = self.channel.call(methods::USER_GROUPS, json!([true])).await?;
        let libraries = parse_libraries(result)?;
        tracing::debug!(libraries = libraries.len(), "fetched library snapshot");
        Ok(libraries)
    }

    /// Current snapshot, through the cache when one is configured
    pub async fn libraries(&self) -> Result<Arc<Vec<Library>>, LibraryError> {
        if let Some(cache) = &self.cache {
            if let CacheResult::Hit(libraries) = cache.get() {
                return Ok(libraries);
            }
        }

        let libraries = Arc::new(self.fetch_libraries().await?);

        if let Some(cache) = &self.cache {
            cache.set(Arc::clone(&libraries));
        }

        Ok(libraries)
    }

    /// Resolve `path` to a library id and collection key
    pub async fn resolve(&self, path: &CollectionPath) -> Result<ResolvedCollection, LibraryError> {
        let libraries = self.libraries().await?;
        let resolved = resolve_in(&libraries, path, self.policy)?;
        tracing::debug!(
            %path,
            library_id = resolved.library_id,
            collection = %resolved.collection_key,
            "resolved collection path"
        );
        Ok(resolved)
    }
}
