//! Library and collection snapshots returned by `user.groups`.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Numeric library identifier (1 is the personal library, groups follow)
pub type LibraryId = i64;

/// Opaque collection key, e.g. `"8XK2ZQ4T"`
pub type CollectionKey = String;

/// A single collection inside a library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub key: CollectionKey,
    pub name: String,

    /// Parent collection key; `None` for top-level collections.
    ///
    /// The service encodes "no parent" as `false`.
    #[serde(
        rename = "parentCollection",
        default,
        deserialize_with = "deserialize_parent"
    )]
    pub parent_key: Option<CollectionKey>,
}

impl Collection {
    pub fn new(key: &str, name: &str, parent_key: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            parent_key: parent_key.map(str::to_string),
        }
    }

    /// Whether this collection has no parent
    pub fn is_top_level(&self) -> bool {
        self.parent_key.is_none()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ParentRef {
    Key(String),
    Flag(bool),
}

fn deserialize_parent<'de, D>(deserializer: D) -> Result<Option<CollectionKey>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<ParentRef>::deserialize(deserializer)? {
        Some(ParentRef::Key(key)) => Ok(Some(key)),
        Some(ParentRef::Flag(false)) | None => Ok(None),
        Some(ParentRef::Flag(true)) => Err(serde::de::Error::custom(
            "parentCollection must be a key or false",
        )),
    }
}

/// One library with its full collection forest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    #[serde(default)]
    pub collections: Vec<Collection>,
}

impl Library {
    /// Check the forest invariants: unique keys, parents present in this library.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::with_capacity(self.collections.len());
        for collection in &self.collections {
            if !seen.insert(collection.key.as_str()) {
                return Err(format!(
                    "library '{}' has duplicate collection key '{}'",
                    self.name, collection.key
                ));
            }
        }

        for collection in &self.collections {
            if let Some(parent) = &collection.parent_key {
                if !seen.contains(parent.as_str()) {
                    return Err(format!(
                        "collection '{}' in library '{}' references unknown parent '{}'",
                        collection.key, self.name, parent
                    ));
                }
            }
        }

        Ok(())
    }

    /// Every collection rendered as a `Library/A/B` path, in snapshot order.
    pub fn collection_paths(&self) -> Vec<String> {
        let by_key: HashMap<&str, &Collection> = self
            .collections
            .iter()
            .map(|c| (c.key.as_str(), c))
            .collect();

        self.collections
            .iter()
            .map(|collection| {
                let mut segments = vec![collection.name.as_str()];
                let mut parent = collection.parent_key.as_deref();
                // Bounded by the collection count so a malformed cycle cannot spin.
                let mut hops = 0;
                while let Some(key) = parent {
                    let Some(p) = by_key.get(key) else { break };
                    segments.push(p.name.as_str());
                    parent = p.parent_key.as_deref();
                    hops += 1;
                    if hops > self.collections.len() {
                        break;
                    }
                }
                segments.push(self.name.as_str());
                segments.reverse();
                segments.join("/")
            })
            .collect()
    }
}

/// A parsed `Library/Segment/.../Segment` collection path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionPath {
    raw: String,
}

impl CollectionPath {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// First segment: the library name
    pub fn library(&self) -> &str {
        self.raw.split('/').next().unwrap_or_default()
    }

    /// Segments after the library name
    pub fn segments(&self) -> Vec<&str> {
        self.raw.split('/').skip(1).collect()
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for CollectionPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Result of a successful path resolution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedCollection {
    pub library_id: LibraryId,
    pub collection_key: CollectionKey,
}
