//! Output assets produced by a build
//!
//! The collection is mutable only while the `emit` hook runs. After that it is
//! frozen and handed to the writer.

use std::{borrow::Cow, fmt, sync::Arc};

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

type ContentFn = Arc<dyn Fn() -> Vec<u8> + Send + Sync>;

#[derive(Clone)]
enum AssetSource {
    Bytes(Arc<[u8]>),
    Generated(ContentFn),
}

/// A named output file body
///
/// Content is either fixed bytes or produced on demand by a pure function.
#[derive(Clone)]
pub struct Asset {
    source: AssetSource,
}

impl Asset {
    pub fn from_string(content: impl Into<String>) -> Self {
        Self::from_bytes(content.into().into_bytes())
    }

    pub fn from_bytes(content: impl Into<Vec<u8>>) -> Self {
        Self {
            source: AssetSource::Bytes(content.into().into()),
        }
    }

    /// Asset whose content is computed each time it is read
    pub fn from_fn<F>(content: F) -> Self
    where
        F: Fn() -> Vec<u8> + Send + Sync + 'static,
    {
        Self {
            source: AssetSource::Generated(Arc::new(content)),
        }
    }

    pub fn content(&self) -> Cow<'_, [u8]> {
        match &self.source {
            AssetSource::Bytes(bytes) => Cow::Borrowed(bytes),
            AssetSource::Generated(content) => Cow::Owned(content()),
        }
    }

    /// Content length in bytes
    pub fn size(&self) -> usize {
        match &self.source {
            AssetSource::Bytes(bytes) => bytes.len(),
            AssetSource::Generated(content) => content().len(),
        }
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.source {
            AssetSource::Bytes(_) => "bytes",
            AssetSource::Generated(_) => "generated",
        };
        f.debug_struct("Asset")
            .field("kind", &kind)
            .field("size", &self.size())
            .finish()
    }
}

/// Mutable mapping from output file name to asset, in insertion order
#[derive(Debug, Clone, Default)]
pub struct AssetCollection {
    assets: IndexMap<String, Asset>,
}

impl AssetCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an asset, returning the one it replaced
    ///
    /// A replaced asset keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, asset: Asset) -> Option<Asset> {
        self.assets.insert(name.into(), asset)
    }

    pub fn get(&self, name: &str) -> Option<&Asset> {
        self.assets.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Asset> {
        self.assets.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.assets.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Asset)> {
        self.assets.iter().map(|(name, asset)| (name.as_str(), asset))
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// End the mutable phase
    pub fn freeze(self) -> FrozenAssets {
        FrozenAssets {
            assets: self.assets,
        }
    }
}

/// Read-only view of the final asset set
#[derive(Debug, Clone)]
pub struct FrozenAssets {
    assets: IndexMap<String, Asset>,
}

impl FrozenAssets {
    pub fn get(&self, name: &str) -> Option<&Asset> {
        self.assets.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Asset)> {
        self.assets.iter().map(|(name, asset)| (name.as_str(), asset))
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Lowercase hex SHA-256 of `content`
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
