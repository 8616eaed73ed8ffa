use std::fmt::{self, Write};
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// The kinds of values held in the caches.
///
/// The name is part of every [`CacheKey`], so two different intents can never share an entry,
/// even when their remaining inputs are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheName {
    /// Aggregates across all providers.
    Trending,
    /// Results of a single provider.
    Provider,
    /// Cross-provider search results.
    Search,
    /// Computed content analyses.
    Analysis,
}

impl AsRef<str> for CacheName {
    fn as_ref(&self) -> &str {
        match self {
            Self::Trending => "trending",
            Self::Provider => "provider",
            Self::Search => "search",
            Self::Analysis => "analysis",
        }
    }
}

impl fmt::Display for CacheName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// A deterministic key for a cache entry.
///
/// Rendered as `<cache-name>/<sha256 hex>`, where the hash covers the cache name and all
/// the semantic inputs that were written to the [`CacheKeyBuilder`].
#[derive(Debug, Clone, Eq)]
pub struct CacheKey {
    name: CacheName,
    metadata: Arc<str>,
    hash: [u8; 32],
}

impl CacheKey {
    /// Create a [`CacheKeyBuilder`] for the given cache.
    pub fn builder(name: CacheName) -> CacheKeyBuilder {
        CacheKeyBuilder {
            name,
            metadata: format!("cache: {name}\n"),
        }
    }

    /// The cache this key belongs to.
    pub fn name(&self) -> CacheName {
        self.name
    }

    /// Returns the human-readable metadata that forms the basis of the [`CacheKey`].
    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    /// The hex-formatted sha-256 hash of the metadata.
    pub fn hash_hex(&self) -> String {
        let mut hex = String::with_capacity(64);
        for b in &self.hash {
            let _ = write!(hex, "{b:02x}");
        }
        hex
    }

    /// The string under which the entry is stored in a backend.
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.name, self.hash_hex())
    }

    #[cfg(test)]
    pub fn for_testing(key: impl AsRef<str>) -> Self {
        let mut builder = Self::builder(CacheName::Trending);
        builder.write_str(key.as_ref()).unwrap();
        builder.build()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/", self.name)?;
        for b in &self.hash {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl std::hash::Hash for CacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

/// A builder for [`CacheKey`]s.
///
/// This builder implements the [`Write`](std::fmt::Write) trait, and the intention of it is to
/// accept human readable, but most importantly **stable**, input.
/// This input is then being hashed to form the [`CacheKey`].
#[derive(Debug)]
pub struct CacheKeyBuilder {
    name: CacheName,
    metadata: String,
}

impl CacheKeyBuilder {
    /// Adds a named parameter.
    pub fn param(mut self, name: &str, value: impl fmt::Display) -> Self {
        let _ = writeln!(self.metadata, "{name}: {value}");
        self
    }

    /// Finalize the [`CacheKey`].
    pub fn build(self) -> CacheKey {
        let hash: [u8; 32] = Sha256::digest(&self.metadata).into();

        CacheKey {
            name: self.name,
            metadata: self.metadata.into(),
            hash,
        }
    }
}

impl fmt::Write for CacheKeyBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.metadata.write_str(s)
    }
}
