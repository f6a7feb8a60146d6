// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Object store abstraction — a flat key → bytes map with small string
// metadata, prefix listing, and atomic promotion of staged keys.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::{debug, instrument};
use voucherwerk_core::Metadata;
use voucherwerk_core::error::{Result, VoucherwerkError};

/// Size and metadata of a stored object, without its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub size: u64,
    pub metadata: Metadata,
}

/// Byte-oriented object storage used by the merge pipeline.
///
/// Implementations must be safe to share between threads. Mutual exclusion
/// per voucher is provided separately by a lease provider.
pub trait ObjectStore: Send + Sync {
    /// Object bytes, or `NotFound`.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Create or replace `key`.
    fn put(&self, key: &str, bytes: &[u8], metadata: &Metadata) -> Result<()>;

    /// Keys starting with `prefix`, in ascending byte order.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Size and metadata, or `NotFound`.
    fn head(&self, key: &str) -> Result<ObjectHead>;

    /// Remove `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Rename every `(staged, final)` pair, replacing existing finals.
    ///
    /// All-or-nothing: if any staged key is missing, nothing moves.
    fn promote(&self, moves: &[(String, String)]) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool> {
        match self.head(key) {
            Ok(_) => Ok(true),
            Err(VoucherwerkError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    metadata: Metadata,
}

/// Thread-safe in-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

fn poisoned<T>(_: T) -> VoucherwerkError {
    VoucherwerkError::Storage("memory store lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> Result<usize> {
        Ok(self.objects.read().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let objects = self.objects.read().map_err(poisoned)?;
        objects
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| VoucherwerkError::NotFound(key.to_owned()))
    }

    fn put(&self, key: &str, bytes: &[u8], metadata: &Metadata) -> Result<()> {
        let mut objects = self.objects.write().map_err(poisoned)?;
        objects.insert(
            key.to_owned(),
            StoredObject {
                bytes: bytes.to_vec(),
                metadata: metadata.clone(),
            },
        );
        debug!(key, len = bytes.len(), "object stored");
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read().map_err(poisoned)?;
        Ok(objects
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn head(&self, key: &str) -> Result<ObjectHead> {
        let objects = self.objects.read().map_err(poisoned)?;
        objects
            .get(key)
            .map(|o| ObjectHead {
                size: o.bytes.len() as u64,
                metadata: o.metadata.clone(),
            })
            .ok_or_else(|| VoucherwerkError::NotFound(key.to_owned()))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    #[instrument(skip_all, fields(count = moves.len()))]
    fn promote(&self, moves: &[(String, String)]) -> Result<()> {
        let mut objects = self.objects.write().map_err(poisoned)?;
        if let Some((missing, _)) = moves.iter().find(|(staged, _)| !objects.contains_key(staged)) {
            return Err(VoucherwerkError::NotFound(missing.clone()));
        }
        for (staged, final_key) in moves {
            if let Some(object) = objects.remove(staged) {
                objects.insert(final_key.clone(), object);
            }
        }
        debug!("staged objects promoted");
        Ok(())
    }
}
