//! Read and write scopes
//!
//! A [`ReadTxn`] observes a consistent state for its whole duration. A
//! [`WriteTxn`] buffers its writes and reads its own writes back; the buffer
//! is committed by [`Engine::update`](super::Engine::update) when the scope
//! returns `Ok`.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use crate::error::Result;
use crate::memtable::Entry;

use super::Engine;

/// Read scope handed to [`Engine::view`](super::Engine::view)
pub struct ReadTxn<'a> {
    engine: &'a Engine,
}

impl<'a> ReadTxn<'a> {
    pub(super) fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.engine.read_entry(key)
    }

    /// Whether a live value exists for `key`
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Up to `limit` live entries whose key starts with `prefix`, ascending by key
    pub fn scan_prefix(&self, prefix: &[u8], limit: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        if limit == 0 {
            return Ok(out);
        }
        self.engine.visit_prefix(prefix, |key, value| {
            out.push((key, value));
            if out.len() >= limit {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        Ok(out)
    }

    /// Visit live entries whose key starts with `prefix`, ascending by key,
    /// until the visitor breaks
    pub fn visit_prefix(
        &self,
        prefix: &[u8],
        visit: impl FnMut(Vec<u8>, Vec<u8>) -> ControlFlow<()>,
    ) -> Result<()> {
        self.engine.visit_prefix(prefix, visit)
    }
}

/// Write scope handed to [`Engine::update`](super::Engine::update)
pub struct WriteTxn<'a> {
    engine: &'a Engine,
    pending: BTreeMap<Vec<u8>, Entry>,
}

impl<'a> WriteTxn<'a> {
    pub(super) fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            pending: BTreeMap::new(),
        }
    }

    /// Get a value by key, seeing this scope's own pending writes
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.pending.get(key) {
            Some(Entry::Value(value)) => Ok(Some(value.clone())),
            Some(Entry::Tombstone) => Ok(None),
            None => self.engine.read_entry(key),
        }
    }

    /// Whether a live value exists for `key`
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Buffer a write
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.pending.insert(key.to_vec(), Entry::Value(value.to_vec()));
    }

    /// Buffer a delete
    pub fn delete(&mut self, key: &[u8]) {
        self.pending.insert(key.to_vec(), Entry::Tombstone);
    }

    /// Number of buffered writes
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(super) fn into_writes(self) -> BTreeMap<Vec<u8>, Entry> {
        self.pending
    }
}
