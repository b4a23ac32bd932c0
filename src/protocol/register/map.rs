use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use std::sync::Arc;

use super::types::{FunctionCode, RegisterMapEntry};

/// Insertion-ordered collection of register map entries.
///
/// Ranges may overlap; lookups always resolve to the first entry that
/// covers the queried address.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterMap {
    entries: Vec<RegisterMapEntry>,
}

impl RegisterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<RegisterMapEntry>) -> Self {
        Self { entries }
    }

    pub fn lookup(&self, function: FunctionCode, address: u16) -> Option<&RegisterMapEntry> {
        self.entries
            .iter()
            .find(|entry| entry.covers(function, address))
    }

    pub fn push(&mut self, entry: RegisterMapEntry) {
        self.entries.push(entry);
    }

    /// Edit an entry in place, keeping its position in the lookup order.
    pub fn replace_at(&mut self, index: usize, entry: RegisterMapEntry) -> Result<()> {
        let len = self.entries.len();
        let slot = self
            .entries
            .get_mut(index)
            .ok_or_else(|| anyhow!("No register map entry at index {index} (map has {len})"))?;
        *slot = entry;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[RegisterMapEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegisterMapEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<RegisterMapEntry> for RegisterMap {
    fn from_iter<I: IntoIterator<Item = RegisterMapEntry>>(iter: I) -> Self {
        Self::from_entries(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RegisterMap {
    type Item = &'a RegisterMapEntry;
    type IntoIter = std::slice::Iter<'a, RegisterMapEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Cloneable handle to the register map shared between the editor side and
/// every in-flight request handler.
///
/// Writers publish a new immutable snapshot; readers grab the current one
/// with [`SharedRegisterMap::snapshot`] and keep it for the whole request.
#[derive(Debug, Clone, Default)]
pub struct SharedRegisterMap {
    inner: Arc<RwLock<Arc<RegisterMap>>>,
}

impl SharedRegisterMap {
    pub fn new(map: RegisterMap) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(map))),
        }
    }

    pub fn snapshot(&self) -> Arc<RegisterMap> {
        self.inner.read().clone()
    }

    /// Apply `f` to a private copy of the map and publish the result.
    /// Snapshots already handed out are left untouched.
    pub fn update<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut RegisterMap) -> T,
    {
        let mut guard = self.inner.write();
        f(Arc::make_mut(&mut guard))
    }

    pub fn push(&self, entry: RegisterMapEntry) {
        self.update(|map| map.push(entry));
    }

    pub fn replace_at(&self, index: usize, entry: RegisterMapEntry) -> Result<()> {
        self.update(|map| map.replace_at(index, entry))
    }

    /// Swap in a whole new map, e.g. after a CSV import.
    pub fn replace_all(&self, map: RegisterMap) {
        *self.inner.write() = Arc::new(map);
    }

    pub fn clear(&self) {
        self.replace_all(RegisterMap::new());
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl From<RegisterMap> for SharedRegisterMap {
    fn from(map: RegisterMap) -> Self {
        Self::new(map)
    }
}
