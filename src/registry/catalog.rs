//! Append-only, insertion-ordered catalog with case-insensitive unique names.

use std::collections::HashMap;

/// Anything stored in a [`Catalog`] exposes its identity name.
pub trait Named {
    fn name(&self) -> &str;
}

/// Ordered collection keyed by a case-insensitive name.
///
/// Iteration follows insertion order, which is the priority order the
/// resolver relies on. Entries are never removed.
#[derive(Debug)]
pub struct Catalog<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for Catalog<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Named> Catalog<T> {
    /// Insert `item` unless its name is already present.
    ///
    /// Returns `Ok(position)` for a fresh entry and `Err(existing_position)`
    /// when the name is taken; the catalog is untouched in that case.
    pub fn insert(&mut self, item: T) -> Result<usize, usize> {
        let key = item.name().to_lowercase();
        if let Some(&existing) = self.index.get(&key) {
            return Err(existing);
        }
        let position = self.items.len();
        self.items.push(item);
        self.index.insert(key, position);
        Ok(position)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_lowercase()).copied()
    }

    pub fn find(&self, name: &str) -> Option<&T> {
        self.position(name).map(|i| &self.items[i])
    }
}

impl<T> Catalog<T> {
    pub fn get(&self, position: usize) -> Option<&T> {
        self.items.get(position)
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut T> {
        self.items.get_mut(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

impl<T> std::ops::Index<usize> for Catalog<T> {
    type Output = T;

    fn index(&self, position: usize) -> &T {
        &self.items[position]
    }
}
