//! Name-keyed catalogs with fail-fast duplicate detection.
//!
//! Both the collector catalog and the provider registry are built on
//! [`Catalog`]. Catalogs are constructed explicitly at startup and passed to
//! the components that need them.

use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while building or querying a catalog. Both are fatal at
/// startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate registration for `{0}`")]
    Duplicate(String),

    #[error("`{0}` is not registered")]
    NotFound(String),
}

/// An insertion-ordered map from unique names to entries.
#[derive(Debug, Clone)]
pub struct Catalog<T> {
    index: HashMap<String, usize>,
    entries: Vec<(String, T)>,
}

impl<T> Default for Catalog<T> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<T> Catalog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` under `name`.
    ///
    /// # Returns
    /// * `Err(RegistryError::Duplicate)` if the name is already taken. The
    ///   existing entry is left untouched.
    pub fn add(&mut self, name: impl Into<String>, entry: T) -> Result<(), RegistryError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, entry));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    /// Like [`Catalog::get`], but an unknown name is an error.
    pub fn require(&self, name: &str) -> Result<&T, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
