//! Nuisance parameters
//!
//! [`NuisanceRegistry`] is the universe of named nuisance parameters of one
//! fit. Measurements declare the names they need while they are constructed
//! and keep the returned indices; the combined loss function takes ownership
//! of the registry and freezes it. [`Nuisances`] is the read-only view of the
//! nuisance segment of the flat parameter vector handed to every measurement
//! evaluation.

use jf_core::{Error, Result};
use std::collections::HashMap;

/// Ordered set of unique nuisance names with stable zero-based indices.
#[derive(Debug, Clone, Default)]
pub struct NuisanceRegistry {
    names: Vec<String>,
    index: HashMap<String, usize>,
    frozen: bool,
}

impl NuisanceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a nuisance and return its index.
    ///
    /// Declaring an existing name returns the existing index. Declaring a new
    /// name after [`freeze`](Self::freeze) is an error.
    pub fn declare(&mut self, name: &str) -> Result<usize> {
        if let Some(&idx) = self.index.get(name) {
            return Ok(idx);
        }
        if self.frozen {
            return Err(Error::UnknownName(name.to_string()));
        }
        if name.is_empty() {
            return Err(Error::Validation("nuisance name must not be empty".into()));
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        log::debug!("declared nuisance {name:?} with index {idx}");
        Ok(idx)
    }

    /// Index of a declared nuisance.
    pub fn index(&self, name: &str) -> Result<usize> {
        self.index.get(name).copied().ok_or_else(|| Error::UnknownName(name.to_string()))
    }

    /// Whether `name` has been declared.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Name of the nuisance at `index`.
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// All names in index order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of declared nuisances.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if no nuisance has been declared.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Forbid further declarations.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether [`freeze`](Self::freeze) has been called.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// A zero-filled value vector of registry length.
    pub fn zeros(&self) -> Vec<f64> {
        vec![0.0; self.names.len()]
    }
}

/// Values of the nuisance parameters for one evaluation.
///
/// Borrowed from the tail of the flat parameter vector. Indices past the end
/// read as zero.
#[derive(Debug, Clone, Copy)]
pub struct Nuisances<'a> {
    values: &'a [f64],
}

impl<'a> Nuisances<'a> {
    /// Wrap a slice of nuisance values (registry index order).
    pub fn new(values: &'a [f64]) -> Self {
        Self { values }
    }

    /// All nuisances at zero.
    pub fn nominal() -> Self {
        Self { values: &[] }
    }

    /// Value of the nuisance with the given index.
    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or(0.0)
    }

    /// Value of a nuisance by name. Slow path; measurements read by index.
    pub fn value(&self, registry: &NuisanceRegistry, name: &str) -> Result<f64> {
        Ok(self.get(registry.index(name)?))
    }

    /// Number of explicitly supplied values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no values were supplied.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Underlying values.
    pub fn as_slice(&self) -> &'a [f64] {
        self.values
    }
}
