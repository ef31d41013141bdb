//! The per-step value map.

use std::collections::HashMap;

use super::{Signal, Value};
use crate::error::{Result, SimError};

/// Mapping from signal to its value for one evaluation pass.
///
/// A signal is written at most once per pass; a second write is a
/// [`SimError::DoubleWrite`].
#[derive(Debug, Clone, Default)]
pub struct ValueMap {
    values: HashMap<Signal, Value>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: HashMap::with_capacity(capacity),
        }
    }

    /// Write a signal's value for this pass.
    pub fn insert(&mut self, signal: Signal, value: Value) -> Result<()> {
        if self.values.contains_key(&signal) {
            return Err(SimError::DoubleWrite {
                signal: signal.to_string(),
            });
        }
        self.values.insert(signal, value);
        Ok(())
    }

    pub fn get(&self, signal: &Signal) -> Option<&Value> {
        self.values.get(signal)
    }

    /// Get a signal's value, failing if it is absent.
    pub fn require(&self, signal: &Signal) -> Result<&Value> {
        self.values.get(signal).ok_or_else(|| SimError::missing(signal))
    }

    /// Look up a named signal by its qualified name.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.values.get(&Signal::named(name))
    }

    pub fn contains(&self, signal: &Signal) -> bool {
        self.values.contains_key(signal)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Signal, &Value)> {
        self.values.iter()
    }
}
