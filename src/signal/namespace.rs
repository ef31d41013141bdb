//! Hierarchical signal naming and output registration.

use std::collections::HashMap;

use super::Signal;
use crate::error::{Result, SimError};
use crate::SCOPE_SEPARATOR;

/// Join a scope prefix and a local name.
pub fn join(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", scope, SCOPE_SEPARATOR, name)
    }
}

/// Issues qualified signal identifiers and keeps the output registry.
///
/// Anonymous serials come from a single counter shared by every scope, so
/// two unrelated composites can never receive the same anonymous signal.
#[derive(Debug, Default)]
pub struct Namespace {
    next_serial: u64,
    /// Output signal -> name of the block writing it
    outputs: HashMap<Signal, String>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Qualify a local name with a scope prefix. Stable for equal arguments.
    pub fn qualify(name: &str, scope: &str) -> Signal {
        Signal::Named(join(scope, name))
    }

    /// Issue a new anonymous signal in the given scope.
    pub fn fresh_anonymous(&mut self, scope: &str) -> Signal {
        let serial = self.next_serial;
        self.next_serial += 1;
        Signal::Anonymous {
            scope: scope.to_string(),
            serial,
        }
    }

    /// Register `signal` as written by `block`.
    ///
    /// Every output signal may be registered exactly once per model.
    pub fn register_output(&mut self, signal: &Signal, block: &str) -> Result<()> {
        if let Some(existing) = self.outputs.get(signal) {
            return Err(SimError::DuplicateOutput {
                signal: signal.to_string(),
                block: block.to_string(),
                existing: existing.clone(),
            });
        }
        self.outputs.insert(signal.clone(), block.to_string());
        Ok(())
    }

    /// Name of the block writing `signal`, if any.
    pub fn producer(&self, signal: &Signal) -> Option<&str> {
        self.outputs.get(signal).map(String::as_str)
    }

    /// All registered output signals with their writers.
    pub fn outputs(&self) -> impl Iterator<Item = (&Signal, &str)> {
        self.outputs.iter().map(|(s, b)| (s, b.as_str()))
    }
}
