//! Bus packing and member selection.
//!
//! A [`Bus`] packs its inputs into one [`BusValue`] that carries the member
//! names. A [`BusSelector`] resolves member paths such as `"wheel.omega"`
//! (nested buses joined by the scope separator) to positional indices on
//! first use and emits each selected member as its own output.

use super::{expect_at_least, expect_ports, Block, PortValues};
use crate::error::{Result, SimError};
use crate::signal::{BusValue, Signal, Value};
use crate::SCOPE_SEPARATOR;

/// Packs N inputs into a single bus output.
#[derive(Debug, Clone, Default)]
pub struct Bus {
    /// Member names; taken from the input signals' short names when not given
    members: Option<Vec<String>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit member names instead of the input signal names.
    pub fn with_members<S: Into<String>>(members: impl IntoIterator<Item = S>) -> Self {
        Self {
            members: Some(members.into_iter().map(Into::into).collect()),
        }
    }
}

impl Block for Bus {
    fn kind(&self) -> &'static str {
        "Bus"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_at_least(name, "input", 1, inputs)?;
        expect_ports(name, "output", 1, outputs)?;
        let members = self
            .members
            .get_or_insert_with(|| inputs.iter().map(Signal::short_name).collect());
        if members.len() != inputs.len() {
            return Err(SimError::port_count(
                name,
                "input",
                members.len().to_string(),
                inputs.len(),
            ));
        }
        Ok(())
    }

    fn activate(&mut self, _t: f64, inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        let names = self.members.clone().unwrap_or_default();
        let values = inputs.all()?.into_iter().cloned().collect();
        Ok(vec![Value::Bus(BusValue::new(names, values)?)])
    }

    fn bus_layout(&self) -> Option<&[String]> {
        self.members.as_deref()
    }
}

/// Selects named members out of one bus input.
#[derive(Debug, Clone)]
pub struct BusSelector {
    members: Vec<String>,
    /// Index path per member, filled on first activation
    cache: Option<Vec<Vec<usize>>>,
}

impl BusSelector {
    pub fn new<S: Into<String>>(members: impl IntoIterator<Item = S>) -> Self {
        Self {
            members: members.into_iter().map(Into::into).collect(),
            cache: None,
        }
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    fn resolve_path(bus: &BusValue, path: &str) -> Result<Vec<usize>> {
        let mut indices = Vec::new();
        let mut current = bus;
        let mut segments = path.split(SCOPE_SEPARATOR).peekable();
        while let Some(segment) = segments.next() {
            let index = current
                .index_of(segment)
                .ok_or_else(|| SimError::UnknownBusMember {
                    member: path.to_string(),
                    available: current.names().to_vec(),
                })?;
            indices.push(index);
            if segments.peek().is_some() {
                current = current.values()[index].as_bus()?;
            }
        }
        Ok(indices)
    }

    /// Follow a cached index path, checking the names still line up.
    fn follow<'a>(bus: &'a BusValue, path: &str, indices: &[usize]) -> Option<&'a Value> {
        let mut current = bus;
        let mut steps = path.split(SCOPE_SEPARATOR).zip(indices).peekable();
        while let Some((segment, &index)) = steps.next() {
            if current.names().get(index).map(String::as_str) != Some(segment) {
                return None;
            }
            let value = current.at(index)?;
            if steps.peek().is_none() {
                return Some(value);
            }
            match value {
                Value::Bus(b) => current = b,
                _ => return None,
            }
        }
        None
    }
}

impl Block for BusSelector {
    fn kind(&self) -> &'static str {
        "BusSelector"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "input", 1, inputs)?;
        expect_ports(name, "output", self.members.len(), outputs)
    }

    fn activate(&mut self, _t: f64, inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        let bus = inputs.get(0)?.as_bus()?;

        if let Some(cache) = &self.cache {
            let hits: Option<Vec<Value>> = self
                .members
                .iter()
                .zip(cache)
                .map(|(path, indices)| Self::follow(bus, path, indices).cloned())
                .collect();
            if let Some(values) = hits {
                return Ok(values);
            }
            log::debug!("{}: bus layout changed, resolving members again", inputs.block());
        }

        let cache = self
            .members
            .iter()
            .map(|path| Self::resolve_path(bus, path))
            .collect::<Result<Vec<_>>>()?;
        let values = self
            .members
            .iter()
            .zip(&cache)
            .map(|(path, indices)| {
                Self::follow(bus, path, indices).cloned().ok_or_else(|| {
                    SimError::UnknownBusMember {
                        member: path.clone(),
                        available: bus.names().to_vec(),
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.cache = Some(cache);
        Ok(values)
    }

    fn bus_selection(&self) -> Option<&[String]> {
        Some(&self.members)
    }
}
