//! Sample-and-hold blocks.

use std::collections::{BTreeMap, BTreeSet};

use super::{expect_ports, Block, PortValues, Readiness};
use crate::error::{Result, SimError};
use crate::signal::{join, BusValue, Signal, Value};

/// One-step delay: outputs the input recorded at the previous completed step.
#[derive(Debug, Clone)]
pub struct Memory {
    held: Value,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Memory {
    /// Create a memory that reports `initial` until the first commit.
    pub fn new(initial: impl Into<Value>) -> Self {
        Self {
            held: initial.into(),
        }
    }

    pub fn held(&self) -> &Value {
        &self.held
    }
}

impl Block for Memory {
    fn kind(&self) -> &'static str {
        "Memory"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "input", 1, inputs)?;
        expect_ports(name, "output", 1, outputs)
    }

    fn readiness(&self) -> Readiness {
        Readiness::Always
    }

    fn activate(&mut self, _t: f64, _inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        Ok(vec![self.held.clone()])
    }

    fn commit(&mut self, _t: f64, inputs: &PortValues<'_>, _outputs: &PortValues<'_>) -> Result<()> {
        self.held = inputs.get(0)?.clone();
        Ok(())
    }
}

/// Freezes the first value it sees and outputs it for the rest of the run.
///
/// Until the first commit the input passes straight through. Afterwards the
/// block behaves as a constant and no longer waits for its input.
#[derive(Debug, Clone, Default)]
pub struct InitialValue {
    captured: Option<Value>,
}

impl InitialValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured(&self) -> Option<&Value> {
        self.captured.as_ref()
    }
}

impl Block for InitialValue {
    fn kind(&self) -> &'static str {
        "InitialValue"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "input", 1, inputs)?;
        expect_ports(name, "output", 1, outputs)
    }

    fn readiness(&self) -> Readiness {
        if self.captured.is_some() {
            Readiness::Always
        } else {
            Readiness::AllInputs
        }
    }

    fn activate(&mut self, _t: f64, inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        match &self.captured {
            Some(v) => Ok(vec![v.clone()]),
            None => Ok(vec![inputs.get(0)?.clone()]),
        }
    }

    fn commit(&mut self, _t: f64, _inputs: &PortValues<'_>, outputs: &PortValues<'_>) -> Result<()> {
        if self.captured.is_none() {
            self.captured = Some(outputs.get(0)?.clone());
        }
        Ok(())
    }
}

/// One-step delay of a whole bus.
///
/// With an explicit initial bus the block is evaluable from the first pass.
/// Otherwise it waits for its input once, answers with a copy whose members
/// are zero (or the value given with [`with_initial`](Self::with_initial)
/// for that member path), and is always evaluable afterwards.
#[derive(Debug, Clone, Default)]
pub struct BusMemory {
    held: Option<BusValue>,
    initial: BTreeMap<String, Value>,
}

impl BusMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known bus.
    pub fn from_bus(initial: BusValue) -> Self {
        Self {
            held: Some(initial),
            initial: BTreeMap::new(),
        }
    }

    /// Initial value for one member, addressed by its dotted path.
    pub fn with_initial(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.initial.insert(path.into(), value.into());
        self
    }

    pub fn held(&self) -> Option<&BusValue> {
        self.held.as_ref()
    }

    fn initial_like(&self, bus: &BusValue) -> Result<BusValue> {
        let mut used = BTreeSet::new();
        let zeroed = zeroed_like(bus, "", &self.initial, &mut used)?;
        if let Some(unused) = self.initial.keys().find(|k| !used.contains(k.as_str())) {
            return Err(SimError::UnknownBusMember {
                member: unused.clone(),
                available: bus.names().to_vec(),
            });
        }
        Ok(zeroed)
    }
}

fn zeroed_like<'a>(
    bus: &BusValue,
    prefix: &str,
    initial: &'a BTreeMap<String, Value>,
    used: &mut BTreeSet<&'a str>,
) -> Result<BusValue> {
    let mut values = Vec::with_capacity(bus.len());
    for (name, value) in bus.names().iter().zip(bus.values()) {
        let path = join(prefix, name);
        let member = match value {
            Value::Bus(inner) => Value::Bus(zeroed_like(inner, &path, initial, used)?),
            _ => match initial.get_key_value(&path) {
                Some((key, init)) => {
                    let (expected, actual) = (value.len()?, init.len()?);
                    if expected != actual {
                        return Err(SimError::shape_mismatch(expected, actual));
                    }
                    used.insert(key.as_str());
                    init.clone()
                }
                None => value.map(|_| 0.0)?,
            },
        };
        values.push(member);
    }
    BusValue::new(bus.names().to_vec(), values)
}

impl Block for BusMemory {
    fn kind(&self) -> &'static str {
        "BusMemory"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "input", 1, inputs)?;
        expect_ports(name, "output", 1, outputs)
    }

    fn readiness(&self) -> Readiness {
        if self.held.is_some() {
            Readiness::Always
        } else {
            Readiness::AllInputs
        }
    }

    fn activate(&mut self, _t: f64, inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        let held = match &self.held {
            Some(bus) => bus.clone(),
            None => self.initial_like(inputs.get(0)?.as_bus()?)?,
        };
        Ok(vec![Value::Bus(held)])
    }

    fn commit(&mut self, _t: f64, inputs: &PortValues<'_>, _outputs: &PortValues<'_>) -> Result<()> {
        self.held = Some(inputs.get(0)?.as_bus()?.clone());
        Ok(())
    }
}
