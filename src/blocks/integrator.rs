//! Continuous-time integrator.

use super::{expect_ports, Block, PortValues};
use crate::error::Result;
use crate::signal::{Signal, Value};

/// Integrates its input: `dy/dt = u`.
///
/// The output is the held state, seeded into the value map from the state
/// vector before each resolver pass, so an integrator breaks any cycle it
/// sits on. During the pass it is marked processed once its derivative input
/// has arrived; that is bookkeeping only.
#[derive(Debug, Clone)]
pub struct Integrator {
    value: Value,
}

impl Integrator {
    /// Create an integrator with initial condition `x0` (scalar or array).
    pub fn new(x0: impl Into<Value>) -> Self {
        Self { value: x0.into() }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Block for Integrator {
    fn kind(&self) -> &'static str {
        "Integrator"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "input", 1, inputs)?;
        expect_ports(name, "output", 1, outputs)?;
        // State must be packable into the flat vector
        self.value.len().map(|_| ())
    }

    fn activate(&mut self, _t: f64, _inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        // Output is seeded from the state vector
        Ok(Vec::new())
    }

    fn state(&self) -> Option<&Value> {
        Some(&self.value)
    }

    fn commit(&mut self, _t: f64, _inputs: &PortValues<'_>, outputs: &PortValues<'_>) -> Result<()> {
        self.value = outputs.get(0)?.clone();
        Ok(())
    }
}

/// Integrator with a reset input: `inputs = [u, trigger]`.
///
/// A non-zero trigger seen at a completed step zeroes the state at the start
/// of the following step. Between resets it integrates like [`Integrator`].
#[derive(Debug, Clone)]
pub struct TriggeredIntegrator {
    value: Value,
    triggered: bool,
}

impl TriggeredIntegrator {
    pub fn new(x0: impl Into<Value>) -> Self {
        Self {
            value: x0.into(),
            triggered: false,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// True if a reset is pending for the next step.
    pub fn is_triggered(&self) -> bool {
        self.triggered
    }
}

impl Default for TriggeredIntegrator {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Block for TriggeredIntegrator {
    fn kind(&self) -> &'static str {
        "TriggeredIntegrator"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "input", 2, inputs)?;
        expect_ports(name, "output", 1, outputs)?;
        self.value.len().map(|_| ())
    }

    fn activate(&mut self, _t: f64, _inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    fn state(&self) -> Option<&Value> {
        Some(&self.value)
    }

    fn commit(&mut self, _t: f64, inputs: &PortValues<'_>, outputs: &PortValues<'_>) -> Result<()> {
        self.value = outputs.get(0)?.clone();
        if !self.triggered {
            self.triggered = inputs.scalar(1)? != 0.0;
        }
        Ok(())
    }

    fn take_reset(&mut self) -> Result<Option<Value>> {
        if !self.triggered {
            return Ok(None);
        }
        self.triggered = false;
        self.value = self.value.map(|_| 0.0)?;
        Ok(Some(self.value.clone()))
    }
}
