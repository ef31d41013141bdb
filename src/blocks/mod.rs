//! Block library.
//!
//! This module provides the [`Block`] capability trait and every block the
//! engine ships with:
//! - Sources: Const, Source
//! - Arithmetic: Gain, AddSub, MulDiv, Pipe
//! - Functions: Function (single input), MimoFunction
//! - Stateful: Integrator, TriggeredIntegrator, Delay, Memory, BusMemory,
//!   InitialValue, Derivative
//! - Routing: Bus, BusSelector
//!
//! A block sees only its own input values for the current pass and its own
//! held state. Stateful blocks absorb new input exclusively in
//! [`Block::commit`], which the run harness calls once per completed step.

mod bus;
mod delay;
mod derivative;
mod function;
mod integrator;
mod math;
mod memory;

pub use bus::{Bus, BusSelector};
pub use delay::Delay;
pub use derivative::Derivative;
pub use function::{Function, MimoFunction};
pub use integrator::{Integrator, TriggeredIntegrator};
pub use math::{AddSub, Const, Gain, MulDiv, Pipe, Source};
pub use memory::{BusMemory, InitialValue, Memory};

use crate::error::{Result, SimError};
use crate::signal::{Signal, Value, ValueMap};

/// Which inputs must be present before a block can be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Every declared input
    AllInputs,
    /// Only the inputs at these positions
    Inputs(&'static [usize]),
    /// No input; the block is always evaluable
    Always,
}

impl Readiness {
    /// Check the rule against the block's input signals.
    pub fn is_satisfied(&self, inputs: &[Signal], values: &ValueMap) -> bool {
        match self {
            Readiness::AllInputs => inputs.iter().all(|s| values.contains(s)),
            Readiness::Inputs(indices) => indices
                .iter()
                .all(|&i| inputs.get(i).is_some_and(|s| values.contains(s))),
            Readiness::Always => true,
        }
    }
}

/// Values of one block's ports, looked up in the current value map.
#[derive(Clone, Copy)]
pub struct PortValues<'a> {
    block: &'a str,
    signals: &'a [Signal],
    values: &'a ValueMap,
}

impl<'a> PortValues<'a> {
    pub fn new(block: &'a str, signals: &'a [Signal], values: &'a ValueMap) -> Self {
        Self {
            block,
            signals,
            values,
        }
    }

    /// Qualified name of the block these ports belong to.
    pub fn block(&self) -> &'a str {
        self.block
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn signals(&self) -> &'a [Signal] {
        self.signals
    }

    /// Value of the port at `index`.
    pub fn get(&self, index: usize) -> Result<&'a Value> {
        let signal = self.signals.get(index).ok_or_else(|| {
            SimError::missing(format!("{} port #{}", self.block, index))
        })?;
        self.values.require(signal)
    }

    pub fn scalar(&self, index: usize) -> Result<f64> {
        self.get(index)?.as_scalar()
    }

    /// Values of every port, in declaration order.
    pub fn all(&self) -> Result<Vec<&'a Value>> {
        (0..self.signals.len()).map(|i| self.get(i)).collect()
    }
}

/// The capability every block implements.
///
/// Blocks are owned by a [`Model`](crate::model::Model); the model keeps their
/// qualified name, port signals and per-pass `processed` flag, and calls into
/// the block only through this trait.
pub trait Block {
    /// Short type name, e.g. `"Gain"`.
    fn kind(&self) -> &'static str;

    /// Validate the resolved ports. Called once while the model is built.
    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()>;

    /// Evaluability rule for the current pass.
    fn readiness(&self) -> Readiness {
        Readiness::AllInputs
    }

    /// Compute one value per output from the current inputs.
    fn activate(&mut self, t: f64, inputs: &PortValues<'_>) -> Result<Vec<Value>>;

    /// Held continuous state, for blocks whose output is seeded from the
    /// integrator's state vector instead of being computed by `activate`.
    fn state(&self) -> Option<&Value> {
        None
    }

    /// Absorb this step's values into held state.
    fn commit(&mut self, _t: f64, _inputs: &PortValues<'_>, _outputs: &PortValues<'_>) -> Result<()> {
        Ok(())
    }

    /// Replacement for the held state at the start of the next step, once
    /// the state vector has been advanced. Returning `Some` clears the
    /// pending reset.
    fn take_reset(&mut self) -> Result<Option<Value>> {
        Ok(None)
    }

    /// Member names of the bus this block produces, when known statically.
    fn bus_layout(&self) -> Option<&[String]> {
        None
    }

    /// Member paths this block selects out of its input bus.
    fn bus_selection(&self) -> Option<&[String]> {
        None
    }
}

/// Check a fixed number of ports.
pub(crate) fn expect_ports(
    name: &str,
    direction: &'static str,
    expected: usize,
    signals: &[Signal],
) -> Result<()> {
    if signals.len() != expected {
        return Err(SimError::port_count(name, direction, expected.to_string(), signals.len()));
    }
    Ok(())
}

/// Check that at least `min` ports are present.
pub(crate) fn expect_at_least(
    name: &str,
    direction: &'static str,
    min: usize,
    signals: &[Signal],
) -> Result<()> {
    if signals.len() < min {
        return Err(SimError::port_count(name, direction, format!("{} or more", min), signals.len()));
    }
    Ok(())
}
