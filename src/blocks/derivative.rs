//! Backward-difference differentiator.

use super::{expect_ports, Block, PortValues};
use crate::error::Result;
use crate::signal::{Signal, Value};

/// Numeric time derivative of its input.
///
/// Returns the configured initial value until one step has been committed.
/// Asked again at the timestamp of the last commit it repeats the output
/// committed there; otherwise it differentiates against the last committed
/// input sample.
#[derive(Debug, Clone)]
pub struct Derivative {
    initial: Value,
    /// `(t, input, output)` at the last commit
    last: Option<(f64, Value, Value)>,
}

impl Default for Derivative {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Derivative {
    pub fn new(initial: impl Into<Value>) -> Self {
        Self {
            initial: initial.into(),
            last: None,
        }
    }
}

impl Block for Derivative {
    fn kind(&self) -> &'static str {
        "Derivative"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "input", 1, inputs)?;
        expect_ports(name, "output", 1, outputs)
    }

    fn activate(&mut self, t: f64, inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        let Some((t_prev, x_prev, y_prev)) = &self.last else {
            return Ok(vec![self.initial.clone()]);
        };
        if t == *t_prev {
            return Ok(vec![y_prev.clone()]);
        }
        let dt = t - t_prev;
        let y = inputs.get(0)?.sub(x_prev)?.scale(1.0 / dt)?;
        Ok(vec![y])
    }

    fn commit(&mut self, t: f64, inputs: &PortValues<'_>, outputs: &PortValues<'_>) -> Result<()> {
        self.last = Some((t, inputs.get(0)?.clone(), outputs.get(0)?.clone()));
        Ok(())
    }
}
