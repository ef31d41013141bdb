//! Variable transport delay.
//!
//! The delay keeps a bounded history of `(time, value)` samples, one per
//! completed step, and answers with the linearly interpolated sample at
//! `t - delay`. Its output depends on history only, so it never waits for
//! its signal input during a pass.

use std::collections::VecDeque;

use super::{expect_ports, Block, PortValues, Readiness};
use crate::error::{Result, SimError};
use crate::signal::{Signal, Value};
use crate::DEFAULT_DELAY_LIFESPAN;

/// Delay block with inputs `[u, delay, initial]` and one output.
#[derive(Debug, Clone)]
pub struct Delay {
    /// Samples older than `now - lifespan` are dropped
    lifespan: f64,
    samples: VecDeque<(f64, Value)>,
}

impl Default for Delay {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY_LIFESPAN)
    }
}

impl Delay {
    pub fn new(lifespan: f64) -> Self {
        Self {
            lifespan,
            samples: VecDeque::new(),
        }
    }

    /// Get the lifespan in seconds.
    pub fn lifespan(&self) -> f64 {
        self.lifespan
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Interpolate the history at time `t`, or `None` before the first sample.
    fn sample_at(&self, t: f64) -> Result<Option<Value>> {
        let (first, last) = match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Ok(None),
        };
        if t < first.0 {
            return Ok(None);
        }
        if t >= last.0 {
            return Ok(Some(last.1.clone()));
        }

        // First sample at or after t; exists because t < last.0
        let k = self.samples.partition_point(|(ts, _)| *ts < t);
        let (t1, x1) = &self.samples[k];
        if k == 0 || *t1 == t {
            return Ok(Some(x1.clone()));
        }
        let (t0, x0) = &self.samples[k - 1];
        Value::lerp(x0, x1, (t - t0) / (t1 - t0)).map(Some)
    }
}

impl Block for Delay {
    fn kind(&self) -> &'static str {
        "Delay"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "input", 3, inputs)?;
        expect_ports(name, "output", 1, outputs)?;
        if !(self.lifespan > 0.0) {
            return Err(SimError::invalid_param(format!(
                "{}: delay lifespan must be positive, got {}",
                name, self.lifespan
            )));
        }
        Ok(())
    }

    fn readiness(&self) -> Readiness {
        // delay and initial only; the signal itself is read at commit
        Readiness::Inputs(&[1, 2])
    }

    fn activate(&mut self, t: f64, inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        let delay = inputs.scalar(1)?;
        match self.sample_at(t - delay)? {
            Some(v) => Ok(vec![v]),
            None => Ok(vec![inputs.get(2)?.clone()]),
        }
    }

    fn commit(&mut self, t: f64, inputs: &PortValues<'_>, _outputs: &PortValues<'_>) -> Result<()> {
        if let Some(&(previous, _)) = self.samples.back() {
            if t <= previous {
                return Err(SimError::NonMonotonicTime { t, previous });
            }
        }

        let horizon = t - self.lifespan;
        while self.samples.front().is_some_and(|(ts, _)| *ts < horizon) {
            self.samples.pop_front();
        }

        self.samples.push_back((t, inputs.get(0)?.clone()));
        Ok(())
    }
}
