//! Fixed-step explicit integrators.
//!
//! A stepper advances the flat state vector by one step `h` given a
//! derivative callback `f(t, x) -> dx/dt`. The callback runs a full resolver
//! pass at the trial point and never commits held block state, so every
//! stage sees the same snapshot.

use nalgebra::DVector;

use crate::error::Result;

/// Derivative callback handed to a stepper.
pub type Derivatives<'a> = dyn FnMut(f64, &DVector<f64>) -> Result<DVector<f64>> + 'a;

/// One explicit integration rule.
pub trait Stepper {
    fn name(&self) -> &'static str;

    /// Advance `x0` at `t0` by `h`.
    fn step(
        &mut self,
        f: &mut Derivatives<'_>,
        t0: f64,
        x0: &DVector<f64>,
        h: f64,
    ) -> Result<DVector<f64>>;
}

/// Classic fourth-order Runge-Kutta.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rk4;

impl Stepper for Rk4 {
    fn name(&self) -> &'static str {
        "rk4"
    }

    fn step(
        &mut self,
        f: &mut Derivatives<'_>,
        t0: f64,
        x0: &DVector<f64>,
        h: f64,
    ) -> Result<DVector<f64>> {
        let half = 0.5 * h;
        let k1 = f(t0, x0)?;
        let k2 = f(t0 + half, &(x0 + &k1 * half))?;
        let k3 = f(t0 + half, &(x0 + &k2 * half))?;
        let k4 = f(t0 + h, &(x0 + &k3 * h))?;
        Ok(x0 + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0))
    }
}

/// Forward Euler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euler;

impl Stepper for Euler {
    fn name(&self) -> &'static str {
        "euler"
    }

    fn step(
        &mut self,
        f: &mut Derivatives<'_>,
        t0: f64,
        x0: &DVector<f64>,
        h: f64,
    ) -> Result<DVector<f64>> {
        Ok(x0 + f(t0, x0)? * h)
    }
}

/// Algebraic-only stepping: evaluates once, leaves the state unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passive;

impl Stepper for Passive {
    fn name(&self) -> &'static str {
        "passive"
    }

    fn step(
        &mut self,
        f: &mut Derivatives<'_>,
        t0: f64,
        x0: &DVector<f64>,
        _h: f64,
    ) -> Result<DVector<f64>> {
        f(t0, x0)?;
        Ok(x0.clone())
    }
}

/// Selects a [`Stepper`] from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepperKind {
    #[default]
    Rk4,
    Euler,
    Passive,
}

impl StepperKind {
    pub fn build(self) -> Box<dyn Stepper> {
        match self {
            StepperKind::Rk4 => Box::new(Rk4),
            StepperKind::Euler => Box::new(Euler),
            StepperKind::Passive => Box::new(Passive),
        }
    }
}

impl std::str::FromStr for StepperKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rk4" => Ok(StepperKind::Rk4),
            "euler" => Ok(StepperKind::Euler),
            "passive" => Ok(StepperKind::Passive),
            other => Err(format!("unknown stepper '{}'", other)),
        }
    }
}
