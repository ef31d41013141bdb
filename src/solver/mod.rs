//! Dependency resolution and time stepping.
//!
//! ## Evaluation
//!
//! A [`Resolver`] sweeps the model tree until no block can make progress.
//! Stateful blocks break cycles: an integrator's output is seeded from the
//! state vector before the first sweep, and memories and delays answer from
//! held history without waiting for their signal input.
//!
//! ## Integration
//!
//! The [`StateLayout`] maps every integrator onto a slice of one flat
//! vector. A [`Stepper`] advances that vector through a derivative callback
//! which seeds a fresh value map at the trial state, resolves it and reads
//! back the derivative signals:
//!
//! ```text
//! x(t) --seed--> value map --resolve--> dx/dt --stepper--> x(t + h)
//! ```
//!
//! Held block state changes only when the [`Simulator`] commits a completed
//! timestamp, so all stages of one step see the same snapshot.

mod history;
mod resolver;
mod simulator;
mod states;
mod stepper;

pub use history::History;
pub use resolver::Resolver;
pub use simulator::{InputProvider, NoInputs, Parameters, Simulator, SimulatorConfig};
pub use states::{StateLayout, StateVariable};
pub use stepper::{Derivatives, Euler, Passive, Rk4, Stepper, StepperKind};

/// Recorded steps between progress log lines.
pub const PROGRESS_INTERVAL: usize = 100;
