//! # Signalflow
//!
//! A block-diagram simulation engine for continuous and discrete dynamics.
//!
//! This library provides:
//! - Hierarchical block diagrams with named and anonymous signals
//! - Fixed-point dependency resolution that accepts any declaration order
//! - Stateful cycle breakers (integrators, delays, memories)
//! - Fixed-step explicit integration (RK4, Euler) of the continuous states
//! - Recorded trajectories of every signal with CSV export
//!
//! ## Architecture
//!
//! - [`signal`] - Signal identifiers, hierarchical naming, per-step values
//! - [`blocks`] - The [`Block`](blocks::Block) trait and the block library
//! - [`model`] - Block arena, composite tree and the model builder
//! - [`solver`] - Resolver, state bridge, steppers and the run harness
//!
//! ## Usage
//!
//! ```
//! use signalflow::blocks::{Gain, Integrator};
//! use signalflow::model::Model;
//! use signalflow::solver::{NoInputs, Parameters, Simulator, SimulatorConfig};
//!
//! // dx/dt = -x, x(0) = 1
//! let model = Model::build("decay", |b| {
//!     b.add("x", Integrator::new(1.0), &["dx".into()], &["x".into()])?;
//!     b.add("k", Gain::new(-1.0), &["x".into()], &["dx".into()])?;
//!     Ok(())
//! })?;
//!
//! let config = SimulatorConfig::new().with_span(0.0, 1.0).with_step(0.01);
//! let mut sim = Simulator::with_config(model, Parameters::new(), config)?;
//! let history = sim.run(&mut NoInputs)?;
//!
//! let x = history.scalar_series("x").unwrap();
//! assert!((x.last().unwrap() - (-1.0f64).exp()).abs() < 1e-9);
//! # Ok::<(), signalflow::SimError>(())
//! ```
//!
//! ## Evaluation Method
//!
//! For each timestamp:
//!
//! 1. Seed a fresh value map with the states, parameters and external inputs
//! 2. Sweep the model until no block makes progress
//! 3. Record the numeric signals and commit held block state
//! 4. Advance the state vector to the next timestamp with the stepper

pub mod blocks;
pub mod error;
pub mod model;
pub mod signal;
pub mod solver;

// Re-export main types for convenience
pub use error::{Result, SimError};
pub use model::{Model, ModelBuilder};
pub use signal::{Port, Signal, Value};
pub use solver::{History, Simulator, SimulatorConfig};

/// First character of every anonymous signal's display name
pub const ANONYMOUS_MARKER: char = '~';

/// Separator between scope segments in qualified names
pub const SCOPE_SEPARATOR: char = '.';

/// Reserved history key for the time column
pub const TIME_KEY: &str = "t";

/// Default history span kept by a delay block, in seconds
pub const DEFAULT_DELAY_LIFESPAN: f64 = 10.0;
