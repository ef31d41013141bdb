//! Block diagrams: block arena, composite tree and construction.
//!
//! A [`Model`] owns every block in a flat arena and records the composite
//! hierarchy as a tree of indices. Models are created with a
//! [`ModelBuilder`], which keeps the stack of open composites explicitly:
//!
//! ```
//! use signalflow::blocks::{Gain, Integrator};
//! use signalflow::model::Model;
//!
//! let model = Model::build("decay", |b| {
//!     b.add("x", Integrator::new(1.0), &["dx".into()], &["x".into()])?;
//!     b.add("k", Gain::new(-1.0), &["x".into()], &["dx".into()])?;
//!     Ok(())
//! })
//! .unwrap();
//! assert_eq!(model.num_blocks(), 2);
//! ```

mod builder;
mod graph;

pub use builder::ModelBuilder;
pub use graph::{BlockId, BlockSlot, Child, Composite, CompositeId, Model, Node, StateSlot};
