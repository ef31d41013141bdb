//! Signal identifiers, hierarchical naming and per-step values.
//!
//! A [`Signal`] names one value slot. Blocks declare their ports with
//! [`Port`] references which the model builder resolves through the
//! [`Namespace`] into qualified signals. During a pass every signal's value
//! lives in a [`ValueMap`] that is rebuilt at the start of each evaluation.

mod namespace;
mod types;
mod value;
mod values;

pub use namespace::{join, Namespace};
pub use types::{Port, Signal};
pub use value::{BusValue, Value};
pub use values::ValueMap;
