//! Signal identifiers and port references.

use std::fmt;

use crate::{ANONYMOUS_MARKER, SCOPE_SEPARATOR};

/// A globally unique identifier for one slot in the per-step value map.
///
/// Two signals are equal iff their qualified names match. Anonymous signals
/// are generated for wires the user leaves unnamed and carry the scope they
/// were created in plus a serial that is unique for the whole model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    /// A user-named, fully qualified signal
    Named(String),
    /// An auto-generated wire
    Anonymous { scope: String, serial: u64 },
}

impl Signal {
    /// Create a named signal from an already qualified name.
    pub fn named(name: impl Into<String>) -> Self {
        Signal::Named(name.into())
    }

    /// Check if this signal was generated for an unnamed wire.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Signal::Anonymous { .. })
    }

    /// The last segment of the qualified name, used as a bus member label.
    pub fn short_name(&self) -> String {
        match self {
            Signal::Named(name) => name
                .rsplit(SCOPE_SEPARATOR)
                .next()
                .unwrap_or(name)
                .to_string(),
            Signal::Anonymous { serial, .. } => format!("{}{}", ANONYMOUS_MARKER, serial),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Named(name) => write!(f, "{}", name),
            Signal::Anonymous { scope, serial } if scope.is_empty() => {
                write!(f, "{}{}", ANONYMOUS_MARKER, serial)
            }
            Signal::Anonymous { scope, serial } => {
                write!(f, "{}{}{}{}", ANONYMOUS_MARKER, scope, SCOPE_SEPARATOR, serial)
            }
        }
    }
}

/// How a block port names its signal at construction time.
///
/// Ports are resolved once, against the scope that is current when the block
/// is added, and become plain [`Signal`]s afterwards. To read the most recent
/// anonymous output use
/// [`ModelBuilder::connect_to_previous_output`](crate::model::ModelBuilder::connect_to_previous_output).
#[derive(Debug, Clone, PartialEq)]
pub enum Port {
    /// A name qualified with the enclosing composite's prefix
    Name(String),
    /// A name used verbatim, independent of the enclosing scope
    Global(String),
    /// An already resolved signal
    Signal(Signal),
    /// A new anonymous signal (outputs only)
    Fresh,
    /// A scope-local anonymous wire addressed by label
    Wire(u32),
}

impl Port {
    pub fn name(name: impl Into<String>) -> Self {
        Port::Name(name.into())
    }

    pub fn global(name: impl Into<String>) -> Self {
        Port::Global(name.into())
    }

    pub fn wire(label: u32) -> Self {
        Port::Wire(label)
    }
}

impl From<&str> for Port {
    fn from(name: &str) -> Self {
        Port::Name(name.to_string())
    }
}

impl From<String> for Port {
    fn from(name: String) -> Self {
        Port::Name(name)
    }
}

impl From<Signal> for Port {
    fn from(signal: Signal) -> Self {
        Port::Signal(signal)
    }
}

impl From<&Signal> for Port {
    fn from(signal: &Signal) -> Self {
        Port::Signal(signal.clone())
    }
}
