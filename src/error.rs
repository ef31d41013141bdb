//! Error types for the signalflow engine.
//!
//! This module provides a unified error type [`SimError`] that covers
//! all error conditions that can occur during model construction,
//! dependency resolution, numeric evaluation and running a simulation.

use std::fmt;

use thiserror::Error;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Unified error type for all signalflow operations.
#[derive(Error, Debug)]
pub enum SimError {
    // ============ Construction Errors ============
    /// Two blocks claim the same output signal
    #[error("Output signal '{signal}' of block '{block}' is already written by '{existing}'")]
    DuplicateOutput {
        signal: String,
        block: String,
        existing: String,
    },

    /// Wrong number of input or output ports for a block
    #[error("Block '{block}' expects {expected} {direction} port(s), got {actual}")]
    PortCount {
        block: String,
        direction: &'static str,
        expected: String,
        actual: usize,
    },

    /// Operator list does not line up with the input ports
    #[error("Block '{block}': {operators} operator(s) for {inputs} input signal(s)")]
    OperatorMismatch {
        block: String,
        operators: usize,
        inputs: usize,
    },

    /// Operator character not understood by the block
    #[error("Block '{block}': invalid operator '{operator}'")]
    InvalidOperator { block: String, operator: char },

    /// Bus member lookup failed
    #[error("Bus has no member '{member}' (members: {available:?})")]
    UnknownBusMember {
        member: String,
        available: Vec<String>,
    },

    /// A port asked for the previous anonymous output but none exists yet
    #[error("No previous anonymous output in scope '{scope}'")]
    NoPreviousOutput { scope: String },

    /// Composite port index out of range or unbalanced scopes
    #[error("Scope error: {message}")]
    ScopeError { message: String },

    /// A user-given signal name collides with generated or reserved names
    #[error("Signal name '{name}' is reserved: {reason}")]
    ReservedName { name: String, reason: &'static str },

    /// A parameter has the same name as a block output
    #[error("Parameter '{name}' shadows an output signal of block '{block}'")]
    ParameterShadowsOutput { name: String, block: String },

    // ============ Resolution Errors ============
    /// The fixed point was reached with blocks still unprocessed
    #[error("Unresolved blocks at t = {t}:\n{report}")]
    Unresolved { t: f64, report: DeadlockReport },

    /// An output signal was written twice within one pass
    #[error("Signal '{signal}' written twice in one pass")]
    DoubleWrite { signal: String },

    /// A signal needed outside of block evaluation is absent
    #[error("Signal '{signal}' is missing from the value map")]
    MissingSignal { signal: String },

    // ============ Numeric Errors ============
    /// Array lengths do not match
    #[error("Shape mismatch: expected {expected} element(s), got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Division by an exact zero
    #[error("Division by zero in block '{block}'")]
    DivisionByZero { block: String },

    /// A value had a different kind than required
    #[error("Expected a {expected} value, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A bus selector received something other than a bus
    #[error("Expected a bus value, got {actual}")]
    NotABus { actual: &'static str },

    /// Recorded times must strictly increase
    #[error("Time {t} is not after the previous time {previous}")]
    NonMonotonicTime { t: f64, previous: f64 },

    // ============ Run Errors ============
    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },

    /// The input provider failed
    #[error("Input provider failed at t = {t}: {message}")]
    Input { t: f64, message: String },

    // ============ I/O Errors ============
    /// Error writing recorded history
    #[error("Failed to write history to '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SimError {
    /// Create a port count error
    pub fn port_count(
        block: impl Into<String>,
        direction: &'static str,
        expected: impl Into<String>,
        actual: usize,
    ) -> Self {
        Self::PortCount {
            block: block.into(),
            direction,
            expected: expected.into(),
            actual,
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch { expected, actual }
    }

    /// Create a scope error
    pub fn scope(message: impl Into<String>) -> Self {
        Self::ScopeError {
            message: message.into(),
        }
    }

    /// Create an invalid simulation parameter error
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::InvalidSimulationParam {
            message: message.into(),
        }
    }

    /// Create a missing signal error
    pub fn missing(signal: impl fmt::Display) -> Self {
        Self::MissingSignal {
            signal: signal.to_string(),
        }
    }
}

/// A port of a stuck block and whether its signal was present.
#[derive(Debug, Clone, PartialEq)]
pub struct PortStatus {
    pub signal: String,
    pub present: bool,
}

/// A block that never became processed during a resolver run.
#[derive(Debug, Clone, PartialEq)]
pub struct StuckBlock {
    pub name: String,
    pub inputs: Vec<PortStatus>,
    pub outputs: Vec<PortStatus>,
}

impl StuckBlock {
    /// Inputs that were absent from the value map.
    pub fn missing_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .filter(|p| !p.present)
            .map(|p| p.signal.as_str())
    }
}

/// Diagnosis of a resolver run that could not reach every block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeadlockReport {
    pub blocks: Vec<StuckBlock>,
}

impl DeadlockReport {
    /// Find a stuck block by its qualified name.
    pub fn block(&self, name: &str) -> Option<&StuckBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl fmt::Display for DeadlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            writeln!(f, "- {}", block.name)?;
            for port in &block.inputs {
                let mark = if port.present { ' ' } else { '*' };
                writeln!(f, "  - i: {} {}", mark, port.signal)?;
            }
            for port in &block.outputs {
                let mark = if port.present { ' ' } else { '*' };
                writeln!(f, "  - o: {} {}", mark, port.signal)?;
            }
        }
        Ok(())
    }
}
