//! Stateless arithmetic blocks: Const, Source, Gain, AddSub, MulDiv, Pipe.

use super::{expect_at_least, expect_ports, Block, PortValues, Readiness};
use crate::error::{Result, SimError};
use crate::signal::{Signal, Value};

/// Emits a fixed value.
#[derive(Debug, Clone)]
pub struct Const {
    value: Value,
}

impl Const {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Block for Const {
    fn kind(&self) -> &'static str {
        "Const"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "input", 0, inputs)?;
        expect_ports(name, "output", 1, outputs)
    }

    fn readiness(&self) -> Readiness {
        Readiness::Always
    }

    fn activate(&mut self, _t: f64, _inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        Ok(vec![self.value.clone()])
    }
}

/// Emits a value computed from the simulated time only.
pub struct Source {
    source: Box<dyn FnMut(f64) -> Value>,
}

impl Source {
    pub fn new(source: impl FnMut(f64) -> Value + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }
}

impl Block for Source {
    fn kind(&self) -> &'static str {
        "Source"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "input", 0, inputs)?;
        expect_ports(name, "output", 1, outputs)
    }

    fn readiness(&self) -> Readiness {
        Readiness::Always
    }

    fn activate(&mut self, t: f64, _inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        Ok(vec![(self.source)(t)])
    }
}

/// Linear gain: `y = k * u`.
#[derive(Debug, Clone)]
pub struct Gain {
    k: f64,
}

impl Gain {
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    pub fn gain(&self) -> f64 {
        self.k
    }
}

impl Block for Gain {
    fn kind(&self) -> &'static str {
        "Gain"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "input", 1, inputs)?;
        expect_ports(name, "output", 1, outputs)
    }

    fn activate(&mut self, _t: f64, inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        Ok(vec![inputs.get(0)?.scale(self.k)?])
    }
}

/// Identity pass-through, used to rename or expose a signal.
#[derive(Debug, Clone, Default)]
pub struct Pipe;

impl Pipe {
    pub fn new() -> Self {
        Self
    }
}

impl Block for Pipe {
    fn kind(&self) -> &'static str {
        "Pipe"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "input", 1, inputs)?;
        expect_ports(name, "output", 1, outputs)
    }

    fn activate(&mut self, _t: f64, inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        Ok(vec![inputs.get(0)?.clone()])
    }
}

/// Validate an operator sequence against the inputs.
fn check_operators(name: &str, operators: &str, allowed: [char; 2], inputs: &[Signal]) -> Result<()> {
    expect_at_least(name, "input", 1, inputs)?;
    let count = operators.chars().count();
    if count != inputs.len() {
        return Err(SimError::OperatorMismatch {
            block: name.to_string(),
            operators: count,
            inputs: inputs.len(),
        });
    }
    if let Some(bad) = operators.chars().find(|c| !allowed.contains(c)) {
        return Err(SimError::InvalidOperator {
            block: name.to_string(),
            operator: bad,
        });
    }
    Ok(())
}

/// Weighted sum: `y = initial ± u0 ± u1 ...`, one sign per input.
#[derive(Debug, Clone)]
pub struct AddSub {
    /// `None` means "all plus", sized when the block is bound
    operators: Option<String>,
    initial: Value,
}

impl AddSub {
    /// Create a sum with an explicit sign sequence such as `"+-"`.
    pub fn new(operators: impl Into<String>) -> Self {
        Self {
            operators: Some(operators.into()),
            initial: Value::Scalar(0.0),
        }
    }

    /// Sum all inputs.
    pub fn add() -> Self {
        Self {
            operators: None,
            initial: Value::Scalar(0.0),
        }
    }

    /// `y = u0 - u1`.
    pub fn subtract() -> Self {
        Self::new("+-")
    }

    /// Start the accumulation from `initial` instead of zero.
    pub fn with_initial(mut self, initial: impl Into<Value>) -> Self {
        self.initial = initial.into();
        self
    }
}

impl Block for AddSub {
    fn kind(&self) -> &'static str {
        "AddSub"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "output", 1, outputs)?;
        let operators = self
            .operators
            .get_or_insert_with(|| "+".repeat(inputs.len()));
        check_operators(name, operators, ['+', '-'], inputs)
    }

    fn activate(&mut self, _t: f64, inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        let mut ret = self.initial.clone();
        let operators = self.operators.as_deref().unwrap_or_default();
        for (i, op) in operators.chars().enumerate() {
            let v = inputs.get(i)?;
            ret = if op == '+' { ret.add(v)? } else { ret.sub(v)? };
        }
        Ok(vec![ret])
    }
}

/// Weighted product: `y = initial */ u0 */ u1 ...`, one operator per input.
#[derive(Debug, Clone)]
pub struct MulDiv {
    operators: Option<String>,
    initial: Value,
    name: String,
}

impl MulDiv {
    /// Create a product with an explicit operator sequence such as `"**/"`.
    pub fn new(operators: impl Into<String>) -> Self {
        Self {
            operators: Some(operators.into()),
            initial: Value::Scalar(1.0),
            name: String::new(),
        }
    }

    /// Multiply all inputs.
    pub fn multiply() -> Self {
        Self {
            operators: None,
            initial: Value::Scalar(1.0),
            name: String::new(),
        }
    }

    /// `y = u0 / u1`.
    pub fn divide() -> Self {
        Self::new("*/")
    }

    pub fn with_initial(mut self, initial: impl Into<Value>) -> Self {
        self.initial = initial.into();
        self
    }
}

impl Block for MulDiv {
    fn kind(&self) -> &'static str {
        "MulDiv"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "output", 1, outputs)?;
        self.name = name.to_string();
        let operators = self
            .operators
            .get_or_insert_with(|| "*".repeat(inputs.len()));
        check_operators(name, operators, ['*', '/'], inputs)
    }

    fn activate(&mut self, _t: f64, inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        let mut ret = self.initial.clone();
        let operators = self.operators.as_deref().unwrap_or_default();
        for (i, op) in operators.chars().enumerate() {
            let v = inputs.get(i)?;
            ret = if op == '*' {
                ret.mul(v)?
            } else {
                if v.contains_zero() {
                    return Err(SimError::DivisionByZero {
                        block: self.name.clone(),
                    });
                }
                ret.div(v)?
            };
        }
        Ok(vec![ret])
    }
}
