//! User-supplied activation rules.

use super::{expect_ports, Block, PortValues};
use crate::error::{Result, SimError};
use crate::signal::{Signal, Value};

type SisoFn = Box<dyn FnMut(f64, &Value) -> Result<Value>>;
type MimoFn = Box<dyn FnMut(f64, &[&Value]) -> Result<Vec<Value>>>;

/// One input, one output: `y = f(t, u)`.
pub struct Function {
    f: SisoFn,
}

impl Function {
    pub fn new(f: impl FnMut(f64, &Value) -> Result<Value> + 'static) -> Self {
        Self { f: Box::new(f) }
    }

    /// Wrap a scalar function of time and input.
    pub fn scalar(mut f: impl FnMut(f64, f64) -> f64 + 'static) -> Self {
        Self::new(move |t, u| Ok(Value::Scalar(f(t, u.as_scalar()?))))
    }

    /// Apply `f` to every element of a scalar or array input.
    pub fn elementwise(f: impl Fn(f64) -> f64 + 'static) -> Self {
        Self::new(move |_t, u| u.map(&f))
    }
}

impl Block for Function {
    fn kind(&self) -> &'static str {
        "Function"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        expect_ports(name, "input", 1, inputs)?;
        expect_ports(name, "output", 1, outputs)
    }

    fn activate(&mut self, t: f64, inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        Ok(vec![(self.f)(t, inputs.get(0)?)?])
    }
}

/// Any number of inputs and outputs: `[y..] = f(t, [u..])`.
pub struct MimoFunction {
    num_inputs: Option<usize>,
    num_outputs: usize,
    f: MimoFn,
    name: String,
}

impl MimoFunction {
    /// `num_inputs = None` accepts any input count.
    pub fn new(
        num_inputs: Option<usize>,
        num_outputs: usize,
        f: impl FnMut(f64, &[&Value]) -> Result<Vec<Value>> + 'static,
    ) -> Self {
        Self {
            num_inputs,
            num_outputs,
            f: Box::new(f),
            name: String::new(),
        }
    }
}

impl Block for MimoFunction {
    fn kind(&self) -> &'static str {
        "MimoFunction"
    }

    fn bind(&mut self, name: &str, inputs: &[Signal], outputs: &[Signal]) -> Result<()> {
        if let Some(n) = self.num_inputs {
            expect_ports(name, "input", n, inputs)?;
        }
        expect_ports(name, "output", self.num_outputs, outputs)?;
        self.name = name.to_string();
        Ok(())
    }

    fn activate(&mut self, t: f64, inputs: &PortValues<'_>) -> Result<Vec<Value>> {
        let args = inputs.all()?;
        let out = (self.f)(t, &args)?;
        if out.len() != self.num_outputs {
            return Err(SimError::port_count(
                self.name.clone(),
                "output",
                self.num_outputs.to_string(),
                out.len(),
            ));
        }
        Ok(out)
    }
}
