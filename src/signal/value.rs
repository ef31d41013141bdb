//! Numeric values carried by signals.

use nalgebra::DVector;

use crate::error::{Result, SimError};

/// The value held by one signal for one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A single number
    Scalar(f64),
    /// A fixed-length array
    Array(DVector<f64>),
    /// Several named values packed into one slot
    Bus(BusValue),
}

impl Value {
    /// Name of the value kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Array(_) => "array",
            Value::Bus(_) => "bus",
        }
    }

    pub fn array(values: &[f64]) -> Self {
        Value::Array(DVector::from_column_slice(values))
    }

    pub fn as_scalar(&self) -> Result<f64> {
        match self {
            Value::Scalar(v) => Ok(*v),
            other => Err(SimError::TypeMismatch {
                expected: "scalar",
                actual: other.kind(),
            }),
        }
    }

    pub fn as_array(&self) -> Result<&DVector<f64>> {
        match self {
            Value::Array(v) => Ok(v),
            other => Err(SimError::TypeMismatch {
                expected: "array",
                actual: other.kind(),
            }),
        }
    }

    pub fn as_bus(&self) -> Result<&BusValue> {
        match self {
            Value::Bus(b) => Ok(b),
            other => Err(SimError::NotABus {
                actual: other.kind(),
            }),
        }
    }

    /// True for scalars and arrays, the values a history records.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Value::Bus(_))
    }

    /// Number of numeric elements (1 for a scalar).
    pub fn len(&self) -> Result<usize> {
        match self {
            Value::Scalar(_) => Ok(1),
            Value::Array(v) => Ok(v.len()),
            Value::Bus(_) => Err(SimError::TypeMismatch {
                expected: "scalar or array",
                actual: "bus",
            }),
        }
    }

    /// Append the numeric elements to `out`.
    pub fn flatten_into(&self, out: &mut Vec<f64>) -> Result<()> {
        match self {
            Value::Scalar(v) => out.push(*v),
            Value::Array(v) => out.extend(v.iter().copied()),
            Value::Bus(_) => {
                return Err(SimError::TypeMismatch {
                    expected: "scalar or array",
                    actual: "bus",
                })
            }
        }
        Ok(())
    }

    /// Build a value of the same shape as `self` from flat elements.
    pub fn reshape_like(&self, elements: &[f64]) -> Result<Value> {
        let expected = self.len()?;
        if elements.len() != expected {
            return Err(SimError::shape_mismatch(expected, elements.len()));
        }
        Ok(match self {
            Value::Scalar(_) => Value::Scalar(elements[0]),
            _ => Value::Array(DVector::from_column_slice(elements)),
        })
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Result<Value> {
        match self {
            Value::Scalar(v) => Ok(Value::Scalar(f(*v))),
            Value::Array(v) => Ok(Value::Array(v.map(f))),
            Value::Bus(_) => Err(SimError::TypeMismatch {
                expected: "scalar or array",
                actual: "bus",
            }),
        }
    }

    /// Combine two values elementwise, broadcasting scalars over arrays.
    pub fn zip_with(&self, other: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(f(*a, *b))),
            (Value::Scalar(a), Value::Array(b)) => Ok(Value::Array(b.map(|y| f(*a, y)))),
            (Value::Array(a), Value::Scalar(b)) => Ok(Value::Array(a.map(|x| f(x, *b)))),
            (Value::Array(a), Value::Array(b)) => {
                if a.len() != b.len() {
                    return Err(SimError::shape_mismatch(a.len(), b.len()));
                }
                Ok(Value::Array(a.zip_map(b, f)))
            }
            (Value::Bus(_), _) | (_, Value::Bus(_)) => Err(SimError::TypeMismatch {
                expected: "scalar or array",
                actual: "bus",
            }),
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        self.zip_with(other, |a, b| a * b)
    }

    pub fn div(&self, other: &Value) -> Result<Value> {
        self.zip_with(other, |a, b| a / b)
    }

    pub fn scale(&self, k: f64) -> Result<Value> {
        self.map(|x| k * x)
    }

    /// Linear interpolation `a + (b - a) * frac`.
    pub fn lerp(a: &Value, b: &Value, frac: f64) -> Result<Value> {
        a.zip_with(b, |x, y| x + (y - x) * frac)
    }

    /// True if any numeric element is exactly zero.
    pub fn contains_zero(&self) -> bool {
        match self {
            Value::Scalar(v) => *v == 0.0,
            Value::Array(v) => v.iter().any(|x| *x == 0.0),
            Value::Bus(_) => false,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<DVector<f64>> for Value {
    fn from(v: DVector<f64>) -> Self {
        Value::Array(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Array(DVector::from_vec(v))
    }
}

impl From<BusValue> for Value {
    fn from(b: BusValue) -> Self {
        Value::Bus(b)
    }
}

/// Named members packed into one signal slot. Members may be buses too.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BusValue {
    names: Vec<String>,
    values: Vec<Value>,
}

impl BusValue {
    pub fn new(names: Vec<String>, values: Vec<Value>) -> Result<Self> {
        if names.len() != values.len() {
            return Err(SimError::shape_mismatch(names.len(), values.len()));
        }
        Ok(Self { names, values })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of a member in the name list.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Look up a member by name.
    pub fn member(&self, name: &str) -> Result<&Value> {
        self.index_of(name)
            .map(|i| &self.values[i])
            .ok_or_else(|| SimError::UnknownBusMember {
                member: name.to_string(),
                available: self.names.clone(),
            })
    }

    pub fn at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}
