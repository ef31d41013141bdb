//! Bridge between block states and the flat integration vector.

use nalgebra::DVector;

use crate::error::{Result, SimError};
use crate::model::{BlockId, Model};
use crate::signal::{Signal, Value, ValueMap};

/// One continuous state: the signal it is seeded into, the signal its
/// derivative is read from, and its value shape at collection time.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVariable {
    pub block: BlockId,
    pub state: Signal,
    pub deriv: Signal,
    pub value: Value,
}

impl StateVariable {
    /// Number of entries this state occupies in the flat vector.
    pub fn width(&self) -> usize {
        // Bus states are rejected when the integrator is bound
        self.value.len().unwrap_or(0)
    }
}

/// Ordered set of every state in a model, with offsets into the flat vector.
#[derive(Debug, Clone, Default)]
pub struct StateLayout {
    variables: Vec<StateVariable>,
    offsets: Vec<usize>,
    size: usize,
}

impl StateLayout {
    /// Collect the states held by `model`, in block declaration order.
    pub fn collect(model: &Model) -> Self {
        let variables = model
            .collect_states()
            .into_iter()
            .map(|slot| StateVariable {
                block: slot.block,
                state: slot.state,
                deriv: slot.deriv,
                value: slot.value,
            })
            .collect();
        Self::from_variables(variables)
    }

    pub fn from_variables(variables: Vec<StateVariable>) -> Self {
        let mut offsets = Vec::with_capacity(variables.len());
        let mut size = 0;
        for v in &variables {
            offsets.push(size);
            size += v.width();
        }
        log::debug!("state layout: {} variable(s), {} entries", variables.len(), size);
        Self {
            variables,
            offsets,
            size,
        }
    }

    pub fn variables(&self) -> &[StateVariable] {
        &self.variables
    }

    /// Total number of entries in the flat vector.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Flatten the collected state values.
    pub fn pack_vector(&self) -> Result<DVector<f64>> {
        let values: Vec<&Value> = self.variables.iter().map(|v| &v.value).collect();
        self.pack(&values)
    }

    /// Flatten values laid out like the collected states.
    pub fn pack(&self, values: &[&Value]) -> Result<DVector<f64>> {
        if values.len() != self.variables.len() {
            return Err(SimError::shape_mismatch(self.variables.len(), values.len()));
        }
        let mut flat = Vec::with_capacity(self.size);
        for (var, value) in self.variables.iter().zip(values) {
            let width = value.len()?;
            if width != var.width() {
                return Err(SimError::shape_mismatch(var.width(), width));
            }
            value.flatten_into(&mut flat)?;
        }
        Ok(DVector::from_vec(flat))
    }

    /// Split a flat vector back into one value per state signal.
    pub fn unpack_vector(&self, x: &DVector<f64>) -> Result<Vec<(Signal, Value)>> {
        if x.len() != self.size {
            return Err(SimError::shape_mismatch(self.size, x.len()));
        }
        self.variables
            .iter()
            .zip(&self.offsets)
            .map(|(var, &offset)| {
                let slice = &x.as_slice()[offset..offset + var.width()];
                Ok((var.state.clone(), var.value.reshape_like(slice)?))
            })
            .collect()
    }

    /// Replace the slice of `x` owned by `block`'s state.
    pub fn overwrite(&self, x: &mut DVector<f64>, block: BlockId, value: &Value) -> Result<()> {
        if x.len() != self.size {
            return Err(SimError::shape_mismatch(self.size, x.len()));
        }
        let (var, &offset) = self
            .variables
            .iter()
            .zip(&self.offsets)
            .find(|(v, _)| v.block == block)
            .ok_or_else(|| SimError::missing(format!("state of block #{}", block.0)))?;
        let mut flat = Vec::with_capacity(var.width());
        value.flatten_into(&mut flat)?;
        if flat.len() != var.width() {
            return Err(SimError::shape_mismatch(var.width(), flat.len()));
        }
        x.as_mut_slice()[offset..offset + flat.len()].copy_from_slice(&flat);
        Ok(())
    }

    /// Write the state values of `x` into a value map.
    pub fn seed(&self, x: &DVector<f64>, values: &mut ValueMap) -> Result<()> {
        for (signal, value) in self.unpack_vector(x)? {
            values.insert(signal, value)?;
        }
        Ok(())
    }

    /// Read every derivative signal out of a resolved map.
    pub fn derivatives(&self, values: &ValueMap) -> Result<DVector<f64>> {
        let derivs = self
            .variables
            .iter()
            .map(|v| values.require(&v.deriv))
            .collect::<Result<Vec<_>>>()?;
        self.pack(&derivs)
    }
}
