//! Fixed-point dependency resolution.

use crate::error::{Result, SimError};
use crate::model::{BlockId, Model};
use crate::signal::ValueMap;

/// Evaluates a model until no block can make further progress.
///
/// Every pass can only add values to the map and move blocks from
/// unprocessed to processed, so the loop stops after at most one pass per
/// block plus one. It stops early once every block is processed.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    reuse_order: bool,
    /// Firing order of the last successful resolve
    order: Vec<BlockId>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try blocks in the order they fired last time before sweeping.
    pub fn with_reuse_order(mut self, reuse_order: bool) -> Self {
        self.reuse_order = reuse_order;
        self
    }

    /// Drop the remembered firing order.
    pub fn forget_order(&mut self) {
        self.order.clear();
    }

    /// Resolve `model` at time `t`, filling `values`.
    ///
    /// Returns the number of passes made. Fails with
    /// [`SimError::Unresolved`] if any block is left unprocessed.
    pub fn resolve(&mut self, model: &mut Model, t: f64, values: &mut ValueMap) -> Result<usize> {
        let mut passes = 1;
        model.clear_fired();

        if self.reuse_order && !self.order.is_empty() {
            model.mark_unprocessed();
            for &id in &self.order {
                model.try_evaluate_block(id, t, values, false)?;
            }
        } else {
            model.try_evaluate(t, values, true)?;
        }

        while !model.is_processed() {
            passes += 1;
            if model.try_evaluate(t, values, false)? == 0 {
                break;
            }
        }
        model.refresh_composites();

        if !model.is_processed() {
            let report = model.unprocessed_report(values);
            for block in &report.blocks {
                let missing: Vec<&str> = block.missing_inputs().collect();
                log::warn!("{} stuck at t = {}, missing inputs {:?}", block.name, t, missing);
            }
            self.order.clear();
            return Err(SimError::Unresolved { t, report });
        }

        log::trace!("resolved {} at t = {} in {} pass(es)", model.name(), t, passes);
        if self.reuse_order {
            self.order = model.take_fired();
        }
        Ok(passes)
    }
}
