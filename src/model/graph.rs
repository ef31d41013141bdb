//! Block arena and composite tree.

use crate::blocks::{Block, PortValues};
use crate::error::{DeadlockReport, PortStatus, Result, SimError, StuckBlock};
use crate::signal::{Namespace, Signal, Value, ValueMap};

/// Index of a block in the model arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) usize);

/// Index of a composite in the model tree. The root is always `CompositeId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeId(pub(crate) usize);

impl CompositeId {
    pub const ROOT: CompositeId = CompositeId(0);
}

/// One owned child of a composite, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    Block(BlockId),
    Composite(CompositeId),
}

/// A block together with its resolved ports.
pub struct BlockSlot {
    pub(crate) name: String,
    pub(crate) inputs: Vec<Signal>,
    pub(crate) outputs: Vec<Signal>,
    pub(crate) parent: CompositeId,
    pub(crate) body: Box<dyn Block>,
}

impl BlockSlot {
    /// Qualified block name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }

    pub fn inputs(&self) -> &[Signal] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Signal] {
        &self.outputs
    }

    pub fn parent(&self) -> CompositeId {
        self.parent
    }

    /// Held continuous state, if this block integrates.
    pub fn state(&self) -> Option<&Value> {
        self.body.state()
    }
}

/// A container of owned blocks and composites with its own port signals.
#[derive(Debug, Clone)]
pub struct Composite {
    pub(crate) name: String,
    pub(crate) parent: Option<CompositeId>,
    pub(crate) inputs: Vec<Signal>,
    pub(crate) outputs: Vec<Signal>,
    pub(crate) children: Vec<Child>,
}

impl Composite {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<CompositeId> {
        self.parent
    }

    pub fn inputs(&self) -> &[Signal] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Signal] {
        &self.outputs
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }
}

/// Element visited by [`Model::traverse`].
#[derive(Clone, Copy)]
pub enum Node<'a> {
    Block(&'a BlockSlot),
    Composite(&'a Composite),
}

impl Node<'_> {
    pub fn name(&self) -> &str {
        match self {
            Node::Block(b) => b.name(),
            Node::Composite(c) => c.name(),
        }
    }
}

/// A continuous state found in the model: which block holds it, the signal
/// it is seeded into, the signal its derivative is read from.
#[derive(Debug, Clone)]
pub struct StateSlot {
    pub block: BlockId,
    pub state: Signal,
    pub deriv: Signal,
    pub value: Value,
}

/// A fully constructed block diagram.
///
/// Blocks live in a flat arena indexed by [`BlockId`]; composites form a tree
/// stored in pre-order, so every composite comes after its parent. The
/// per-pass `processed` flags are kept beside the arena.
pub struct Model {
    pub(crate) name: String,
    pub(crate) blocks: Vec<BlockSlot>,
    pub(crate) composites: Vec<Composite>,
    pub(crate) processed: Vec<bool>,
    pub(crate) composite_processed: Vec<bool>,
    pub(crate) namespace: Namespace,
    /// Blocks in the order they became processed since the last clear
    pub(crate) fired: Vec<BlockId>,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, id: BlockId) -> Option<&BlockSlot> {
        self.blocks.get(id.0)
    }

    pub fn composite(&self, id: CompositeId) -> Option<&Composite> {
        self.composites.get(id.0)
    }

    /// Find a block by its qualified name.
    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.blocks.iter().position(|b| b.name == name).map(BlockId)
    }

    /// Qualified names of every block, in declaration order.
    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|b| b.name.as_str())
    }

    /// Every output signal written by some block.
    pub fn output_signals(&self) -> impl Iterator<Item = &Signal> {
        self.blocks.iter().flat_map(|b| b.outputs.iter())
    }

    /// Name of the block writing `signal`.
    pub fn producer(&self, signal: &Signal) -> Option<&str> {
        self.namespace.producer(signal)
    }

    /// Depth-first walk in declaration order. `visit` receives the nesting
    /// level (root children at 0) and returns `false` to stop early.
    ///
    /// Returns `true` if the whole tree was visited.
    pub fn traverse<F>(&self, mut visit: F) -> bool
    where
        F: FnMut(usize, Node<'_>) -> bool,
    {
        self.traverse_composite(CompositeId::ROOT, 0, &mut visit)
    }

    fn traverse_composite<F>(&self, id: CompositeId, level: usize, visit: &mut F) -> bool
    where
        F: FnMut(usize, Node<'_>) -> bool,
    {
        for child in &self.composites[id.0].children {
            let keep_going = match *child {
                Child::Block(b) => visit(level, Node::Block(&self.blocks[b.0])),
                Child::Composite(c) => {
                    visit(level, Node::Composite(&self.composites[c.0]))
                        && self.traverse_composite(c, level + 1, visit)
                }
            };
            if !keep_going {
                return false;
            }
        }
        true
    }

    // ============ Evaluation ============

    /// One pass over the whole tree in declaration order.
    ///
    /// With `reset` every flag is cleared before its block is tried. Returns
    /// the number of blocks that became processed.
    pub fn try_evaluate(&mut self, t: f64, values: &mut ValueMap, reset: bool) -> Result<usize> {
        let progress = self.try_evaluate_composite(CompositeId::ROOT, t, values, reset)?;
        log::trace!("{}: pass at t = {} processed {} block(s)", self.name, t, progress);
        Ok(progress)
    }

    fn try_evaluate_composite(
        &mut self,
        id: CompositeId,
        t: f64,
        values: &mut ValueMap,
        reset: bool,
    ) -> Result<usize> {
        let mut progress = 0;
        let mut all_done = true;
        for i in 0..self.composites[id.0].children.len() {
            let child = self.composites[id.0].children[i];
            let done = match child {
                Child::Block(b) => {
                    progress += self.try_evaluate_block(b, t, values, reset)?;
                    self.processed[b.0]
                }
                Child::Composite(c) => {
                    progress += self.try_evaluate_composite(c, t, values, reset)?;
                    self.composite_processed[c.0]
                }
            };
            all_done &= done;
        }
        self.composite_processed[id.0] = all_done;
        Ok(progress)
    }

    /// Try a single block. Returns 1 if it became processed.
    pub fn try_evaluate_block(
        &mut self,
        id: BlockId,
        t: f64,
        values: &mut ValueMap,
        reset: bool,
    ) -> Result<usize> {
        if reset {
            self.processed[id.0] = false;
        }
        if self.processed[id.0] {
            return Ok(0);
        }

        let slot = &mut self.blocks[id.0];
        if !slot.body.readiness().is_satisfied(&slot.inputs, values) {
            return Ok(0);
        }

        // State holders were seeded before the pass
        if slot.body.state().is_none() {
            let outputs = {
                let ports = PortValues::new(&slot.name, &slot.inputs, values);
                slot.body.activate(t, &ports)?
            };
            if outputs.len() != slot.outputs.len() {
                return Err(SimError::port_count(
                    slot.name.clone(),
                    "output",
                    slot.outputs.len().to_string(),
                    outputs.len(),
                ));
            }
            log::trace!("activated {} ({}) at t = {}", slot.name, slot.body.kind(), t);
            for (signal, value) in slot.outputs.iter().zip(outputs) {
                values.insert(signal.clone(), value)?;
            }
        }

        self.processed[id.0] = true;
        self.fired.push(id);
        Ok(1)
    }

    /// Clear every processed flag.
    pub fn mark_unprocessed(&mut self) {
        self.processed.iter_mut().for_each(|p| *p = false);
        self.composite_processed.iter_mut().for_each(|p| *p = false);
    }

    /// Recompute composite flags from their children.
    pub fn refresh_composites(&mut self) {
        // Pre-order storage: children always come after their parent
        for i in (0..self.composites.len()).rev() {
            let done = self.composites[i].children.iter().all(|child| match *child {
                Child::Block(b) => self.processed[b.0],
                Child::Composite(c) => self.composite_processed[c.0],
            });
            self.composite_processed[i] = done;
        }
    }

    /// True once every block in the tree is processed.
    pub fn is_processed(&self) -> bool {
        self.processed.iter().all(|p| *p)
    }

    pub fn is_block_processed(&self, id: BlockId) -> bool {
        self.processed.get(id.0).copied().unwrap_or(false)
    }

    pub(crate) fn clear_fired(&mut self) {
        self.fired.clear();
    }

    pub(crate) fn take_fired(&mut self) -> Vec<BlockId> {
        std::mem::take(&mut self.fired)
    }

    /// Describe every unprocessed block and which of its ports have values.
    pub fn unprocessed_report(&self, values: &ValueMap) -> DeadlockReport {
        let status = |signals: &[Signal]| -> Vec<PortStatus> {
            signals
                .iter()
                .map(|s| PortStatus {
                    signal: s.to_string(),
                    present: values.contains(s),
                })
                .collect()
        };
        let blocks = self
            .blocks
            .iter()
            .zip(&self.processed)
            .filter(|(_, done)| !**done)
            .map(|(slot, _)| StuckBlock {
                name: slot.name.clone(),
                inputs: status(&slot.inputs),
                outputs: status(&slot.outputs),
            })
            .collect();
        DeadlockReport { blocks }
    }

    // ============ State ============

    /// Every continuous state in declaration order.
    pub fn collect_states(&self) -> Vec<StateSlot> {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                let value = slot.body.state()?;
                Some(StateSlot {
                    block: BlockId(i),
                    state: slot.outputs.first()?.clone(),
                    deriv: slot.inputs.first()?.clone(),
                    value: value.clone(),
                })
            })
            .collect()
    }

    /// Let every block absorb the values of a completed step.
    pub fn commit(&mut self, t: f64, values: &ValueMap) -> Result<()> {
        for slot in &mut self.blocks {
            let inputs = PortValues::new(&slot.name, &slot.inputs, values);
            let outputs = PortValues::new(&slot.name, &slot.outputs, values);
            slot.body.commit(t, &inputs, &outputs)?;
        }
        Ok(())
    }

    /// Collect the state replacements blocks request for the next step.
    pub fn take_resets(&mut self) -> Result<Vec<(BlockId, Value)>> {
        let mut resets = Vec::new();
        for (i, slot) in self.blocks.iter_mut().enumerate() {
            if let Some(value) = slot.body.take_reset()? {
                log::debug!("{} resets its state", slot.name);
                resets.push((BlockId(i), value));
            }
        }
        Ok(resets)
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("blocks", &self.blocks.len())
            .field("composites", &self.composites.len())
            .finish()
    }
}
