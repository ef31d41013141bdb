//! Model construction with an explicit scope stack.

use std::collections::HashMap;

use super::graph::{BlockId, BlockSlot, Child, Composite, CompositeId, Model};
use crate::blocks::Block;
use crate::error::{Result, SimError};
use crate::signal::{join, Namespace, Port, Signal};
use crate::{ANONYMOUS_MARKER, SCOPE_SEPARATOR, TIME_KEY};

/// Construction state of one open composite.
#[derive(Debug)]
struct ScopeFrame {
    composite: CompositeId,
    /// Qualification prefix for names declared in this scope
    prefix: String,
    /// Most recent anonymous output in this scope
    last_anonymous: Option<Signal>,
    /// Labeled anonymous wires
    wires: HashMap<u32, Signal>,
    /// Counter for auto-generated block names
    unnamed: usize,
}

impl ScopeFrame {
    fn new(composite: CompositeId, prefix: String) -> Self {
        Self {
            composite,
            prefix,
            last_anonymous: None,
            wires: HashMap::new(),
            unnamed: 0,
        }
    }
}

/// Builds a [`Model`] block by block.
///
/// Blocks are added to whichever composite is current. [`submodel`] opens a
/// nested composite for the duration of its closure, so nested blocks are
/// registered in the right parent and their port names are qualified with
/// the composite's name.
///
/// [`submodel`]: ModelBuilder::submodel
pub struct ModelBuilder {
    name: String,
    blocks: Vec<BlockSlot>,
    composites: Vec<Composite>,
    namespace: Namespace,
    stack: Vec<ScopeFrame>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let root = Composite {
            name: name.clone(),
            parent: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            children: Vec::new(),
        };
        Self {
            name,
            blocks: Vec::new(),
            composites: vec![root],
            namespace: Namespace::new(),
            stack: vec![ScopeFrame::new(CompositeId::ROOT, String::new())],
        }
    }

    fn frame(&self) -> Result<&ScopeFrame> {
        self.stack
            .last()
            .ok_or_else(|| SimError::scope("no open scope"))
    }

    fn frame_mut(&mut self) -> Result<&mut ScopeFrame> {
        self.stack
            .last_mut()
            .ok_or_else(|| SimError::scope("no open scope"))
    }

    /// Qualified prefix of the current scope (empty at the root).
    pub fn scope(&self) -> &str {
        self.stack.last().map_or("", |f| f.prefix.as_str())
    }

    /// Qualify a local name the way a block added now would see it.
    pub fn qualify(&self, name: &str) -> Signal {
        Namespace::qualify(name, self.scope())
    }

    fn qualified_name(&mut self, name: &str, kind: &str) -> Result<String> {
        let frame = self.frame_mut()?;
        if name.is_empty() {
            frame.unnamed += 1;
            Ok(join(&frame.prefix, &format!("{}{}", kind, frame.unnamed)))
        } else {
            Ok(join(&frame.prefix, name))
        }
    }

    fn wire(&mut self, label: u32) -> Result<Signal> {
        let frame = self
            .stack
            .last_mut()
            .ok_or_else(|| SimError::scope("no open scope"))?;
        if let Some(signal) = frame.wires.get(&label) {
            return Ok(signal.clone());
        }
        let signal = self.namespace.fresh_anonymous(&frame.prefix);
        frame.wires.insert(label, signal.clone());
        Ok(signal)
    }

    /// Reject user names that could alias an anonymous signal's display name.
    fn check_user_name(name: &str) -> Result<()> {
        if name.starts_with(ANONYMOUS_MARKER) {
            return Err(SimError::ReservedName {
                name: name.to_string(),
                reason: "the leading marker is used for anonymous signals",
            });
        }
        Ok(())
    }

    fn resolve_named(&self, port: &Port) -> Result<Option<Signal>> {
        let signal = match port {
            Port::Name(name) => {
                Self::check_user_name(name)?;
                self.qualify(name)
            }
            Port::Global(name) => {
                Self::check_user_name(name)?;
                Signal::named(name.clone())
            }
            Port::Signal(signal) => {
                if let Signal::Named(name) = signal {
                    Self::check_user_name(name)?;
                }
                signal.clone()
            }
            Port::Fresh | Port::Wire(_) => return Ok(None),
        };
        Ok(Some(signal))
    }

    fn resolve_input(&mut self, port: &Port, block: &str) -> Result<Signal> {
        if let Some(signal) = self.resolve_named(port)? {
            return Ok(signal);
        }
        match port {
            Port::Wire(label) => self.wire(*label),
            _ => Err(SimError::scope(format!(
                "{}: a fresh anonymous signal cannot be an input",
                block
            ))),
        }
    }

    fn resolve_output(&mut self, port: &Port) -> Result<Signal> {
        let signal = match self.resolve_named(port)? {
            Some(signal) => signal,
            None => match port {
                Port::Wire(label) => self.wire(*label)?,
                _ => {
                    let scope = self.scope().to_string();
                    self.namespace.fresh_anonymous(&scope)
                }
            },
        };
        if signal == Signal::named(TIME_KEY) {
            return Err(SimError::ReservedName {
                name: TIME_KEY.to_string(),
                reason: "it names the time column of the history",
            });
        }
        if signal.is_anonymous() {
            self.frame_mut()?.last_anonymous = Some(signal.clone());
        }
        Ok(signal)
    }

    /// Add a block to the current composite.
    ///
    /// An empty `name` is replaced with the block kind and a counter.
    pub fn add(
        &mut self,
        name: &str,
        block: impl Block + 'static,
        inputs: &[Port],
        outputs: &[Port],
    ) -> Result<BlockId> {
        let mut body: Box<dyn Block> = Box::new(block);
        let name = self.qualified_name(name, body.kind())?;

        let inputs = inputs
            .iter()
            .map(|p| self.resolve_input(p, &name))
            .collect::<Result<Vec<_>>>()?;
        let outputs = outputs
            .iter()
            .map(|p| self.resolve_output(p))
            .collect::<Result<Vec<_>>>()?;

        for signal in &outputs {
            self.namespace.register_output(signal, &name)?;
        }
        body.bind(&name, &inputs, &outputs)?;

        let parent = self.frame()?.composite;
        let id = BlockId(self.blocks.len());
        log::debug!("added {} {} ({} in, {} out)", body.kind(), name, inputs.len(), outputs.len());
        self.blocks.push(BlockSlot {
            name,
            inputs,
            outputs,
            parent,
            body,
        });
        self.composites[parent.0].children.push(Child::Block(id));
        Ok(id)
    }

    /// Add a nested composite and build its contents inside `body`.
    ///
    /// `inputs` and `outputs` are resolved in the current scope; inside the
    /// closure they are reachable through [`input`](Self::input) and
    /// [`output`](Self::output). Some block inside must write each output.
    pub fn submodel<F>(
        &mut self,
        name: &str,
        inputs: &[Port],
        outputs: &[Port],
        body: F,
    ) -> Result<CompositeId>
    where
        F: FnOnce(&mut ModelBuilder) -> Result<()>,
    {
        let qualified = self.qualified_name(name, "Submodel")?;
        let inputs = inputs
            .iter()
            .map(|p| self.resolve_input(p, &qualified))
            .collect::<Result<Vec<_>>>()?;
        let outputs = outputs
            .iter()
            .map(|p| self.resolve_output(p))
            .collect::<Result<Vec<_>>>()?;

        let parent = self.frame()?.composite;
        let id = CompositeId(self.composites.len());
        self.composites.push(Composite {
            name: qualified.clone(),
            parent: Some(parent),
            inputs,
            outputs,
            children: Vec::new(),
        });
        self.composites[parent.0].children.push(Child::Composite(id));

        let depth = self.stack.len();
        self.stack.push(ScopeFrame::new(id, qualified));
        let result = body(self);
        self.stack.truncate(depth);
        result?;
        Ok(id)
    }

    fn composite_port(&self, index: usize, direction: &str) -> Result<Port> {
        let frame = self.frame()?;
        let composite = &self.composites[frame.composite.0];
        let ports = if direction == "input" {
            &composite.inputs
        } else {
            &composite.outputs
        };
        ports
            .get(index)
            .map(|s| Port::Signal(s.clone()))
            .ok_or_else(|| {
                SimError::scope(format!(
                    "{} has {} {}(s), no #{}",
                    composite.name,
                    ports.len(),
                    direction,
                    index
                ))
            })
    }

    /// The signal of the current composite's input port `index`.
    pub fn input(&self, index: usize) -> Result<Port> {
        self.composite_port(index, "input")
    }

    /// The signal of the current composite's output port `index`.
    pub fn output(&self, index: usize) -> Result<Port> {
        self.composite_port(index, "output")
    }

    /// A port reading the most recent anonymous output of the current scope.
    pub fn connect_to_previous_output(&self) -> Result<Port> {
        let frame = self.frame()?;
        frame
            .last_anonymous
            .clone()
            .map(Port::Signal)
            .ok_or_else(|| SimError::NoPreviousOutput {
                scope: frame.prefix.clone(),
            })
    }

    /// Check every selector fed directly by a bus in this model.
    fn validate_buses(&self) -> Result<()> {
        let producers: HashMap<&Signal, usize> = self
            .blocks
            .iter()
            .enumerate()
            .flat_map(|(i, b)| b.outputs.iter().map(move |s| (s, i)))
            .collect();

        for slot in &self.blocks {
            let (Some(paths), Some(source)) = (slot.body.bus_selection(), slot.inputs.first()) else {
                continue;
            };
            for path in paths {
                let mut producer = producers.get(source).copied();
                for segment in path.split(SCOPE_SEPARATOR) {
                    let Some(bus) = producer.map(|i| &self.blocks[i]) else {
                        break;
                    };
                    let Some(members) = bus.body.bus_layout() else {
                        break;
                    };
                    let index = members.iter().position(|m| m == segment).ok_or_else(|| {
                        SimError::UnknownBusMember {
                            member: path.clone(),
                            available: members.to_vec(),
                        }
                    })?;
                    // Nested bus: continue with whoever feeds that member
                    producer = bus
                        .inputs
                        .get(index)
                        .and_then(|s| producers.get(s).copied());
                }
            }
        }
        Ok(())
    }

    /// Close construction and return the finished model.
    pub fn finish(self) -> Result<Model> {
        if self.stack.len() != 1 {
            return Err(SimError::scope(format!(
                "{} scope(s) still open at finish",
                self.stack.len().saturating_sub(1)
            )));
        }
        self.validate_buses()?;

        log::debug!(
            "model {} built: {} block(s), {} composite(s)",
            self.name,
            self.blocks.len(),
            self.composites.len()
        );
        let num_blocks = self.blocks.len();
        let num_composites = self.composites.len();
        Ok(Model {
            name: self.name,
            blocks: self.blocks,
            composites: self.composites,
            processed: vec![false; num_blocks],
            composite_processed: vec![false; num_composites],
            namespace: self.namespace,
            fired: Vec::new(),
        })
    }
}

impl Model {
    /// Build a model by running `body` against a fresh builder.
    pub fn build<F>(name: impl Into<String>, body: F) -> Result<Model>
    where
        F: FnOnce(&mut ModelBuilder) -> Result<()>,
    {
        let mut builder = ModelBuilder::new(name);
        body(&mut builder)?;
        builder.finish()
    }
}
