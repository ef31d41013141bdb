//! Run harness.

use std::collections::BTreeMap;

use nalgebra::DVector;

use super::history::History;
use super::resolver::Resolver;
use super::states::StateLayout;
use super::stepper::{Passive, Stepper, StepperKind};
use super::PROGRESS_INTERVAL;
use crate::error::{Result, SimError};
use crate::model::Model;
use crate::signal::{Signal, Value, ValueMap};

/// Configuration for the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Start time of the uniform grid.
    pub t0: f64,
    /// End time (inclusive when it falls on the grid).
    pub t_end: f64,
    /// Integration step.
    pub step: f64,
    /// Integration rule.
    pub stepper: StepperKind,
    /// Reuse the previous firing order in the resolver.
    pub reuse_order: bool,
    /// Also record auto-generated wires.
    pub record_anonymous: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            t0: 0.0,
            t_end: 1.0,
            step: 0.01,
            stepper: StepperKind::Rk4,
            reuse_order: false,
            record_anonymous: false,
        }
    }
}

impl SimulatorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time span of the uniform grid.
    pub fn with_span(mut self, t0: f64, t_end: f64) -> Self {
        self.t0 = t0;
        self.t_end = t_end;
        self
    }

    /// Set the integration step.
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn with_stepper(mut self, stepper: StepperKind) -> Self {
        self.stepper = stepper;
        self
    }

    /// Let the resolver try blocks in the order they fired last time.
    ///
    /// Results are identical; only the number of sweeps changes.
    pub fn with_reuse_order(mut self, reuse_order: bool) -> Self {
        self.reuse_order = reuse_order;
        self
    }

    pub fn with_record_anonymous(mut self, record_anonymous: bool) -> Self {
        self.record_anonymous = record_anonymous;
        self
    }

    /// Check the grid parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.step > 0.0) || !self.step.is_finite() {
            return Err(SimError::invalid_param(format!(
                "step must be positive, got {}",
                self.step
            )));
        }
        if !self.t0.is_finite() || !self.t_end.is_finite() || self.t_end < self.t0 {
            return Err(SimError::invalid_param(format!(
                "invalid time span [{}, {}]",
                self.t0, self.t_end
            )));
        }
        Ok(())
    }

    /// The uniform grid `t0 + k * step` up to `t_end`.
    pub fn grid(&self) -> Result<Vec<f64>> {
        self.validate()?;
        // Tolerate rounding so that t_end itself lands on the grid
        let n = ((self.t_end - self.t0) / self.step + 1e-9).floor() as usize;
        Ok((0..=n).map(|k| self.t0 + k as f64 * self.step).collect())
    }
}

/// Fixed named constants merged into every value map.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    values: BTreeMap<String, Value>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, signal: &Signal) -> bool {
        match signal {
            Signal::Named(name) => self.values.contains_key(name),
            Signal::Anonymous { .. } => false,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// External inputs of a run, sampled once per timestamp.
pub trait InputProvider {
    /// Values of the external signals at `t`, given the current state vector.
    fn inputs(&mut self, t: f64, x: &DVector<f64>) -> Result<BTreeMap<String, Value>>;
}

impl<F> InputProvider for F
where
    F: FnMut(f64, &DVector<f64>) -> BTreeMap<String, Value>,
{
    fn inputs(&mut self, t: f64, x: &DVector<f64>) -> Result<BTreeMap<String, Value>> {
        Ok((*self)(t, x))
    }
}

/// Input provider for models without external inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInputs;

impl InputProvider for NoInputs {
    fn inputs(&mut self, _t: f64, _x: &DVector<f64>) -> Result<BTreeMap<String, Value>> {
        Ok(BTreeMap::new())
    }
}

/// Build the value map for one evaluation: states, parameters, inputs.
fn seed_values(
    layout: &StateLayout,
    x: &DVector<f64>,
    parameters: &Parameters,
    inputs: &BTreeMap<String, Value>,
) -> Result<ValueMap> {
    let mut values = ValueMap::with_capacity(layout.variables().len() + parameters.len() + inputs.len());
    layout.seed(x, &mut values)?;
    for (name, value) in parameters.iter() {
        values.insert(Signal::named(name), value.clone())?;
    }
    for (name, value) in inputs {
        values.insert(Signal::named(name.clone()), value.clone())?;
    }
    Ok(values)
}

/// Drives a model over time.
///
/// At each timestamp the harness samples the inputs, seeds the value map,
/// resolves, records, commits held block state and then advances the state
/// vector to the next timestamp with the configured stepper.
pub struct Simulator {
    model: Model,
    parameters: Parameters,
    config: SimulatorConfig,
    resolver: Resolver,
    layout: StateLayout,
    x: DVector<f64>,
}

impl Simulator {
    /// Create a new simulator with default configuration.
    pub fn new(model: Model, parameters: Parameters) -> Result<Self> {
        Self::with_config(model, parameters, SimulatorConfig::default())
    }

    /// Create a new simulator with custom configuration.
    pub fn with_config(model: Model, parameters: Parameters, config: SimulatorConfig) -> Result<Self> {
        for (name, _) in parameters.iter() {
            if let Some(block) = model.producer(&Signal::named(name)) {
                return Err(SimError::ParameterShadowsOutput {
                    name: name.to_string(),
                    block: block.to_string(),
                });
            }
        }
        let layout = StateLayout::collect(&model);
        let x = layout.pack_vector()?;
        let resolver = Resolver::new().with_reuse_order(config.reuse_order);
        Ok(Self {
            model,
            parameters,
            config,
            resolver,
            layout,
            x,
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    /// Current state vector.
    pub fn state_vector(&self) -> &DVector<f64> {
        &self.x
    }

    /// Consume the simulator, returning the model with its held state.
    pub fn into_model(self) -> Model {
        self.model
    }

    /// Run over the configured uniform grid.
    pub fn run(&mut self, inputs: &mut dyn InputProvider) -> Result<History> {
        let times = self.config.grid()?;
        self.run_over(&times, inputs)
    }

    /// Run over an explicit, strictly increasing time sequence.
    pub fn run_over(&mut self, times: &[f64], inputs: &mut dyn InputProvider) -> Result<History> {
        for pair in times.windows(2) {
            if !(pair[1] > pair[0]) {
                return Err(SimError::NonMonotonicTime {
                    t: pair[1],
                    previous: pair[0],
                });
            }
        }

        let mut stepper: Box<dyn Stepper> = if self.layout.is_empty() {
            Box::new(Passive)
        } else {
            self.config.stepper.build()
        };
        log::debug!(
            "running {} over {} timestamp(s): {} state entries, stepper {}",
            self.model.name(),
            times.len(),
            self.layout.size(),
            stepper.name()
        );

        let Self {
            model,
            parameters,
            config,
            resolver,
            layout,
            x,
        } = self;
        let record_anonymous = config.record_anonymous;
        let mut history = History::new();

        for (k, &t) in times.iter().enumerate() {
            let u = inputs.inputs(t, x)?;
            for name in u.keys() {
                if let Some(block) = model.producer(&Signal::named(name.clone())) {
                    return Err(SimError::Input {
                        t,
                        message: format!("input '{}' is an output of block '{}'", name, block),
                    });
                }
            }

            let mut values = seed_values(layout, x, parameters, &u)?;
            resolver.resolve(model, t, &mut values)?;
            history.record(t, &values, |s| {
                (record_anonymous || !s.is_anonymous()) && !parameters.contains(s)
            })?;
            model.commit(t, &values)?;

            if k % PROGRESS_INTERVAL == 0 {
                log::info!("{}: t = {}", k, t);
            }

            let Some(&t_next) = times.get(k + 1) else {
                break;
            };
            if layout.is_empty() {
                // Pure discrete evaluation
                continue;
            }
            let mut derivatives = |ts: f64, xs: &DVector<f64>| -> Result<DVector<f64>> {
                let mut stage = seed_values(layout, xs, parameters, &u)?;
                resolver.resolve(model, ts, &mut stage)?;
                layout.derivatives(&stage)
            };
            *x = stepper.step(&mut derivatives, t, x, t_next - t)?;
            for (block, value) in model.take_resets()? {
                layout.overwrite(x, block, &value)?;
            }
        }

        Ok(history)
    }

    /// Resolve the model once at `t` from the current state, without
    /// committing anything.
    pub fn evaluate(&mut self, t: f64, inputs: &BTreeMap<String, Value>) -> Result<ValueMap> {
        let mut values = seed_values(&self.layout, &self.x, &self.parameters, inputs)?;
        self.resolver.resolve(&mut self.model, t, &mut values)?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Const, Gain, Integrator, MulDiv};
    use approx::assert_relative_eq;

    fn decay() -> Model {
        Model::build("decay", |b| {
            b.add("x", Integrator::new(1.0), &["dx".into()], &["x".into()])?;
            b.add("k", MulDiv::multiply(), &["x".into(), "rate".into()], &["dx".into()])?;
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn test_config_grid() {
        let grid = SimulatorConfig::new().with_span(0.0, 0.05).with_step(0.01).grid().unwrap();
        assert_eq!(grid.len(), 6);
        assert_relative_eq!(grid[5], 0.05);
        assert!(SimulatorConfig::new().with_step(0.0).validate().is_err());
        assert!(SimulatorConfig::new().with_span(1.0, 0.0).validate().is_err());
    }

    #[test]
    fn test_parameters_are_merged_not_recorded() {
        let params = Parameters::new().with("rate", -2.0);
        let config = SimulatorConfig::new().with_span(0.0, 0.5).with_step(0.01);
        let mut sim = Simulator::with_config(decay(), params, config).unwrap();
        let history = sim.run(&mut NoInputs).unwrap();

        assert!(history.get("rate").is_none());
        let x = history.scalar_series("x").unwrap();
        assert_relative_eq!(*x.last().unwrap(), (-1.0f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn test_parameter_shadowing_rejected() {
        let params = Parameters::new().with("dx", 0.0);
        assert!(matches!(
            Simulator::new(decay(), params),
            Err(SimError::ParameterShadowsOutput { ref block, .. }) if block == "k"
        ));
    }

    #[test]
    fn test_inputs_sampled_per_timestamp() {
        let model = Model::build("amp", |b| {
            b.add("g", Gain::new(3.0), &["u".into()], &["y".into()])?;
            Ok(())
        })
        .unwrap();
        let mut sim = Simulator::new(model, Parameters::new()).unwrap();
        let mut ramp = |t: f64, _x: &DVector<f64>| BTreeMap::from([("u".to_string(), Value::Scalar(t))]);
        let history = sim.run_over(&[0.0, 1.0, 2.0], &mut ramp).unwrap();
        assert_eq!(history.scalar_series("y").unwrap(), vec![0.0, 3.0, 6.0]);
        assert_eq!(history.scalar_series("u").unwrap(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_input_shadowing_output_rejected() {
        let model = Model::build("c", |b| {
            b.add("c", Const::new(1.0), &[], &["y".into()])?;
            Ok(())
        })
        .unwrap();
        let mut sim = Simulator::new(model, Parameters::new()).unwrap();
        let mut bad = |_t: f64, _x: &DVector<f64>| BTreeMap::from([("y".to_string(), Value::Scalar(0.0))]);
        assert!(matches!(sim.run_over(&[0.0], &mut bad), Err(SimError::Input { .. })));
    }

    #[test]
    fn test_times_must_increase() {
        let mut sim = Simulator::new(decay(), Parameters::new().with("rate", -1.0)).unwrap();
        assert!(matches!(
            sim.run_over(&[0.0, 0.1, 0.1], &mut NoInputs),
            Err(SimError::NonMonotonicTime { .. })
        ));
    }

    #[test]
    fn test_evaluate_does_not_commit() {
        let mut sim = Simulator::new(decay(), Parameters::new().with("rate", -1.0)).unwrap();
        let values = sim.evaluate(0.0, &BTreeMap::new()).unwrap();
        assert_eq!(values.get_named("dx"), Some(&Value::Scalar(-1.0)));
        assert_eq!(sim.state_vector()[0], 1.0);
    }
}
