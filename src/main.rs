//! Signalflow - Block Diagram Simulator
//!
//! Runs one of the built-in reference models and writes the recorded
//! history as CSV.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info signalflow --model mass-spring-damper --step 0.001 --end 10 > msd.csv
//! ```

use std::io::{self, Write};

use clap::{Parser, ValueEnum};
use signalflow::{
    blocks::{AddSub, Gain, Integrator, MulDiv},
    error::{Result, SimError},
    solver::{NoInputs, Parameters, StepperKind},
    Model, Simulator, SimulatorConfig,
};

/// Reference models
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Demo {
    /// dx/dt = -x
    Decay,
    /// m x'' + c x' + k x = 0
    MassSpringDamper,
}

/// Block diagram simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to simulate
    #[arg(short, long, value_enum, default_value_t = Demo::Decay)]
    model: Demo,

    /// Integration step in seconds
    #[arg(long, default_value_t = 0.01)]
    step: f64,

    /// End time in seconds
    #[arg(long, default_value_t = 5.0)]
    end: f64,

    /// Integration rule (rk4, euler, passive)
    #[arg(long, default_value = "rk4")]
    stepper: StepperKind,
}

fn decay() -> Result<(Model, Parameters)> {
    let model = Model::build("decay", |b| {
        b.add("x", Integrator::new(1.0), &["dx".into()], &["x".into()])?;
        b.add("k", Gain::new(-1.0), &["x".into()], &["dx".into()])?;
        Ok(())
    })?;
    Ok((model, Parameters::new()))
}

fn mass_spring_damper() -> Result<(Model, Parameters)> {
    let model = Model::build("msd", |b| {
        b.add("v", Integrator::new(0.0), &["a".into()], &["v".into()])?;
        b.add("x", Integrator::new(1.0), &["v".into()], &["x".into()])?;
        b.submodel("force", &["x".into(), "v".into()], &["f".into()], |b| {
            let x = b.input(0)?;
            let v = b.input(1)?;
            let f = b.output(0)?;
            b.add("spring", MulDiv::multiply(), &[x, "k".into()], &["spring".into()])?;
            b.add("damper", MulDiv::multiply(), &[v, "c".into()], &["damper".into()])?;
            b.add("sum", AddSub::new("--"), &["spring".into(), "damper".into()], &[f])?;
            Ok(())
        })?;
        b.add("a", MulDiv::divide(), &["f".into(), "m".into()], &["a".into()])?;
        Ok(())
    })?;
    let params = Parameters::new()
        .with("m", 1.0)
        .with("force.k", 4.0)
        .with("force.c", 0.4);
    Ok((model, params))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let (model, params) = match args.model {
        Demo::Decay => decay()?,
        Demo::MassSpringDamper => mass_spring_damper()?,
    };

    let config = SimulatorConfig::new()
        .with_span(0.0, args.end)
        .with_step(args.step)
        .with_stepper(args.stepper);
    let mut simulator = Simulator::with_config(model, params, config)?;
    let history = simulator.run(&mut NoInputs)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let write_error = |source| SimError::Io {
        path: "<stdout>".to_string(),
        source,
    };
    history.write_csv(&mut out).map_err(write_error)?;
    out.flush().map_err(write_error)?;

    Ok(())
}
