//! End-to-end checks through the public API.

use std::collections::BTreeMap;

use approx::assert_abs_diff_eq;
use nalgebra::DVector;
use signalflow::blocks::{
    AddSub, Bus, BusMemory, BusSelector, Const, Delay, Derivative, Function, Gain, InitialValue,
    Integrator, Memory, MulDiv, Source, TriggeredIntegrator,
};
use signalflow::signal::BusValue;
use signalflow::solver::{NoInputs, Parameters, StateLayout, StepperKind};
use signalflow::{Model, Port, SimError, Simulator, SimulatorConfig, Value, TIME_KEY};

fn config(t_end: f64, step: f64) -> SimulatorConfig {
    SimulatorConfig::new().with_span(0.0, t_end).with_step(step)
}

/// `y = (a + b) * 2 - a`, blocks added in the given order.
fn arithmetic(order: &[usize]) -> Model {
    Model::build("arith", |b| {
        for &i in order {
            match i {
                0 => b.add("a", Const::new(3.0), &[], &["a".into()])?,
                1 => b.add("b", Const::new(Value::array(&[1.0, -1.0])), &[], &["b".into()])?,
                2 => b.add("sum", AddSub::add(), &["a".into(), "b".into()], &["s".into()])?,
                3 => b.add("dbl", Gain::new(2.0), &["s".into()], &["d".into()])?,
                _ => b.add("y", AddSub::subtract(), &["d".into(), "a".into()], &["y".into()])?,
            };
        }
        Ok(())
    })
    .unwrap()
}

#[test]
fn test_fixed_point_independent_of_declaration_order() {
    let orders: [&[usize]; 3] = [&[0, 1, 2, 3, 4], &[4, 3, 2, 1, 0], &[2, 4, 0, 3, 1]];
    let mut results = Vec::new();
    for order in orders {
        let mut sim = Simulator::new(arithmetic(order), Parameters::new()).unwrap();
        let values = sim.evaluate(0.0, &BTreeMap::new()).unwrap();
        let snapshot: Vec<_> = ["a", "b", "s", "d", "y"]
            .iter()
            .map(|n| values.get_named(n).cloned())
            .collect();
        results.push(snapshot);
    }
    assert!(results.iter().all(|r| r == &results[0]));
    assert_eq!(results[0][4], Some(Value::array(&[5.0, 1.0])));
}

#[test]
fn test_integrator_breaks_cycle_and_matches_exponential() {
    let model = Model::build("decay", |b| {
        b.add("k", Gain::new(-1.0), &["x".into()], &["dx".into()])?;
        b.add("x", Integrator::new(1.0), &["dx".into()], &["x".into()])?;
        Ok(())
    })
    .unwrap();

    let mut sim = Simulator::with_config(model, Parameters::new(), config(5.0, 0.01)).unwrap();
    let history = sim.run(&mut NoInputs).unwrap();

    let times = history.scalar_series(TIME_KEY).unwrap();
    let x = history.scalar_series("x").unwrap();
    assert_eq!(times.len(), 501);
    assert_abs_diff_eq!(*times.last().unwrap(), 5.0, epsilon = 1e-9);
    for (t, x) in times.iter().zip(&x) {
        assert_abs_diff_eq!(*x, (-t).exp(), epsilon = 1e-9);
    }
}

#[test]
fn test_euler_is_first_order() {
    let build = || {
        Model::build("decay", |b| {
            b.add("x", Integrator::new(1.0), &["dx".into()], &["x".into()])?;
            b.add("k", Gain::new(-1.0), &["x".into()], &["dx".into()])?;
            Ok(())
        })
        .unwrap()
    };
    let mut errors = Vec::new();
    for h in [0.01, 0.005] {
        let cfg = config(1.0, h).with_stepper(StepperKind::Euler);
        let mut sim = Simulator::with_config(build(), Parameters::new(), cfg).unwrap();
        let history = sim.run(&mut NoInputs).unwrap();
        let x = *history.scalar_series("x").unwrap().last().unwrap();
        errors.push((x - (-1.0f64).exp()).abs());
    }
    let ratio = errors[0] / errors[1];
    assert!(ratio > 1.8 && ratio < 2.2, "ratio {}", ratio);
}

#[test]
fn test_array_state_oscillator() {
    // q' = [q1, -q0]: q0 = cos(t), q1 = -sin(t)
    let model = Model::build("osc", |b| {
        b.add("q", Integrator::new(vec![1.0, 0.0]), &["dq".into()], &["q".into()])?;
        b.add(
            "rot",
            Function::new(|_t, q| {
                let q = q.as_array()?;
                Ok(Value::array(&[q[1], -q[0]]))
            }),
            &["q".into()],
            &["dq".into()],
        )?;
        Ok(())
    })
    .unwrap();

    let mut sim = Simulator::with_config(model, Parameters::new(), config(2.0, 0.01)).unwrap();
    let history = sim.run(&mut NoInputs).unwrap();
    let q = history.last("q").unwrap().as_array().unwrap().clone();
    assert_abs_diff_eq!(q[0], 2.0f64.cos(), epsilon = 1e-8);
    assert_abs_diff_eq!(q[1], -(2.0f64.sin()), epsilon = 1e-8);
}

#[test]
fn test_mass_spring_damper_in_submodel() {
    let model = Model::build("msd", |b| {
        b.add("v", Integrator::new(0.0), &["a".into()], &["v".into()])?;
        b.add("x", Integrator::new(1.0), &["v".into()], &["x".into()])?;
        b.submodel("force", &["x".into(), "v".into()], &["f".into()], |b| {
            let x = b.input(0)?;
            let v = b.input(1)?;
            let f = b.output(0)?;
            b.add("spring", MulDiv::multiply(), &[x, Port::global("k")], &[Port::Fresh])?;
            let spring = b.connect_to_previous_output()?;
            b.add("damper", MulDiv::multiply(), &[v, Port::global("c")], &[Port::Fresh])?;
            let damper = b.connect_to_previous_output()?;
            b.add("sum", AddSub::new("--"), &[spring, damper], &[f])?;
            Ok(())
        })?;
        b.add("acc", MulDiv::divide(), &["f".into(), "m".into()], &["a".into()])?;
        Ok(())
    })
    .unwrap();

    // Critically damped: x(t) = (1 + t) e^-t
    let params = Parameters::new().with("m", 1.0).with("k", 1.0).with("c", 2.0);
    let mut sim = Simulator::with_config(model, params, config(3.0, 0.01)).unwrap();
    let history = sim.run(&mut NoInputs).unwrap();

    let times = history.scalar_series(TIME_KEY).unwrap();
    let x = history.scalar_series("x").unwrap();
    for (t, x) in times.iter().zip(&x).step_by(50) {
        assert_abs_diff_eq!(*x, (1.0 + t) * (-t).exp(), epsilon = 1e-7);
    }
    // Parameters and anonymous wires are not recorded
    assert!(history.get("k").is_none());
    assert!(history.names().all(|n| !n.starts_with(signalflow::ANONYMOUS_MARKER)));
    assert!(history.get("force.sum").is_none());
    assert!(history.get("f").is_some());
}

#[test]
fn test_duplicate_output_detected_at_construction() {
    let result = Model::build("dup", |b| {
        b.add("c1", Const::new(1.0), &[], &["y".into()])?;
        b.submodel("sub", &[], &[], |b| {
            b.add("c2", Const::new(2.0), &[], &[Port::global("y")])?;
            Ok(())
        })?;
        Ok(())
    });
    match result {
        Err(SimError::DuplicateOutput { signal, block, existing }) => {
            assert_eq!(signal, "y");
            assert_eq!(block, "sub.c2");
            assert_eq!(existing, "c1");
        }
        other => panic!("expected a duplicate output error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_delay_reproduces_shifted_sine() {
    let d = 0.5;
    let model = Model::build("delay", |b| {
        b.add("sin", Source::new(|t| Value::Scalar(t.sin())), &[], &["u".into()])?;
        b.add("d", Const::new(d), &[], &["d".into()])?;
        b.add("u0", Const::new(-7.0), &[], &["u0".into()])?;
        b.add("delay", Delay::default(), &["u".into(), "d".into(), "u0".into()], &["y".into()])?;
        Ok(())
    })
    .unwrap();

    let mut sim = Simulator::with_config(model, Parameters::new(), config(3.0, 0.01)).unwrap();
    let history = sim.run(&mut NoInputs).unwrap();
    let times = history.scalar_series(TIME_KEY).unwrap();
    let y = history.scalar_series("y").unwrap();

    for (t, y) in times.iter().zip(&y) {
        if *t < d - 1e-9 {
            assert_eq!(*y, -7.0, "t = {}", t);
        } else {
            assert_abs_diff_eq!(*y, (t - d).sin(), epsilon = 1e-4);
        }
    }
}

#[test]
fn test_memory_lags_one_step() {
    let model = Model::build("lag", |b| {
        b.add("ramp", Source::new(Value::Scalar), &[], &["x".into()])?;
        b.add("mem", Memory::default(), &["x".into()], &["y".into()])?;
        Ok(())
    })
    .unwrap();

    let mut sim = Simulator::with_config(model, Parameters::new(), config(0.5, 0.1)).unwrap();
    let history = sim.run(&mut NoInputs).unwrap();
    let x = history.scalar_series("x").unwrap();
    let y = history.scalar_series("y").unwrap();

    assert_eq!(y[0], 0.0);
    for k in 1..x.len() {
        assert_eq!(y[k], x[k - 1]);
    }
}

#[test]
fn test_memory_breaks_algebraic_loop() {
    // y = mem(y + 1): a step counter
    let model = Model::build("counter", |b| {
        b.add("inc", AddSub::add().with_initial(1.0), &["y".into()], &["next".into()])?;
        b.add("mem", Memory::default(), &["next".into()], &["y".into()])?;
        Ok(())
    })
    .unwrap();

    let mut sim = Simulator::new(model, Parameters::new()).unwrap();
    let history = sim.run_over(&[0.0, 1.0, 2.0, 3.0], &mut NoInputs).unwrap();
    assert_eq!(history.scalar_series("y").unwrap(), vec![0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn test_bus_round_trip() {
    let model = Model::build("bus", |b| {
        b.add("a", Const::new(1.0), &[], &["a".into()])?;
        b.add("b", Const::new(2.0), &[], &["b".into()])?;
        b.add("c", Const::new(3.0), &[], &["c".into()])?;
        b.add("pack", Bus::new(), &["a".into(), "b".into(), "c".into()], &["abc".into()])?;
        b.add("pick", BusSelector::new(["b"]), &["abc".into()], &["picked".into()])?;
        Ok(())
    })
    .unwrap();

    let mut sim = Simulator::new(model, Parameters::new()).unwrap();
    let values = sim.evaluate(0.0, &BTreeMap::new()).unwrap();
    assert_eq!(values.get_named("picked"), Some(&Value::Scalar(2.0)));

    // Buses are not part of the recorded history
    let history = sim.run_over(&[0.0], &mut NoInputs).unwrap();
    assert!(history.get("abc").is_none());
    assert_eq!(history.scalar_series("picked").unwrap(), vec![2.0]);
}

#[test]
fn test_bus_unknown_member() {
    // Known statically: fails at construction
    let err = Model::build("bus", |b| {
        b.add("a", Const::new(1.0), &[], &["a".into()])?;
        b.add("pack", Bus::new(), &["a".into()], &["bus".into()])?;
        b.add("pick", BusSelector::new(["z"]), &["bus".into()], &["z".into()])?;
        Ok(())
    })
    .unwrap_err();
    assert!(matches!(err, SimError::UnknownBusMember { ref member, .. } if member == "z"));

    // Supplied from outside: fails on first lookup
    let model = Model::build("ext", |b| {
        b.add("pick", BusSelector::new(["z"]), &["bus".into()], &["z".into()])?;
        Ok(())
    })
    .unwrap();
    let mut sim = Simulator::new(model, Parameters::new()).unwrap();
    let mut inputs = |_t: f64, _x: &DVector<f64>| {
        let bus = BusValue::new(vec!["a".to_string()], vec![Value::Scalar(1.0)]).unwrap();
        BTreeMap::from([("bus".to_string(), Value::Bus(bus))])
    };
    let err = sim.run_over(&[0.0], &mut inputs).unwrap_err();
    assert!(matches!(err, SimError::UnknownBusMember { .. }));
}

#[test]
fn test_missing_input_reports_deadlock() {
    let model = Model::build("plant", |b| {
        b.submodel("ctrl", &[], &[], |b| {
            b.add("gain", Gain::new(2.0), &[Port::global("throttle")], &["cmd".into()])?;
            Ok(())
        })?;
        b.add("x", Integrator::new(0.0), &["ctrl.cmd".into()], &["x".into()])?;
        Ok(())
    })
    .unwrap();

    let mut sim = Simulator::with_config(model, Parameters::new(), config(1.0, 0.1)).unwrap();
    match sim.run(&mut NoInputs) {
        Err(SimError::Unresolved { t, report }) => {
            assert_eq!(t, 0.0);
            let gain = report.block("ctrl.gain").unwrap();
            assert_eq!(gain.missing_inputs().collect::<Vec<_>>(), vec!["throttle"]);
            // The integrator waits on the gain's output
            let x = report.block("x").unwrap();
            assert_eq!(x.missing_inputs().collect::<Vec<_>>(), vec!["ctrl.cmd"]);
            let text = report.to_string();
            assert!(text.contains("- ctrl.gain"));
            assert!(text.contains("  - i: * throttle"));
        }
        other => panic!("expected a deadlock, got {:?}", other.map(|h| h.len())),
    }
}

#[test]
fn test_state_vector_round_trip() {
    let model = Model::build("states", |b| {
        b.add("a", Integrator::new(2.5), &["da".into()], &["a".into()])?;
        b.add("c", Const::new(0.0), &[], &["da".into()])?;
        b.add("p", Integrator::new(vec![1.0, -2.0, 3.0]), &["dp".into()], &["p".into()])?;
        b.add("z", Const::new(Value::array(&[0.0, 0.0, 0.0])), &[], &["dp".into()])?;
        b.add("b", Integrator::new(-4.0), &["da".into()], &["b".into()])?;
        Ok(())
    })
    .unwrap();

    let layout = StateLayout::collect(&model);
    assert_eq!(layout.size(), 5);
    let x = layout.pack_vector().unwrap();
    assert_eq!(x.as_slice(), &[2.5, 1.0, -2.0, 3.0, -4.0]);

    let unpacked = layout.unpack_vector(&x).unwrap();
    let expected: Vec<_> = layout
        .variables()
        .iter()
        .map(|v| (v.state.clone(), v.value.clone()))
        .collect();
    assert_eq!(unpacked, expected);
}

#[test]
fn test_reuse_order_gives_identical_history() {
    let build = || arithmetic(&[4, 3, 2, 1, 0]);
    let times = [0.0, 0.5, 1.0];

    let mut plain = Simulator::new(build(), Parameters::new()).unwrap();
    let a = plain.run_over(&times, &mut NoInputs).unwrap();

    let cfg = SimulatorConfig::new().with_reuse_order(true);
    let mut fast = Simulator::with_config(build(), Parameters::new(), cfg).unwrap();
    let b = fast.run_over(&times, &mut NoInputs).unwrap();

    assert_eq!(a.names().collect::<Vec<_>>(), b.names().collect::<Vec<_>>());
    for name in a.names() {
        assert_eq!(a.get(name), b.get(name));
    }
}

#[test]
fn test_export_csv() {
    let model = Model::build("ramp", |b| {
        b.add("t", Source::new(|t| Value::Scalar(2.0 * t)), &[], &["y".into()])?;
        Ok(())
    })
    .unwrap();
    let mut sim = Simulator::new(model, Parameters::new()).unwrap();
    let history = sim.run_over(&[0.0, 0.5], &mut NoInputs).unwrap();

    let path = std::env::temp_dir().join(format!("signalflow-{}.csv", std::process::id()));
    history.export_csv(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(text, "t,y\n0,0\n0.5,1\n");
}

// Held block state must be the same for every stage of one step and change
// only when the step is committed.

#[test]
fn test_initial_value_frozen_across_stages() {
    // x' = -x(0), so x(t) = 1 - t exactly
    let model = Model::build("frozen", |b| {
        b.add("iv", InitialValue::new(), &["x".into()], &["x0".into()])?;
        b.add("k", Gain::new(-1.0), &["x0".into()], &["dx".into()])?;
        b.add("x", Integrator::new(1.0), &["dx".into()], &["x".into()])?;
        Ok(())
    })
    .unwrap();

    let mut sim = Simulator::with_config(model, Parameters::new(), config(1.0, 0.1)).unwrap();
    let history = sim.run(&mut NoInputs).unwrap();
    let times = history.scalar_series(TIME_KEY).unwrap();
    let x0 = history.scalar_series("x0").unwrap();
    let x = history.scalar_series("x").unwrap();

    assert_eq!(x0, vec![1.0; times.len()]);
    for (t, x) in times.iter().zip(&x) {
        assert_abs_diff_eq!(*x, 1.0 - t, epsilon = 1e-12);
    }
}

#[test]
fn test_derivative_inside_integrating_model() {
    let h = 0.01;
    let model = Model::build("diff", |b| {
        b.add("sin", Source::new(|t| Value::Scalar(t.sin())), &[], &["u".into()])?;
        b.add("du", Derivative::default(), &["u".into()], &["du".into()])?;
        b.add("z", Integrator::new(0.0), &["du".into()], &["z".into()])?;
        Ok(())
    })
    .unwrap();

    let mut sim = Simulator::with_config(model, Parameters::new(), config(2.0, h)).unwrap();
    let history = sim.run(&mut NoInputs).unwrap();
    let times = history.scalar_series(TIME_KEY).unwrap();
    let du = history.scalar_series("du").unwrap();
    let z = history.scalar_series("z").unwrap();

    assert_eq!(du[0], 0.0);
    // Backward difference against the previous committed step
    for k in 1..times.len() {
        assert_abs_diff_eq!(du[k], (times[k] - h / 2.0).cos(), epsilon = 1e-5);
    }
    assert_abs_diff_eq!(*z.last().unwrap(), 2.0f64.sin(), epsilon = 2e-2);
}

#[test]
fn test_memory_feeds_integrator() {
    // x' = mem(x): every stage of step k sees x_k, so x_k = (1 + h)^k
    let h = 0.1;
    let model = Model::build("growth", |b| {
        b.add("mem", Memory::default(), &["x".into()], &["m".into()])?;
        b.add("x", Integrator::new(1.0), &["m".into()], &["x".into()])?;
        Ok(())
    })
    .unwrap();

    let mut sim = Simulator::with_config(model, Parameters::new(), config(1.0, h)).unwrap();
    let history = sim.run(&mut NoInputs).unwrap();
    let m = history.scalar_series("m").unwrap();
    let x = history.scalar_series("x").unwrap();

    assert_eq!(x.len(), 11);
    assert_eq!(m[0], 0.0);
    for k in 1..x.len() {
        assert_abs_diff_eq!(m[k], x[k - 1], epsilon = 1e-12);
        assert_abs_diff_eq!(x[k], (1.0 + h).powi(k as i32), epsilon = 1e-12);
    }
}

#[test]
fn test_delay_of_integrated_state() {
    let d = 0.25;
    let model = Model::build("ramp", |b| {
        b.add("one", Const::new(1.0), &[], &["one".into()])?;
        b.add("x", Integrator::new(0.0), &["one".into()], &["x".into()])?;
        b.add("d", Const::new(d), &[], &["d".into()])?;
        b.add("x0", Const::new(-1.0), &[], &["x0".into()])?;
        b.add("delay", Delay::default(), &["x".into(), "d".into(), "x0".into()], &["y".into()])?;
        Ok(())
    })
    .unwrap();

    let mut sim = Simulator::with_config(model, Parameters::new(), config(1.0, 0.1)).unwrap();
    let history = sim.run(&mut NoInputs).unwrap();
    let times = history.scalar_series(TIME_KEY).unwrap();
    let x = history.scalar_series("x").unwrap();
    let y = history.scalar_series("y").unwrap();

    for ((t, x), y) in times.iter().zip(&x).zip(&y) {
        assert_abs_diff_eq!(*x, *t, epsilon = 1e-12);
        if *t < d - 1e-9 {
            assert_eq!(*y, -1.0, "t = {}", t);
        } else {
            assert_abs_diff_eq!(*y, t - d, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_triggered_integrator_resets_after_trigger_step() {
    let model = Model::build("reset", |b| {
        b.add("one", Const::new(1.0), &[], &["one".into()])?;
        let pulse = |t: f64| Value::Scalar(if (t - 0.5).abs() < 1e-9 { 1.0 } else { 0.0 });
        b.add("pulse", Source::new(pulse), &[], &["reset".into()])?;
        b.add("x", TriggeredIntegrator::default(), &["one".into(), "reset".into()], &["x".into()])?;
        Ok(())
    })
    .unwrap();

    let mut sim = Simulator::with_config(model, Parameters::new(), config(1.0, 0.1)).unwrap();
    let history = sim.run(&mut NoInputs).unwrap();
    let x = history.scalar_series("x").unwrap();
    let expected = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.0, 0.1, 0.2, 0.3, 0.4];
    assert_eq!(x.len(), expected.len());
    for (x, e) in x.iter().zip(expected) {
        assert_abs_diff_eq!(*x, e, epsilon = 1e-12);
    }
}

#[test]
fn test_bus_memory_counter() {
    let initial = BusValue::new(vec!["next".to_string()], vec![Value::Scalar(0.0)]).unwrap();
    let model = Model::build("counter", |b| {
        b.add("pack", Bus::new(), &["next".into()], &["state".into()])?;
        b.add("mem", BusMemory::from_bus(initial), &["state".into()], &["prev".into()])?;
        b.add("pick", BusSelector::new(["next"]), &["prev".into()], &["count".into()])?;
        b.add("inc", AddSub::add().with_initial(1.0), &["count".into()], &["next".into()])?;
        Ok(())
    })
    .unwrap();

    let mut sim = Simulator::new(model, Parameters::new()).unwrap();
    let history = sim.run_over(&[0.0, 1.0, 2.0, 3.0], &mut NoInputs).unwrap();
    assert_eq!(history.scalar_series("count").unwrap(), vec![0.0, 1.0, 2.0, 3.0]);
}
