//! Recorded signal trajectories.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::{Result, SimError};
use crate::signal::{Signal, Value, ValueMap};
use crate::TIME_KEY;

/// Time series of every recorded signal, one entry per recorded timestamp.
///
/// Series are keyed by the signal's qualified name. The reserved key
/// [`TIME_KEY`] names the time column.
#[derive(Debug, Clone, Default)]
pub struct History {
    times: Vec<f64>,
    series: BTreeMap<String, Vec<Value>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded timestamps.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Names of the recorded signals, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.series.get(name).map(Vec::as_slice)
    }

    /// Value of `name` at the last recorded timestamp.
    pub fn last(&self, name: &str) -> Option<&Value> {
        self.series.get(name).and_then(|s| s.last())
    }

    /// A scalar series as plain numbers. `TIME_KEY` returns the timestamps.
    ///
    /// Returns `None` if the signal was not recorded or is not scalar.
    pub fn scalar_series(&self, name: &str) -> Option<Vec<f64>> {
        if name == TIME_KEY {
            return Some(self.times.clone());
        }
        self.series
            .get(name)?
            .iter()
            .map(|v| v.as_scalar().ok())
            .collect()
    }

    /// Append the numeric values of `values` accepted by `keep` at time `t`.
    ///
    /// A signal that is absent at some timestamp gets a NaN entry of its
    /// usual shape, so every series stays aligned with the time column. A
    /// series keeps the shape of its first sample.
    pub fn record(&mut self, t: f64, values: &ValueMap, keep: impl Fn(&Signal) -> bool) -> Result<()> {
        if let Some(&previous) = self.times.last() {
            if t <= previous {
                return Err(SimError::NonMonotonicTime { t, previous });
            }
        }
        let kept: Vec<(String, &Value)> = values
            .iter()
            .filter(|(signal, value)| value.is_numeric() && keep(*signal))
            .map(|(signal, value)| (signal.to_string(), value))
            .collect();
        for (name, value) in &kept {
            if name == TIME_KEY {
                return Err(SimError::ReservedName {
                    name: name.clone(),
                    reason: "it names the time column of the history",
                });
            }
            if let Some(first) = self.series.get(name).and_then(|s| s.first()) {
                let (expected, actual) = (first.len()?, value.len()?);
                if expected != actual {
                    return Err(SimError::shape_mismatch(expected, actual));
                }
            }
        }

        let k = self.times.len();
        self.times.push(t);
        for (name, value) in kept {
            let series = self.series.entry(name).or_default();
            if series.len() < k {
                let filler = value.map(|_| f64::NAN)?;
                series.resize(k, filler);
            }
            series.push(value.clone());
        }

        for series in self.series.values_mut() {
            if series.len() == k {
                if let Some(last) = series.last() {
                    let filler = last.map(|_| f64::NAN)?;
                    series.push(filler);
                }
            }
        }
        Ok(())
    }

    /// Write the history as CSV: a [`TIME_KEY`] column, then one column per
    /// scalar signal and one per array element (`name[i]`).
    pub fn write_csv<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let columns: Vec<(&str, &[Value], usize)> = self
            .series
            .iter()
            .map(|(name, values)| {
                let width = match values.first() {
                    Some(Value::Array(a)) => a.len(),
                    _ => 1,
                };
                (name.as_str(), values.as_slice(), width)
            })
            .collect();

        let mut header = vec![TIME_KEY.to_string()];
        for (name, values, width) in &columns {
            if matches!(values.first(), Some(Value::Array(_))) {
                header.extend((0..*width).map(|i| format!("{}[{}]", name, i)));
            } else {
                header.push(name.to_string());
            }
        }
        writeln!(writer, "{}", header.join(","))?;

        let mut flat = Vec::new();
        for (k, t) in self.times.iter().enumerate() {
            write!(writer, "{}", t)?;
            for (name, values, width) in &columns {
                flat.clear();
                if let Some(v) = values.get(k) {
                    v.flatten_into(&mut flat)
                        .map_err(|e| io::Error::other(format!("{} at t = {}: {}", name, t, e)))?;
                    if flat.len() != *width {
                        return Err(io::Error::other(format!(
                            "{} at t = {}: {} element(s), column has {}",
                            name,
                            t,
                            flat.len(),
                            width
                        )));
                    }
                }
                for i in 0..*width {
                    match flat.get(i) {
                        Some(x) => write!(writer, ",{}", x)?,
                        None => write!(writer, ",")?,
                    }
                }
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Write the history as CSV to a file.
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let io_error = |source| SimError::Io {
            path: path.display().to_string(),
            source,
        };
        let file = File::create(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        self.write_csv(&mut writer).map_err(io_error)?;
        writer.flush().map_err(io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: Vec<(Signal, Value)>) -> ValueMap {
        let mut map = ValueMap::new();
        for (s, v) in pairs {
            map.insert(s, v).unwrap();
        }
        map
    }

    #[test]
    fn test_record_filters_and_aligns() {
        let mut history = History::new();
        let anon = Signal::Anonymous {
            scope: String::new(),
            serial: 0,
        };
        let step0 = map(vec![
            (Signal::named("x"), Value::Scalar(1.0)),
            (Signal::named("g"), Value::Scalar(9.81)),
            (anon.clone(), Value::Scalar(5.0)),
        ]);
        let keep = |s: &Signal| !s.is_anonymous() && s != &Signal::named("g");
        history.record(0.0, &step0, keep).unwrap();

        let step1 = map(vec![
            (Signal::named("x"), Value::Scalar(0.5)),
            (Signal::named("v"), Value::array(&[1.0, 2.0])),
        ]);
        history.record(0.1, &step1, keep).unwrap();

        assert_eq!(history.names().collect::<Vec<_>>(), vec!["v", "x"]);
        assert_eq!(history.scalar_series("x").unwrap(), vec![1.0, 0.5]);
        assert_eq!(history.scalar_series(TIME_KEY).unwrap(), vec![0.0, 0.1]);
        let v = history.get("v").unwrap();
        assert_eq!(v.len(), 2);
        assert!(v[0].as_array().unwrap()[0].is_nan());
        assert!(history.scalar_series("v").is_none());
    }

    #[test]
    fn test_record_rejects_repeated_time() {
        let mut history = History::new();
        let values = map(vec![(Signal::named("x"), Value::Scalar(1.0))]);
        history.record(1.0, &values, |_| true).unwrap();
        assert!(matches!(
            history.record(1.0, &values, |_| true),
            Err(SimError::NonMonotonicTime { .. })
        ));
    }

    #[test]
    fn test_write_csv_columns() {
        let mut history = History::new();
        let values = map(vec![
            (Signal::named("x"), Value::Scalar(1.5)),
            (Signal::named("p"), Value::array(&[1.0, 2.0])),
        ]);
        history.record(0.0, &values, |_| true).unwrap();

        let mut out = Vec::new();
        history.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "t,p[0],p[1],x");
        assert_eq!(lines[1], "0,1,2,1.5");
    }

    #[test]
    fn test_record_rejects_time_key_and_reshaping() {
        let mut history = History::new();
        let clash = map(vec![(Signal::named(TIME_KEY), Value::Scalar(1.0))]);
        assert!(matches!(
            history.record(0.0, &clash, |_| true),
            Err(SimError::ReservedName { .. })
        ));
        assert!(history.is_empty());

        history
            .record(0.0, &map(vec![(Signal::named("p"), Value::array(&[1.0, 2.0]))]), |_| true)
            .unwrap();
        let wider = map(vec![(Signal::named("p"), Value::array(&[1.0, 2.0, 3.0]))]);
        assert!(matches!(
            history.record(0.1, &wider, |_| true),
            Err(SimError::ShapeMismatch { expected: 2, actual: 3 })
        ));
        assert_eq!(history.len(), 1);
        assert_eq!(history.get("p").unwrap().len(), 1);
    }

    #[test]
    fn test_write_csv_rejects_ragged_series() {
        let mut history = History::new();
        history.times = vec![0.0, 0.1];
        history.series.insert(
            "p".to_string(),
            vec![Value::array(&[1.0, 2.0]), Value::array(&[1.0])],
        );
        let mut out = Vec::new();
        let err = history.write_csv(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);

        history.series.insert(
            "p".to_string(),
            vec![Value::Scalar(1.0), Value::Bus(crate::signal::BusValue::default())],
        );
        assert!(history.write_csv(&mut Vec::new()).is_err());
    }
}
