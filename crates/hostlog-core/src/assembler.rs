//! Merges probe results into one fixed-shape sample.

use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::trace;

use crate::probe::{ProbeResult, ProbeSet};
use crate::sample::{Sample, Schema, SchemaError, TIMESTAMP_FIELD, Value};

/// Owns the probe set and the schema derived from it.
///
/// The schema is `timestamp` followed by every probe's declared fields in
/// probe order. It is fixed when the assembler is built.
pub struct Assembler {
    probes: ProbeSet,
    schema: Arc<Schema>,
}

impl Assembler {
    /// Fails if two probes declare the same field.
    pub fn new(probes: ProbeSet) -> Result<Self, SchemaError> {
        let mut fields = vec![TIMESTAMP_FIELD.to_string()];
        for (_, declared) in probes.declared() {
            fields.extend(declared.iter().cloned());
        }
        let schema = Arc::new(Schema::new(fields)?);
        Ok(Self { probes, schema })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn probes(&self) -> &ProbeSet {
        &self.probes
    }

    /// Samples every probe and stamps the record with the current time.
    pub fn assemble(&mut self) -> Sample {
        self.assemble_at(Local::now())
    }

    /// Samples every probe and stamps the record with `captured_at`.
    pub fn assemble_at(&mut self, captured_at: DateTime<Local>) -> Sample {
        let results = self.probes.sample_all();

        let mut values = Vec::with_capacity(self.schema.len());
        values.push(Value::Timestamp(captured_at));

        for ((name, declared), result) in self.probes.declared().zip(results) {
            match result {
                ProbeResult::Ok(mut readings) => {
                    for field in declared {
                        values.push(readings.take(field).unwrap_or(Value::Absent));
                    }
                    if !readings.is_empty() {
                        trace!(
                            "probe {} reported undeclared fields: {:?}",
                            name,
                            readings.field_names().collect::<Vec<_>>()
                        );
                    }
                }
                ProbeResult::Failed(_) => {
                    values.extend(std::iter::repeat_n(Value::Absent, declared.len()));
                }
            }
        }

        Sample::from_parts(Arc::clone(&self.schema), captured_at, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockCommands, MockFs};
    use crate::platform::PlatformDetector;
    use crate::probe::{Probe, ProbeConfig, ProbeFailure, Readings};
    use chrono::TimeZone;

    struct Scripted {
        name: &'static str,
        fields: &'static [&'static str],
        result: ProbeResult,
    }

    impl Probe for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn fields(&self) -> Vec<String> {
            self.fields.iter().map(|f| f.to_string()).collect()
        }

        fn sample(&mut self) -> ProbeResult {
            self.result.clone()
        }
    }

    fn readings(pairs: &[(&str, f64)]) -> ProbeResult {
        let mut r = Readings::new();
        for (k, v) in pairs {
            r.set(*k, *v);
        }
        ProbeResult::Ok(r)
    }

    struct Exploding;

    impl Probe for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn fields(&self) -> Vec<String> {
            vec!["x1".to_string(), "x2".to_string()]
        }

        fn sample(&mut self) -> ProbeResult {
            panic!("probe exploded");
        }
    }

    #[test]
    fn test_schema_starts_with_timestamp() {
        let mut set = ProbeSet::new();
        set.push(Box::new(Scripted {
            name: "a",
            fields: &["a1", "a2"],
            result: readings(&[]),
        }));
        let asm = Assembler::new(set).unwrap();

        assert_eq!(asm.schema().fields(), &["timestamp", "a1", "a2"]);
    }

    #[test]
    fn test_duplicate_fields_rejected() {
        let mut set = ProbeSet::new();
        for name in ["first", "second"] {
            set.push(Box::new(Scripted {
                name,
                fields: &["cpu_pct"],
                result: readings(&[]),
            }));
        }

        assert_eq!(
            Assembler::new(set).err(),
            Some(SchemaError::DuplicateField("cpu_pct".into()))
        );
    }

    #[test]
    fn test_failures_become_absent_without_touching_neighbours() {
        let mut set = ProbeSet::new();
        set.push(Box::new(Scripted {
            name: "good",
            fields: &["g1", "g2"],
            result: readings(&[("g1", 1.0), ("g2", 2.0), ("extra", 9.0)]),
        }));
        set.push(Box::new(Scripted {
            name: "bad",
            fields: &["b1"],
            result: ProbeResult::Failed(ProbeFailure::error("boom")),
        }));
        set.push(Box::new(Exploding));
        set.push(Box::new(Scripted {
            name: "partial",
            fields: &["p1", "p2"],
            result: readings(&[("p2", 5.0)]),
        }));

        let mut asm = Assembler::new(set).unwrap();
        let at = Local.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let sample = asm.assemble_at(at);

        assert_eq!(sample.values().len(), asm.schema().len());
        assert_eq!(sample.get("timestamp"), Some(&Value::Timestamp(at)));
        assert_eq!(sample.get("g1"), Some(&Value::Number(1.0)));
        assert_eq!(sample.get("g2"), Some(&Value::Number(2.0)));
        assert_eq!(sample.get("extra"), None);
        assert_eq!(sample.get("b1"), Some(&Value::Absent));
        assert_eq!(sample.get("x1"), Some(&Value::Absent));
        assert_eq!(sample.get("x2"), Some(&Value::Absent));
        assert_eq!(sample.get("p1"), Some(&Value::Absent));
        assert_eq!(sample.get("p2"), Some(&Value::Number(5.0)));
    }

    #[test]
    fn test_every_sample_matches_schema_on_real_probe_sets() {
        for fs in [
            MockFs::typical_system(),
            MockFs::raspberry_pi("a02082"),
            MockFs::raspberry_pi("ffffff"),
            MockFs::jetson(),
        ] {
            let profile = PlatformDetector::new(fs.clone(), "/proc", "/sys").detect();
            let set = ProbeSet::build(&profile, &ProbeConfig::default(), fs, MockCommands::new());
            let mut asm = Assembler::new(set).unwrap();

            for _ in 0..2 {
                let sample = asm.assemble();
                let names: Vec<&str> = sample.iter().map(|(k, _)| k).collect();
                let expected: Vec<&str> = asm.schema().fields().iter().map(String::as_str).collect();
                assert_eq!(names, expected);
            }
        }
    }

    #[test]
    fn test_unsupported_board_has_absent_gpio_field() {
        let fs = MockFs::raspberry_pi("ffffff");
        let profile = PlatformDetector::new(fs.clone(), "/proc", "/sys").detect();
        let set = ProbeSet::build(&profile, &ProbeConfig::default(), fs, MockCommands::new());
        let mut asm = Assembler::new(set).unwrap();

        let sample = asm.assemble();
        assert_eq!(sample.get("gpio"), Some(&Value::Absent));
        assert!(sample.get("gpio_2").is_none());
    }
}
