//! Process rankings folded into fixed per-name slots.

use super::{Probe, ProbeResult, Readings, round};
use crate::collector::traits::FileSystem;
use crate::process::{ProcessAggregator, ProcessUsage};

/// Top-K process slots by CPU share and by memory share.
///
/// There are always K slots per ranking; slots past the end of a short
/// ranking are left unreported and become absent.
pub struct ProcessProbe<F: FileSystem> {
    aggregator: ProcessAggregator<F>,
}

impl<F: FileSystem> ProcessProbe<F> {
    pub fn new(aggregator: ProcessAggregator<F>) -> Self {
        Self { aggregator }
    }

    fn fill(r: &mut Readings, prefix: &str, usage: &[ProcessUsage], k: usize) {
        for (i, u) in usage.iter().take(k).enumerate() {
            r.set(format!("{}_{}_name", prefix, i + 1), u.name.as_str());
            r.set(format!("{}_{}_pct", prefix, i + 1), round(u.value, 2));
        }
    }
}

impl<F: FileSystem> Probe for ProcessProbe<F> {
    fn name(&self) -> &'static str {
        "processes"
    }

    fn fields(&self) -> Vec<String> {
        let k = self.aggregator.top_k();
        let mut fields = Vec::with_capacity(k * 4);
        for prefix in ["top_cpu", "top_mem"] {
            for i in 1..=k {
                fields.push(format!("{}_{}_name", prefix, i));
                fields.push(format!("{}_{}_pct", prefix, i));
            }
        }
        fields
    }

    fn sample(&mut self) -> ProbeResult {
        let rankings = match self.aggregator.rank() {
            Ok(r) => r,
            Err(e) => return ProbeResult::Failed(e.into()),
        };

        let k = self.aggregator.top_k();
        let mut r = Readings::new();
        Self::fill(&mut r, "top_cpu", &rankings.by_cpu, k);
        Self::fill(&mut r, "top_mem", &rankings.by_memory, k);
        ProbeResult::Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::sample::Value;

    #[test]
    fn test_process_probe_fields() {
        let probe = ProcessProbe::new(ProcessAggregator::new(MockFs::new(), "/proc", 2));
        assert_eq!(
            probe.fields(),
            vec![
                "top_cpu_1_name",
                "top_cpu_1_pct",
                "top_cpu_2_name",
                "top_cpu_2_pct",
                "top_mem_1_name",
                "top_mem_1_pct",
                "top_mem_2_name",
                "top_mem_2_pct",
            ]
        );
    }

    #[test]
    fn test_process_probe_fills_slots_in_rank_order() {
        let agg = ProcessAggregator::new(MockFs::typical_system(), "/proc", 5);
        let ProbeResult::Ok(r) = ProcessProbe::new(agg).sample() else {
            panic!("process probe failed");
        };

        assert_eq!(r.get("top_cpu_1_name"), Some(&Value::from("systemd")));
        assert_eq!(r.get("top_cpu_1_pct"), Some(&Value::Number(0.84)));
        assert_eq!(r.get("top_mem_3_name"), Some(&Value::from("sshd")));
        // only three processes for five slots
        assert!(r.get("top_cpu_4_name").is_none());
        assert_eq!(r.len(), 12);
    }

    #[test]
    fn test_process_probe_without_proc_is_unavailable() {
        let agg = ProcessAggregator::new(MockFs::new(), "/proc", 3);
        let ProbeResult::Failed(f) = ProcessProbe::new(agg).sample() else {
            panic!("expected failure");
        };
        assert_eq!(f.kind, crate::probe::FailureKind::Unavailable);
    }
}
