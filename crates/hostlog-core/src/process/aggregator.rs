//! Top-K process ranking.
//!
//! Raw per-process observations are ranked first and folded second: the K
//! highest instances are selected, then instances sharing a name are merged
//! by summing their values. Instances outside the raw top K never contribute
//! to a merged total.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use crate::collector::procfs::parser::{parse_kernel_stat, parse_meminfo};
use crate::collector::procfs::{CollectError, ParseError, ProcessReader, ProcessSample};
use crate::collector::traits::FileSystem;

/// Default number of raw candidates kept before folding.
pub const DEFAULT_TOP_K: usize = 10;

/// Aggregated usage for one process name.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessUsage {
    pub name: String,
    pub value: f64,
}

/// One process instance's share before folding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUsage {
    pub pid: u32,
    pub name: String,
    pub value: f64,
}

/// Both rankings from a single walk of the process table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rankings {
    pub by_cpu: Vec<ProcessUsage>,
    pub by_memory: Vec<ProcessUsage>,
}

/// Descending by value, ties by name ascending.
fn by_value_then_name(a_value: f64, a_name: &str, b_value: f64, b_name: &str) -> Ordering {
    b_value.total_cmp(&a_value).then_with(|| a_name.cmp(b_name))
}

/// Selects the `k` highest raw observations and merges them by name.
///
/// Output is sorted descending by merged value, ties by name ascending.
pub fn fold_top_k(mut raw: Vec<RawUsage>, k: usize) -> Vec<ProcessUsage> {
    raw.sort_by(|a, b| {
        by_value_then_name(a.value, &a.name, b.value, &b.name).then_with(|| a.pid.cmp(&b.pid))
    });
    raw.truncate(k);

    let mut totals: HashMap<String, f64> = HashMap::with_capacity(raw.len());
    for r in raw {
        *totals.entry(r.name).or_insert(0.0) += r.value;
    }

    let mut folded: Vec<ProcessUsage> = totals
        .into_iter()
        .map(|(name, value)| ProcessUsage { name, value })
        .collect();
    folded.sort_by(|a, b| by_value_then_name(a.value, &a.name, b.value, &b.name));
    folded
}

/// Ranks running processes by CPU-time share and by memory share.
///
/// CPU share needs two reads: the aggregator remembers each instance's
/// jiffies (keyed by `(pid, starttime)`, so a recycled PID starts fresh) and
/// the system total from the previous pass.
pub struct ProcessAggregator<F: FileSystem> {
    fs: F,
    reader: ProcessReader<F>,
    proc_path: String,
    k: usize,
    prev_ticks: HashMap<(u32, u64), u64>,
    prev_total: Option<u64>,
}

impl<F: FileSystem + Clone> ProcessAggregator<F> {
    pub fn new(fs: F, proc_path: impl Into<String>, k: usize) -> Self {
        let proc_path = proc_path.into();
        Self {
            reader: ProcessReader::new(fs.clone(), proc_path.clone()),
            fs,
            proc_path,
            k,
            prev_ticks: HashMap::new(),
            prev_total: None,
        }
    }
}

impl<F: FileSystem> ProcessAggregator<F> {
    pub fn top_k(&self) -> usize {
        self.k
    }

    fn read_file(&self, name: &str) -> Result<String, CollectError> {
        Ok(self
            .fs
            .read_to_string(Path::new(&format!("{}/{}", self.proc_path, name)))?)
    }

    fn total_jiffies(&self) -> Result<u64, CollectError> {
        let stat = parse_kernel_stat(&self.read_file("stat")?)?;
        stat.aggregate()
            .map(|c| c.total())
            .ok_or_else(|| ParseError::Missing("aggregate cpu line").into())
    }

    fn mem_total_bytes(&self) -> Result<u64, CollectError> {
        Ok(parse_meminfo(&self.read_file("meminfo")?)?.total_kb * 1024)
    }

    fn cpu_shares(&mut self, samples: &[ProcessSample]) -> Result<Vec<RawUsage>, CollectError> {
        let total = self.total_jiffies()?;
        let elapsed = match self.prev_total {
            Some(prev) => total.saturating_sub(prev),
            None => total,
        };

        let raw = samples
            .iter()
            .map(|s| {
                let prev = self.prev_ticks.get(&(s.pid, s.starttime)).copied();
                let used = s.cpu_ticks.saturating_sub(prev.unwrap_or(0));
                let value = if elapsed == 0 {
                    0.0
                } else {
                    used as f64 / elapsed as f64 * 100.0
                };
                RawUsage {
                    pid: s.pid,
                    name: s.name.clone(),
                    value,
                }
            })
            .collect();

        self.prev_ticks = samples
            .iter()
            .map(|s| ((s.pid, s.starttime), s.cpu_ticks))
            .collect();
        self.prev_total = Some(total);
        Ok(raw)
    }

    fn memory_shares(&self, samples: &[ProcessSample]) -> Result<Vec<RawUsage>, CollectError> {
        let mem_total = self.mem_total_bytes()? as f64;
        Ok(samples
            .iter()
            .map(|s| RawUsage {
                pid: s.pid,
                name: s.name.clone(),
                value: s.rss_bytes as f64 / mem_total * 100.0,
            })
            .collect())
    }

    /// Ranks by share of CPU time since the previous pass.
    pub fn rank_by_cpu(&mut self) -> Result<Vec<ProcessUsage>, CollectError> {
        let samples = self.reader.read_all()?;
        Ok(fold_top_k(self.cpu_shares(&samples)?, self.k))
    }

    /// Ranks by resident memory as a share of physical memory.
    pub fn rank_by_memory(&self) -> Result<Vec<ProcessUsage>, CollectError> {
        let samples = self.reader.read_all()?;
        Ok(fold_top_k(self.memory_shares(&samples)?, self.k))
    }

    /// Computes both rankings from one read of the process table.
    pub fn rank(&mut self) -> Result<Rankings, CollectError> {
        let samples = self.reader.read_all()?;
        let by_cpu = fold_top_k(self.cpu_shares(&samples)?, self.k);
        let by_memory = fold_top_k(self.memory_shares(&samples)?, self.k);
        Ok(Rankings { by_cpu, by_memory })
    }
}
