//! Network traffic counters summed over all interfaces.

use std::path::Path;

use super::{Probe, ProbeFailure, ProbeResult, Readings};
use crate::collector::procfs::parser::parse_net_dev;
use crate::collector::traits::FileSystem;

/// Interface counters from `/proc/net/dev`, summed over every interface
/// including loopback.
pub struct NetworkProbe<F: FileSystem> {
    fs: F,
    proc_path: String,
}

impl<F: FileSystem> NetworkProbe<F> {
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    fn read(&self) -> Result<Readings, ProbeFailure> {
        let content = self
            .fs
            .read_to_string(Path::new(&format!("{}/net/dev", self.proc_path)))?;
        let devices = parse_net_dev(&content)?;
        if devices.is_empty() {
            return Err(ProbeFailure::unavailable("no network interfaces"));
        }

        let (mut sent, mut recv, mut psent, mut precv) = (0u64, 0u64, 0u64, 0u64);
        for dev in &devices {
            sent = sent.saturating_add(dev.tx_bytes);
            recv = recv.saturating_add(dev.rx_bytes);
            psent = psent.saturating_add(dev.tx_packets);
            precv = precv.saturating_add(dev.rx_packets);
        }

        let mut r = Readings::new();
        r.set("net_bytes_sent", sent);
        r.set("net_bytes_recv", recv);
        r.set("net_packets_sent", psent);
        r.set("net_packets_recv", precv);
        Ok(r)
    }
}

impl<F: FileSystem> Probe for NetworkProbe<F> {
    fn name(&self) -> &'static str {
        "network"
    }

    fn fields(&self) -> Vec<String> {
        [
            "net_bytes_sent",
            "net_bytes_recv",
            "net_packets_sent",
            "net_packets_recv",
        ]
        .map(String::from)
        .to_vec()
    }

    fn sample(&mut self) -> ProbeResult {
        self.read().into()
    }
}
