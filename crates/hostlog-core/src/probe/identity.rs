//! Host identity: hardware address, OS, architecture, hostname, IP.

use std::io;
use std::net::{IpAddr, UdpSocket};
use std::path::Path;

use super::{Probe, ProbeFailure, ProbeResult, Readings};
use crate::collector::traits::FileSystem;
use crate::platform::read_machine;

type IpLookup = Box<dyn Fn() -> io::Result<IpAddr>>;

/// Finds the address of the interface that carries the default route.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
pub fn local_ip() -> io::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("10.254.254.254:1")?;
    let ip = socket.local_addr()?.ip();
    if ip.is_unspecified() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "no routable address"));
    }
    Ok(ip)
}

pub struct IdentityProbe<F: FileSystem> {
    fs: F,
    proc_path: String,
    sys_path: String,
    ip_lookup: IpLookup,
}

impl<F: FileSystem> IdentityProbe<F> {
    pub fn new(fs: F, proc_path: impl Into<String>, sys_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            sys_path: sys_path.into(),
            ip_lookup: Box::new(local_ip),
        }
    }

    /// Replaces the IP address lookup (tests use a canned address).
    pub fn with_ip_lookup(mut self, lookup: impl Fn() -> io::Result<IpAddr> + 'static) -> Self {
        self.ip_lookup = Box::new(lookup);
        self
    }

    fn read_trimmed(&self, path: &str) -> Option<String> {
        self.fs
            .read_to_string(Path::new(path))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// MAC of the first non-loopback interface, by name order.
    fn mac_address(&self) -> Option<String> {
        let net_dir = format!("{}/class/net", self.sys_path);
        let mut interfaces = self.fs.read_dir(Path::new(&net_dir)).ok()?;
        interfaces.sort();

        interfaces
            .iter()
            .filter(|p| p.file_name().is_some_and(|n| n != "lo"))
            .filter_map(|p| self.read_trimmed(&format!("{}/address", p.display())))
            .find(|mac| mac != "00:00:00:00:00:00")
    }
}

impl<F: FileSystem> Probe for IdentityProbe<F> {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn fields(&self) -> Vec<String> {
        ["mac_address", "os_name", "machine", "hostname", "ip_address"]
            .map(String::from)
            .to_vec()
    }

    fn sample(&mut self) -> ProbeResult {
        let mut r = Readings::new();

        r.set_opt("mac_address", self.mac_address());
        r.set_opt(
            "os_name",
            self.read_trimmed(&format!("{}/sys/kernel/ostype", self.proc_path)),
        );
        r.set("machine", read_machine(&self.fs, &self.proc_path));
        r.set_opt(
            "hostname",
            self.read_trimmed(&format!("{}/sys/kernel/hostname", self.proc_path)),
        );
        r.set_opt("ip_address", (self.ip_lookup)().ok().map(|ip| ip.to_string()));

        if r.len() == 1 {
            // Only the compile-time fallback for `machine` came through.
            return ProbeResult::Failed(ProbeFailure::unavailable(
                "no identity sources readable",
            ));
        }
        ProbeResult::Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::sample::Value;
    use std::net::Ipv4Addr;

    fn probe(fs: MockFs) -> IdentityProbe<MockFs> {
        IdentityProbe::new(fs, "/proc", "/sys")
            .with_ip_lookup(|| Ok(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))))
    }

    #[test]
    fn test_identity_typical_system() {
        let ProbeResult::Ok(r) = probe(MockFs::typical_system()).sample() else {
            panic!("identity probe failed");
        };

        assert_eq!(r.get("mac_address"), Some(&Value::from("52:54:00:12:34:56")));
        assert_eq!(r.get("os_name"), Some(&Value::from("Linux")));
        assert_eq!(r.get("machine"), Some(&Value::from("x86_64")));
        assert_eq!(r.get("hostname"), Some(&Value::from("testhost")));
        assert_eq!(r.get("ip_address"), Some(&Value::from("192.168.1.20")));
    }

    #[test]
    fn test_identity_partial_when_ip_lookup_fails() {
        let mut p = probe(MockFs::typical_system())
            .with_ip_lookup(|| Err(io::Error::from(io::ErrorKind::NetworkUnreachable)));

        let ProbeResult::Ok(r) = p.sample() else {
            panic!("identity probe failed");
        };
        assert!(r.get("ip_address").is_none());
        assert!(r.get("hostname").is_some());
    }

    #[test]
    fn test_identity_skips_loopback_and_zero_mac() {
        let fs = MockFs::new();
        fs.add_file("/sys/class/net/lo/address", "00:00:00:00:00:00\n");
        fs.add_file("/sys/class/net/dummy0/address", "00:00:00:00:00:00\n");
        fs.add_file("/sys/class/net/wlan0/address", "b8:27:eb:aa:bb:cc\n");

        let p = probe(fs);
        assert_eq!(p.mac_address().as_deref(), Some("b8:27:eb:aa:bb:cc"));
    }

    #[test]
    fn test_identity_nothing_readable() {
        let mut p = IdentityProbe::new(MockFs::new(), "/proc", "/sys")
            .with_ip_lookup(|| Err(io::Error::from(io::ErrorKind::NotFound)));

        assert!(matches!(p.sample(), ProbeResult::Failed(_)));
    }
}
