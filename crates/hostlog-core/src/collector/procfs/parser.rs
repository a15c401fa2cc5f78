//! Text parsers for the `/proc` files hostlog reads.
//!
//! No I/O happens here: every function takes the file content as a string,
//! so each format can be pinned down with literal fixtures in tests.

use thiserror::Error;

/// A `/proc` file whose content does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{0} not found")]
    Missing(&'static str),
    #[error("invalid {field}: {value:?}")]
    Invalid { field: &'static str, value: String },
}

impl ParseError {
    fn invalid(field: &'static str, value: &str) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
        }
    }
}

fn number<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, ParseError> {
    raw.parse().map_err(|_| ParseError::invalid(field, raw))
}

/// The parts of `/proc/<pid>/stat` used for ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    /// User-mode jiffies.
    pub utime: u64,
    /// Kernel-mode jiffies.
    pub stime: u64,
    /// Jiffies after boot at which the process started.
    pub starttime: u64,
    /// Resident pages. The kernel prints it signed.
    pub rss: i64,
}

/// Parses `/proc/<pid>/stat`.
///
/// `comm` is wrapped in parentheses and may itself contain spaces or `)`, so
/// the split happens at the last `)` on the line.
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let (head, tail) = content
        .trim()
        .rsplit_once(')')
        .ok_or(ParseError::Missing("closing ')' after comm"))?;
    let (pid, comm) = head
        .split_once('(')
        .ok_or(ParseError::Missing("opening '(' before comm"))?;

    // tail starts at `state`, which is field 3 in proc(5) numbering.
    let rest: Vec<&str> = tail.split_whitespace().collect();
    let field = |n: usize, name: &'static str| {
        rest.get(n - 3)
            .copied()
            .ok_or(ParseError::Missing(name))
    };

    Ok(ProcStat {
        pid: number("pid", pid.trim())?,
        comm: comm.to_string(),
        utime: number("utime", field(14, "utime")?)?,
        stime: number("stime", field(15, "stime")?)?,
        starttime: number("starttime", field(22, "starttime")?)?,
        rss: number("rss", field(24, "rss")?)?,
    })
}

/// `/proc/meminfo` figures, in kB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub available_kb: u64,
    pub active_kb: u64,
}

/// Parses `/proc/meminfo`.
///
/// Kernels older than 3.14 lack `MemAvailable`; it is then estimated as
/// `MemFree + Buffers + Cached`.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, ParseError> {
    let mut total = None;
    let mut available = None;
    let mut active = 0;
    let mut reclaimable = 0;

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kb) = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };
        match key {
            "MemTotal" => total = Some(kb),
            "MemAvailable" => available = Some(kb),
            "Active" => active = kb,
            "MemFree" | "Buffers" | "Cached" => reclaimable += kb,
            _ => {}
        }
    }

    let total_kb = total
        .filter(|&t| t > 0)
        .ok_or(ParseError::Missing("MemTotal"))?;
    Ok(MemInfo {
        total_kb,
        available_kb: available.unwrap_or(reclaimable),
        active_kb: active,
    })
}

/// Resident memory of a process, from `/proc/<pid>/status`, in kB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusMemory {
    /// `VmRSS`.
    pub rss_kb: u64,
    /// `VmHWM`, the resident high-water mark.
    pub peak_kb: u64,
}

/// Parses the memory lines of `/proc/<pid>/status`.
///
/// Kernel threads have no `VmRSS`. A missing `VmHWM` falls back to the
/// current RSS.
pub fn parse_status_memory(content: &str) -> Result<StatusMemory, ParseError> {
    let mut rss = None;
    let mut peak = None;

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let value = rest.split_whitespace().next().unwrap_or_default();
        match key {
            "VmRSS" => rss = Some(number("VmRSS", value)?),
            "VmHWM" => peak = Some(number("VmHWM", value)?),
            _ => {}
        }
    }

    let rss_kb = rss.ok_or(ParseError::Missing("VmRSS"))?;
    Ok(StatusMemory {
        rss_kb,
        peak_kb: peak.unwrap_or(rss_kb).max(rss_kb),
    })
}

/// Jiffy counters of one `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    /// `None` for the aggregate `cpu` line.
    pub id: Option<u32>,
    /// user, nice, system, idle, iowait, irq, softirq, steal. Guest time is
    /// already part of user and nice.
    pub ticks: [u64; 8],
}

impl CpuTimes {
    const IDLE: usize = 3;
    const IOWAIT: usize = 4;

    pub fn total(&self) -> u64 {
        self.ticks.iter().sum()
    }

    /// Idle plus I/O wait.
    pub fn idle_all(&self) -> u64 {
        self.ticks[Self::IDLE] + self.ticks[Self::IOWAIT]
    }
}

/// System-wide counters from `/proc/stat`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelStat {
    pub cpus: Vec<CpuTimes>,
    /// Interrupts since boot (first column of `intr`).
    pub intr: u64,
    /// Soft interrupts since boot (first column of `softirq`).
    pub softirq: u64,
    /// Context switches since boot.
    pub ctxt: u64,
    /// Boot time, seconds since the epoch.
    pub btime: u64,
}

impl KernelStat {
    pub fn aggregate(&self) -> Option<&CpuTimes> {
        self.cpus.iter().find(|c| c.id.is_none())
    }

    /// Number of per-CPU lines.
    pub fn cpu_count(&self) -> usize {
        self.cpus.iter().filter(|c| c.id.is_some()).count()
    }
}

/// Parses `/proc/stat`. Unknown lines are ignored; missing counters read 0.
pub fn parse_kernel_stat(content: &str) -> Result<KernelStat, ParseError> {
    let mut stat = KernelStat::default();

    for line in content.lines() {
        let mut words = line.split_whitespace();
        let Some(key) = words.next() else {
            continue;
        };

        if let Some(suffix) = key.strip_prefix("cpu") {
            let id = if suffix.is_empty() {
                None
            } else {
                Some(number("cpu id", suffix)?)
            };
            let mut ticks = [0u64; 8];
            for (slot, word) in ticks.iter_mut().zip(words) {
                *slot = word.parse().unwrap_or(0);
            }
            stat.cpus.push(CpuTimes { id, ticks });
            continue;
        }

        let first = words.next().and_then(|w| w.parse().ok()).unwrap_or(0);
        match key {
            "intr" => stat.intr = first,
            "softirq" => stat.softirq = first,
            "ctxt" => stat.ctxt = first,
            "btime" => stat.btime = first,
            _ => {}
        }
    }

    if stat.cpus.is_empty() {
        return Err(ParseError::Missing("cpu lines"));
    }
    Ok(stat)
}

/// Run-queue averages from `/proc/loadavg`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadAvg {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Parses `/proc/loadavg` (`0.40 0.20 0.08 1/123 4567`).
pub fn parse_loadavg(content: &str) -> Result<LoadAvg, ParseError> {
    let mut words = content.split_whitespace();
    let mut next = |name: &'static str| -> Result<f64, ParseError> {
        number(name, words.next().ok_or(ParseError::Missing(name))?)
    };
    Ok(LoadAvg {
        one: next("1 minute load")?,
        five: next("5 minute load")?,
        fifteen: next("15 minute load")?,
    })
}

/// Parses `/proc/uptime` and returns seconds since boot.
pub fn parse_uptime(content: &str) -> Result<f64, ParseError> {
    let first = content
        .split_whitespace()
        .next()
        .ok_or(ParseError::Missing("uptime"))?;
    number("uptime", first)
}

/// Traffic counters of one interface in `/proc/net/dev`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
}

/// Parses `/proc/net/dev`. The two header lines and short lines are skipped.
///
/// ```text
///   eth0: 987654 4321 0 0 0 0 0 0 123456 2100 0 0 0 0 0 0
/// ```
pub fn parse_net_dev(content: &str) -> Result<Vec<InterfaceCounters>, ParseError> {
    let interfaces = content
        .lines()
        .filter(|line| !line.contains('|'))
        .filter_map(|line| {
            let (name, counters) = line.split_once(':')?;
            let counters: Vec<u64> = counters
                .split_whitespace()
                .map(|c| c.parse().unwrap_or(0))
                .collect();
            (counters.len() >= 10).then(|| InterfaceCounters {
                name: name.trim().to_string(),
                rx_bytes: counters[0],
                rx_packets: counters[1],
                tx_bytes: counters[8],
                tx_packets: counters[9],
            })
        })
        .collect();
    Ok(interfaces)
}

/// Board identification lines from `/proc/cpuinfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardInfo {
    /// `Hardware` line (e.g. `BCM2835`).
    pub hardware: Option<String>,
    /// `Revision` line (e.g. `a02082`).
    pub revision: Option<String>,
    /// `Model` line (e.g. `Raspberry Pi 3 Model B Rev 1.2`).
    pub model: Option<String>,
}

/// Extracts the board identification lines from `/proc/cpuinfo`.
///
/// x86 hosts carry none of these lines, which yields an empty `BoardInfo`.
pub fn parse_cpuinfo_board(content: &str) -> BoardInfo {
    let mut info = BoardInfo::default();

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "Hardware" => info.hardware = Some(value.to_string()),
            "Revision" => info.revision = Some(value.to_string()),
            "Model" => info.model = Some(value.to_string()),
            _ => {}
        }
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;

    const SSHD_STAT: &str = "812 (sshd) S 1 812 812 0 -1 4194560 1450 9021 3 12 \
        37 21 40 18 20 0 1 0 2460 15212544 1893 18446744073709551615 1 1 0 0 0 0 \
        0 4096 81925 0 0 0 17 3 0 0 0 0 0\n";

    #[test]
    fn test_proc_stat_fields() {
        let stat = parse_proc_stat(SSHD_STAT).unwrap();
        assert_eq!(
            stat,
            ProcStat {
                pid: 812,
                comm: "sshd".to_string(),
                utime: 37,
                stime: 21,
                starttime: 2460,
                rss: 1893,
            }
        );
    }

    #[test]
    fn test_proc_stat_comm_with_spaces_and_parens() {
        let line = SSHD_STAT.replace("(sshd)", "(kworker/0:1 (events))");
        let stat = parse_proc_stat(&line).unwrap();
        assert_eq!(stat.comm, "kworker/0:1 (events)");
        assert_eq!(stat.utime, 37);
    }

    #[test]
    fn test_proc_stat_rejects_truncated_line() {
        assert_eq!(
            parse_proc_stat("812 (sshd) S 1 812"),
            Err(ParseError::Missing("utime"))
        );
        assert!(matches!(
            parse_proc_stat("sshd S 1"),
            Err(ParseError::Missing(_))
        ));
        assert!(matches!(
            parse_proc_stat(&SSHD_STAT.replace("812 (", "x (")),
            Err(ParseError::Invalid { field: "pid", .. })
        ));
    }

    #[test]
    fn test_meminfo() {
        let content = "MemTotal:        8046512 kB\n\
                       MemFree:          612340 kB\n\
                       MemAvailable:    5120400 kB\n\
                       Buffers:          201100 kB\n\
                       Cached:          3900210 kB\n\
                       Active:          2700000 kB\n\
                       Active(anon):     800000 kB\n";
        let info = parse_meminfo(content).unwrap();
        assert_eq!(info.total_kb, 8046512);
        assert_eq!(info.available_kb, 5120400);
        assert_eq!(info.active_kb, 2700000);
    }

    #[test]
    fn test_meminfo_estimates_available_on_old_kernels() {
        let content = "MemTotal: 1000 kB\nMemFree: 100 kB\nBuffers: 20 kB\nCached: 300 kB\n";
        assert_eq!(parse_meminfo(content).unwrap().available_kb, 420);
        assert_eq!(
            parse_meminfo("MemFree: 100 kB\n"),
            Err(ParseError::Missing("MemTotal"))
        );
    }

    #[test]
    fn test_status_memory() {
        let content = "Name:\thostlogd\nState:\tS (sleeping)\n\
                       VmPeak:\t  120340 kB\nVmHWM:\t    9876 kB\n\
                       VmRSS:\t    8120 kB\nThreads:\t2\n";
        assert_eq!(
            parse_status_memory(content).unwrap(),
            StatusMemory {
                rss_kb: 8120,
                peak_kb: 9876,
            }
        );

        let no_hwm = parse_status_memory("VmRSS:\t  512 kB\n").unwrap();
        assert_eq!(no_hwm.peak_kb, 512);

        assert_eq!(
            parse_status_memory("Name:\tkthreadd\n"),
            Err(ParseError::Missing("VmRSS"))
        );
        assert!(matches!(
            parse_status_memory("VmRSS:\t lots kB\n"),
            Err(ParseError::Invalid { field: "VmRSS", .. })
        ));
    }

    #[test]
    fn test_kernel_stat() {
        let content = "cpu  4000 100 900 30000 500 50 40 10 0 0\n\
                       cpu0 2000 50 450 15000 250 25 20 5 0 0\n\
                       cpu1 2000 50 450 15000 250 25 20 5 0 0\n\
                       intr 812345 30 0 9\n\
                       ctxt 1234567\n\
                       btime 1710000000\n\
                       softirq 45678 1 2 3\n";
        let stat = parse_kernel_stat(content).unwrap();

        assert_eq!(stat.cpu_count(), 2);
        let all = stat.aggregate().unwrap();
        assert_eq!(all.total(), 35600);
        assert_eq!(all.idle_all(), 30500);
        assert_eq!(stat.cpus[2].id, Some(1));
        assert_eq!(stat.intr, 812345);
        assert_eq!(stat.softirq, 45678);
        assert_eq!(stat.ctxt, 1234567);
        assert_eq!(stat.btime, 1710000000);
    }

    #[test]
    fn test_kernel_stat_short_cpu_line_and_no_cpus() {
        // pre-2.6.11 kernels stop after irq/softirq
        let stat = parse_kernel_stat("cpu 10 0 5 85\n").unwrap();
        assert_eq!(stat.aggregate().unwrap().total(), 100);
        assert_eq!(
            parse_kernel_stat("ctxt 5\n"),
            Err(ParseError::Missing("cpu lines"))
        );
    }

    #[test]
    fn test_loadavg_and_uptime() {
        let load = parse_loadavg("1.25 0.75 0.50 2/311 9120\n").unwrap();
        assert_eq!(
            load,
            LoadAvg {
                one: 1.25,
                five: 0.75,
                fifteen: 0.5
            }
        );
        assert!(parse_loadavg("1.25 0.75").is_err());

        assert_eq!(parse_uptime("3600.50 14000.00\n"), Ok(3600.5));
        assert!(parse_uptime("").is_err());
    }

    #[test]
    fn test_net_dev() {
        let content = "Inter-|   Receive                            |  Transmit\n \
            face |bytes packets errs drop fifo frame compressed multicast|bytes packets errs drop fifo colls carrier compressed\n    \
            lo:  5000 50 0 0 0 0 0 0  5000 50 0 0 0 0 0 0\n  \
            wlan0: 987654 4321 0 0 0 0 0 0 123456 2100 0 0 0 0 0 0\n";
        let ifaces = parse_net_dev(content).unwrap();

        assert_eq!(ifaces.len(), 2);
        assert_eq!(ifaces[1].name, "wlan0");
        assert_eq!(ifaces[1].rx_bytes, 987654);
        assert_eq!(ifaces[1].rx_packets, 4321);
        assert_eq!(ifaces[1].tx_bytes, 123456);
        assert_eq!(ifaces[1].tx_packets, 2100);
    }

    #[test]
    fn test_cpuinfo_board() {
        let content = "processor\t: 0\nmodel name\t: ARMv7 Processor rev 4 (v7l)\n\n\
                       Hardware\t: BCM2835\nRevision\t: a02082\n\
                       Model\t\t: Raspberry Pi 3 Model B Rev 1.2\n";
        let board = parse_cpuinfo_board(content);
        assert_eq!(board.hardware.as_deref(), Some("BCM2835"));
        assert_eq!(board.revision.as_deref(), Some("a02082"));
        assert_eq!(
            board.model.as_deref(),
            Some("Raspberry Pi 3 Model B Rev 1.2")
        );

        assert_eq!(parse_cpuinfo_board("processor : 0\n"), BoardInfo::default());
    }
}
