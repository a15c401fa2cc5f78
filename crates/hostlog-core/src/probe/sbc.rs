//! Single-board computer probes (Raspberry Pi).
//!
//! Firmware readings come from `vcgencmd`; GPIO levels from `pinctrl` on
//! current OS images and `raspi-gpio` on older ones. Every command runs under
//! the configured timeout.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use tracing::debug;

use super::{FailureKind, Probe, ProbeFailure, ProbeResult, Readings};
use crate::collector::traits::CommandRunner;

/// `volt=1.2000V` → 1.2
pub(crate) fn parse_volts(output: &str) -> Option<f64> {
    output
        .trim()
        .strip_prefix("volt=")?
        .trim_end_matches('V')
        .parse()
        .ok()
}

/// `throttled=0x50005` → `0x50005`
pub(crate) fn parse_throttled(output: &str) -> Option<String> {
    let value = output.trim().strip_prefix("throttled=")?;
    value.starts_with("0x").then(|| value.to_string())
}

/// `ring_osc(1)=3.346MHz (@0.8000V) (50.5'C)` → 3.346
pub(crate) fn parse_ring_osc(output: &str) -> Option<f64> {
    let (_, rest) = output.trim().split_once('=')?;
    let (mhz, _) = rest.split_once("MHz")?;
    mhz.trim().parse().ok()
}

/// Line levels from `pinctrl get`:
///
/// ```text
///  2: ip    pu | hi // GPIO2 = input
/// 17: op dh pd | lo // GPIO17 = output
/// ```
pub(crate) fn parse_pinctrl(output: &str) -> HashMap<u8, u8> {
    output
        .lines()
        .filter_map(|line| {
            let (pin, rest) = line.trim().split_once(':')?;
            let pin = pin.trim().parse().ok()?;
            let (_, state) = rest.split_once('|')?;
            let level = match state.split_whitespace().next()? {
                "hi" => 1,
                "lo" => 0,
                _ => return None,
            };
            Some((pin, level))
        })
        .collect()
}

/// Line levels from `raspi-gpio get`:
///
/// ```text
/// GPIO 2: level=1 fsel=0 func=INPUT pull=UP
/// ```
pub(crate) fn parse_raspi_gpio(output: &str) -> HashMap<u8, u8> {
    output
        .lines()
        .filter_map(|line| {
            let (pin, rest) = line.trim().strip_prefix("GPIO")?.split_once(':')?;
            let pin = pin.trim().parse().ok()?;
            let level = rest
                .split_whitespace()
                .find_map(|kv| kv.strip_prefix("level="))?
                .parse()
                .ok()?;
            Some((pin, level))
        })
        .collect()
}

/// Picks the failure to report when every source failed: a timeout outranks
/// an error, which outranks plain absence.
fn worst(failures: Vec<ProbeFailure>) -> ProbeFailure {
    let rank = |f: &ProbeFailure| match f.kind {
        FailureKind::TimedOut => 2,
        FailureKind::Error => 1,
        FailureKind::Unavailable => 0,
    };
    failures
        .into_iter()
        .max_by_key(rank)
        .unwrap_or_else(|| ProbeFailure::unavailable("no sources"))
}

/// Core voltage, throttling flags and ring oscillator via `vcgencmd`.
pub struct SbcProbe<R: CommandRunner> {
    runner: R,
    timeout: Duration,
}

impl<R: CommandRunner> SbcProbe<R> {
    pub fn new(runner: R, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    fn vcgencmd(&self, args: &[&str]) -> Result<String, ProbeFailure> {
        self.runner
            .run("vcgencmd", args, self.timeout)
            .map_err(ProbeFailure::from)
    }
}

impl<R: CommandRunner> Probe for SbcProbe<R> {
    fn name(&self) -> &'static str {
        "sbc"
    }

    fn fields(&self) -> Vec<String> {
        ["sbc_core_volts", "sbc_throttled", "sbc_ring_osc_mhz"]
            .map(String::from)
            .to_vec()
    }

    fn sample(&mut self) -> ProbeResult {
        let mut r = Readings::new();
        let mut failures = Vec::new();

        match self.vcgencmd(&["measure_volts", "core"]) {
            Ok(out) => r.set_opt("sbc_core_volts", parse_volts(&out)),
            Err(e) => failures.push(e),
        }
        match self.vcgencmd(&["get_throttled"]) {
            Ok(out) => r.set_opt("sbc_throttled", parse_throttled(&out)),
            Err(e) => failures.push(e),
        }
        match self.vcgencmd(&["read_ring_osc"]) {
            Ok(out) => r.set_opt("sbc_ring_osc_mhz", parse_ring_osc(&out)),
            Err(e) => failures.push(e),
        }

        if r.is_empty() {
            if failures.is_empty() {
                return ProbeResult::Failed(ProbeFailure::error(
                    "unrecognised vcgencmd output",
                ));
            }
            return ProbeResult::Failed(worst(failures));
        }
        for f in &failures {
            debug!("vcgencmd partial failure: {}", f);
        }
        ProbeResult::Ok(r)
    }
}

/// GPIO header levels for the lines of the detected board.
///
/// A board whose revision is not in the table has no known lines; it gets a
/// single `gpio` field that is always absent.
pub struct GpioProbe<R: CommandRunner> {
    runner: R,
    timeout: Duration,
    lines: Vec<u8>,
}

impl<R: CommandRunner> GpioProbe<R> {
    pub fn new(runner: R, lines: &[u8], timeout: Duration) -> Self {
        Self {
            runner,
            timeout,
            lines: lines.to_vec(),
        }
    }

    fn read_levels(&self) -> Result<HashMap<u8, u8>, ProbeFailure> {
        match self.runner.run("pinctrl", &["get"], self.timeout) {
            Ok(out) => return Ok(parse_pinctrl(&out)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let out = self.runner.run("raspi-gpio", &["get"], self.timeout)?;
        Ok(parse_raspi_gpio(&out))
    }
}

impl<R: CommandRunner> Probe for GpioProbe<R> {
    fn name(&self) -> &'static str {
        "gpio"
    }

    fn fields(&self) -> Vec<String> {
        if self.lines.is_empty() {
            return vec!["gpio".to_string()];
        }
        self.lines.iter().map(|l| format!("gpio_{}", l)).collect()
    }

    fn sample(&mut self) -> ProbeResult {
        if self.lines.is_empty() {
            return ProbeResult::Failed(ProbeFailure::unavailable(
                "board revision not supported",
            ));
        }

        let levels = match self.read_levels() {
            Ok(levels) => levels,
            Err(e) => return ProbeResult::Failed(e),
        };

        let mut r = Readings::new();
        for line in &self.lines {
            r.set_opt(format!("gpio_{}", line), levels.get(line).map(|&v| v as u64));
        }
        if r.is_empty() {
            return ProbeResult::Failed(ProbeFailure::error("no header lines in gpio output"));
        }
        ProbeResult::Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockCommands;
    use crate::sample::Value;

    const TIMEOUT: Duration = Duration::from_secs(3);

    fn pi_commands() -> MockCommands {
        let cmds = MockCommands::new();
        cmds.respond("vcgencmd measure_volts core", "volt=1.2000V\n");
        cmds.respond("vcgencmd get_throttled", "throttled=0x50005\n");
        cmds.respond(
            "vcgencmd read_ring_osc",
            "ring_osc(1)=3.346MHz (@0.8000V) (50.5'C)\n",
        );
        cmds
    }

    #[test]
    fn test_parsers() {
        assert_eq!(parse_volts("volt=0.8500V\n"), Some(0.85));
        assert_eq!(parse_volts("error"), None);
        assert_eq!(parse_throttled("throttled=0x0"), Some("0x0".to_string()));
        assert_eq!(parse_throttled("throttled=bogus"), None);
        assert_eq!(parse_ring_osc("ring_osc(1)=3.346MHz (@0.8000V)"), Some(3.346));
    }

    #[test]
    fn test_sbc_probe_reads_vcgencmd() {
        let mut probe = SbcProbe::new(pi_commands(), TIMEOUT);
        let ProbeResult::Ok(r) = probe.sample() else {
            panic!("sbc probe failed");
        };

        assert_eq!(r.get("sbc_core_volts"), Some(&Value::Number(1.2)));
        assert_eq!(r.get("sbc_throttled"), Some(&Value::from("0x50005")));
        assert_eq!(r.get("sbc_ring_osc_mhz"), Some(&Value::Number(3.346)));
    }

    #[test]
    fn test_sbc_probe_partial_timeout_keeps_other_values() {
        let cmds = pi_commands();
        cmds.fail("vcgencmd read_ring_osc", io::ErrorKind::TimedOut);

        let ProbeResult::Ok(r) = SbcProbe::new(cmds, TIMEOUT).sample() else {
            panic!("sbc probe failed");
        };
        assert_eq!(r.len(), 2);
        assert!(r.get("sbc_ring_osc_mhz").is_none());
    }

    #[test]
    fn test_sbc_probe_reports_worst_failure() {
        let cmds = MockCommands::new();
        cmds.fail("vcgencmd get_throttled", io::ErrorKind::TimedOut);

        let ProbeResult::Failed(f) = SbcProbe::new(cmds, TIMEOUT).sample() else {
            panic!("expected failure");
        };
        assert_eq!(f.kind, FailureKind::TimedOut);

        let ProbeResult::Failed(f) = SbcProbe::new(MockCommands::new(), TIMEOUT).sample() else {
            panic!("expected failure");
        };
        assert_eq!(f.kind, FailureKind::Unavailable);
    }

    #[test]
    fn test_gpio_probe_pinctrl() {
        let cmds = MockCommands::new();
        cmds.respond(
            "pinctrl get",
            " 2: ip    pu | hi // GPIO2 = input\n 3: ip    pu | hi // GPIO3 = input\n17: op dh pd | lo // GPIO17 = output\n",
        );

        let mut probe = GpioProbe::new(cmds, &[2, 3, 17, 27], TIMEOUT);
        assert_eq!(probe.fields(), vec!["gpio_2", "gpio_3", "gpio_17", "gpio_27"]);

        let ProbeResult::Ok(r) = probe.sample() else {
            panic!("gpio probe failed");
        };
        assert_eq!(r.get("gpio_2"), Some(&Value::Number(1.0)));
        assert_eq!(r.get("gpio_17"), Some(&Value::Number(0.0)));
        assert!(r.get("gpio_27").is_none());
    }

    #[test]
    fn test_gpio_probe_falls_back_to_raspi_gpio() {
        let cmds = MockCommands::new();
        cmds.respond(
            "raspi-gpio get",
            "BANK0 (GPIO 0 to 27):\nGPIO 4: level=1 fsel=0 func=INPUT pull=UP\nGPIO 5: level=0 fsel=1 func=OUTPUT pull=DOWN\n",
        );

        let ProbeResult::Ok(r) = GpioProbe::new(cmds, &[4, 5], TIMEOUT).sample() else {
            panic!("gpio probe failed");
        };
        assert_eq!(r.get("gpio_4"), Some(&Value::Number(1.0)));
        assert_eq!(r.get("gpio_5"), Some(&Value::Number(0.0)));
    }

    #[test]
    fn test_gpio_probe_unsupported_board() {
        let mut probe = GpioProbe::new(MockCommands::new(), &[], TIMEOUT);

        assert_eq!(probe.fields(), vec!["gpio"]);
        let ProbeResult::Failed(f) = probe.sample() else {
            panic!("expected failure");
        };
        assert_eq!(f.kind, FailureKind::Unavailable);
    }

    #[test]
    fn test_gpio_probe_timeout_is_not_retried_with_fallback() {
        let cmds = MockCommands::new();
        cmds.fail("pinctrl get", io::ErrorKind::TimedOut);
        cmds.respond("raspi-gpio get", "GPIO 4: level=1 fsel=0 func=INPUT\n");

        let ProbeResult::Failed(f) = GpioProbe::new(cmds, &[4], TIMEOUT).sample() else {
            panic!("expected failure");
        };
        assert_eq!(f.kind, FailureKind::TimedOut);
    }
}
