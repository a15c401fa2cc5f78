//! Pre-built mock filesystem scenarios for testing.
//!
//! Each scenario is a realistic `/proc` + `/sys` tree for one kind of host:
//! a generic x86 server, a Raspberry Pi and an NVIDIA Jetson.

use super::filesystem::MockFs;
use crate::collector::traits::DiskUsage;

impl MockFs {
    /// Creates a typical x86_64 host with a few processes.
    ///
    /// Includes: init (PID 1), a bash shell (PID 1000) and sshd (PID 1001).
    pub fn typical_system() -> Self {
        let fs = Self::new();

        fs.add_file("/proc/sys/kernel/hostname", "testhost\n");
        fs.add_file("/proc/sys/kernel/ostype", "Linux\n");
        fs.add_file("/proc/sys/kernel/arch", "x86_64\n");

        // System-wide files
        fs.add_file("/proc/uptime", "183845.67 698765.43\n");
        fs.add_file("/proc/loadavg", "0.40 0.20 0.08 1/150 1234\n");
        fs.add_file(
            "/proc/self/status",
            "Name:\thostlogd\nState:\tR (running)\nVmHWM:\t    7168 kB\nVmRSS:\t    6144 kB\n",
        );
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12288000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:            0 kB
Active:          4096000 kB
Inactive:        2048000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
",
        );
        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
cpu2 2500 125 750 20000 250 50 25 0 0 0
cpu3 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
softirq 300000 10 20000 30 40000 5000 0 600 70000 0 164320
",
        );
        fs.add_file(
            "/proc/net/dev",
            "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 12345678     9876    0    0    0     0          0         0 12345678     9876    0    0    0     0       0          0
  eth0: 987654321   654321    5   10    0     0          0       100 123456789   456789    2    5    0     0       0          0
",
        );
        fs.add_file(
            "/proc/cpuinfo",
            "\
processor\t: 0
vendor_id\t: GenuineIntel
model name\t: Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz
cpu MHz\t\t: 2400.000

processor\t: 1
vendor_id\t: GenuineIntel
model name\t: Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz
cpu MHz\t\t: 2600.000
",
        );

        fs.add_file("/sys/class/net/lo/address", "00:00:00:00:00:00\n");
        fs.add_file("/sys/class/net/eth0/address", "52:54:00:12:34:56\n");
        fs.add_file("/sys/class/dmi/id/product_name", "Test Machine\n");

        // Per-core frequencies in kHz.
        for (cpu, cur) in [2_400_000, 2_600_000, 2_400_000, 2_600_000]
            .into_iter()
            .enumerate()
        {
            let base = format!("/sys/devices/system/cpu/cpu{}/cpufreq", cpu);
            fs.add_file(format!("{}/scaling_cur_freq", base), format!("{}\n", cur));
            fs.add_file(format!("{}/cpuinfo_min_freq", base), "800000\n");
            fs.add_file(format!("{}/cpuinfo_max_freq", base), "3600000\n");
        }

        fs.add_file("/sys/class/hwmon/hwmon0/name", "coretemp\n");
        fs.add_file("/sys/class/hwmon/hwmon0/temp1_input", "45000\n");
        fs.add_file("/sys/class/hwmon/hwmon0/temp1_label", "Package id 0\n");
        fs.add_file("/sys/class/hwmon/hwmon0/temp2_input", "42500\n");
        fs.add_file("/sys/class/hwmon/hwmon0/temp2_label", "Core 0\n");

        fs.set_disk_usage(
            "/",
            DiskUsage {
                total: 500_000_000_000,
                free: 200_000_000_000,
                available: 175_000_000_000,
            },
        );

        fs.add_process(1, "systemd", 500, 300, 1, 3000);
        fs.add_process(1000, "bash", 100, 50, 50_000, 2000);
        fs.add_process(1001, "sshd", 20, 10, 40_000, 1500);

        fs
    }

    /// Creates a Raspberry Pi 3 running a 64-bit kernel.
    ///
    /// `revision` lands in the `Revision` line of `/proc/cpuinfo`, so tests
    /// can exercise both known and unknown board codes.
    pub fn raspberry_pi(revision: &str) -> Self {
        let fs = Self::new();

        fs.add_file("/proc/sys/kernel/hostname", "raspberrypi\n");
        fs.add_file("/proc/sys/kernel/ostype", "Linux\n");
        fs.add_file("/proc/sys/kernel/arch", "aarch64\n");

        fs.add_file("/proc/uptime", "3600.50 13000.00\n");
        fs.add_file("/proc/loadavg", "1.20 0.80 0.40 2/210 4321\n");
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:         948304 kB
MemFree:          402116 kB
MemAvailable:     702544 kB
Buffers:           31396 kB
Cached:           301900 kB
Active:           210088 kB
",
        );
        fs.add_file(
            "/proc/stat",
            "\
cpu  4000 0 1000 35000 0 0 0 0 0 0
cpu0 1000 0 250 8750 0 0 0 0 0 0
cpu1 1000 0 250 8750 0 0 0 0 0 0
cpu2 1000 0 250 8750 0 0 0 0 0 0
cpu3 1000 0 250 8750 0 0 0 0 0 0
intr 250000 0 0 0
ctxt 120000
btime 1705305600
softirq 90000 0 0 0
",
        );
        fs.add_file(
            "/proc/net/dev",
            "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1000     10    0    0    0     0          0         0 1000     10    0    0    0     0       0          0
 wlan0: 500000   4000    0    0    0     0          0         0 250000   2000    0    0    0     0       0          0
",
        );
        fs.add_file(
            "/proc/cpuinfo",
            format!(
                "\
processor\t: 0
BogoMIPS\t: 38.40
Features\t: fp asimd evtstrm crc32 cpuid
CPU implementer\t: 0x41

Hardware\t: BCM2835
Revision\t: {revision}
Serial\t\t: 00000000a1b2c3d4
Model\t\t: Raspberry Pi 3 Model B Rev 1.2
"
            ),
        );
        fs.add_file(
            "/proc/device-tree/model",
            "Raspberry Pi 3 Model B Rev 1.2\0",
        );
        fs.add_file(
            "/proc/device-tree/compatible",
            "raspberrypi,3-model-b\0brcm,bcm2837\0",
        );

        fs.add_file("/sys/class/net/wlan0/address", "b8:27:eb:aa:bb:cc\n");
        fs.add_file("/sys/class/hwmon/hwmon0/name", "cpu_thermal\n");
        fs.add_file("/sys/class/hwmon/hwmon0/temp1_input", "51540\n");

        for cpu in 0..4 {
            let base = format!("/sys/devices/system/cpu/cpu{}/cpufreq", cpu);
            fs.add_file(format!("{}/scaling_cur_freq", base), "1200000\n");
            fs.add_file(format!("{}/cpuinfo_min_freq", base), "600000\n");
            fs.add_file(format!("{}/cpuinfo_max_freq", base), "1200000\n");
        }

        fs.set_disk_usage(
            "/",
            DiskUsage {
                total: 31_000_000_000,
                free: 24_000_000_000,
                available: 22_500_000_000,
            },
        );

        fs.add_process(1, "systemd", 150, 90, 1, 2500);
        fs.add_process(612, "python3", 900, 100, 2_000, 9000);

        fs
    }

    /// Creates an NVIDIA Jetson Xavier NX.
    pub fn jetson() -> Self {
        let fs = Self::new();

        fs.add_file(
            "/etc/nv_tegra_release",
            "# R32 (release), REVISION: 7.1, GCID: 29818004, BOARD: t186ref, EABI: aarch64\n",
        );

        fs.add_file("/proc/sys/kernel/hostname", "jetson-nx\n");
        fs.add_file("/proc/sys/kernel/ostype", "Linux\n");
        fs.add_file("/proc/sys/kernel/arch", "aarch64\n");

        fs.add_file("/proc/uptime", "7200.00 40000.00\n");
        fs.add_file("/proc/loadavg", "2.10 1.50 1.20 3/600 9999\n");
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:        7943400 kB
MemFree:         3800000 kB
MemAvailable:    5900000 kB
Buffers:          120000 kB
Cached:          1900000 kB
Active:          1500000 kB
",
        );
        fs.add_file(
            "/proc/stat",
            "\
cpu  9000 0 3000 60000 0 0 0 0 0 0
cpu0 1500 0 500 10000 0 0 0 0 0 0
cpu1 1500 0 500 10000 0 0 0 0 0 0
intr 800000 0 0
ctxt 900000
btime 1705300000
softirq 200000 0 0
",
        );
        fs.add_file(
            "/proc/net/dev",
            "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
  eth0: 2000000   3000    0    0    0     0          0         0 1000000   1500    0    0    0     0       0          0
",
        );
        fs.add_file(
            "/proc/cpuinfo",
            "processor\t: 0\nmodel name\t: ARMv8 Processor rev 0 (v8l)\n",
        );
        fs.add_file(
            "/proc/device-tree/compatible",
            "nvidia,p3509-0000+p3668-0001\0nvidia,tegra194\0",
        );
        fs.add_file(
            "/proc/device-tree/model",
            "NVIDIA Jetson Xavier NX Developer Kit\0",
        );

        fs.add_file("/sys/class/net/eth0/address", "48:b0:2d:01:02:03\n");

        // GPU devfreq node, frequencies in Hz.
        let gpu = "/sys/class/devfreq/17000000.gv11b";
        fs.add_file(format!("{}/cur_freq", gpu), "306000000\n");
        fs.add_file(format!("{}/min_freq", gpu), "114750000\n");
        fs.add_file(format!("{}/max_freq", gpu), "1109250000\n");

        fs.add_file("/sys/class/thermal/thermal_zone0/type", "CPU-therm\n");
        fs.add_file("/sys/class/thermal/thermal_zone0/temp", "43000\n");
        fs.add_file("/sys/class/thermal/thermal_zone1/type", "GPU-therm\n");
        fs.add_file("/sys/class/thermal/thermal_zone1/temp", "41500\n");

        for (cpu, cur) in [1_190_400, 1_420_800].into_iter().enumerate() {
            let base = format!("/sys/devices/system/cpu/cpu{}/cpufreq", cpu);
            fs.add_file(format!("{}/scaling_cur_freq", base), format!("{}\n", cur));
            fs.add_file(format!("{}/cpuinfo_min_freq", base), "115200\n");
            fs.add_file(format!("{}/cpuinfo_max_freq", base), "1907200\n");
        }

        fs.set_disk_usage(
            "/",
            DiskUsage {
                total: 64_000_000_000,
                free: 40_000_000_000,
                available: 37_000_000_000,
            },
        );

        fs.add_process(1, "systemd", 300, 200, 1, 3000);
        fs.add_process(2100, "inference", 40_000, 2_000, 5_000, 150_000);

        fs
    }
}
