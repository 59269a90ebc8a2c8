//! Process and host resource sampling.
//!
//! [`SystemSampler::sample`] returns an immutable [`MetricsSnapshot`]. CPU
//! percentages are computed over the interval since the previous sample
//! taken by the same sampler:
//!
//! ```text
//! percent = round(delta_cpu_ms / elapsed_ms * 100)
//! ```
//!
//! The first sample is measured against the baseline captured when the
//! sampler was built, so its percentages cover everything the process did in
//! between (including startup). Zero elapsed time reports 0%.

use opentelemetry::KeyValue;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

use super::metrics::record_memory_rss;
use super::span::{add_attributes, record_event};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Resident memory above which the service reports `memoryStatus = "high"`.
pub const MEMORY_WARNING_MB: u64 = 500;
/// One-minute load average above which the service reports `cpuStatus = "high"`.
pub const LOAD_WARNING: f64 = 2.0;

/// Cumulative CPU time consumed by the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuUsage {
    pub user_micros: u64,
    pub system_micros: u64,
}

/// Process memory figures in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub rss: u64,
    pub heap_used: u64,
    pub heap_total: u64,
    /// Resident pages shared with other processes (mapped files, libraries).
    pub external: u64,
    pub virtual_size: u64,
}

/// Host-level facts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HostInfo {
    pub uptime_secs: u64,
    pub free_memory: u64,
    pub total_memory: u64,
    pub load_average: [f64; 3],
    pub cores: usize,
}

/// Source of raw resource readings.
pub trait ResourceProbe: Send + Sync + 'static {
    fn cpu_usage(&self) -> CpuUsage;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn memory(&self) -> MemoryUsage;

    fn host(&self) -> HostInfo;
}

/// Reads the running process and host through the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProbe;

impl ResourceProbe for OsProbe {
    fn cpu_usage(&self) -> CpuUsage {
        os::cpu_usage()
    }

    fn memory(&self) -> MemoryUsage {
        os::memory()
    }

    fn host(&self) -> HostInfo {
        os::host()
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    pub rss_mb: u64,
    pub heap_used_mb: u64,
    pub heap_total_mb: u64,
    pub external_mb: u64,
    pub virtual_mb: u64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CpuSnapshot {
    /// User CPU time since process start.
    pub user_ms: u64,
    /// System CPU time since process start.
    pub system_ms: u64,
    pub user_percent: i64,
    pub system_percent: i64,
    pub total_percent: i64,
    pub load_average: [f64; 3],
    pub cores: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostSnapshot {
    pub platform: &'static str,
    pub arch: &'static str,
    pub uptime_secs: u64,
    pub free_memory_mb: u64,
    pub total_memory_mb: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub uptime_secs: u64,
    pub version: &'static str,
    pub title: String,
}

/// One sample of process and host resource usage.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub memory: MemorySnapshot,
    pub cpu: CpuSnapshot,
    pub system: HostSnapshot,
    pub process: ProcessSnapshot,
}

/// Coarse health verdict derived from a snapshot.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthAssessment {
    pub status: &'static str,
    pub memory_status: &'static str,
    pub cpu_status: &'static str,
}

impl MetricsSnapshot {
    pub fn health(&self) -> HealthAssessment {
        let memory_ok = self.memory.rss_mb < MEMORY_WARNING_MB;
        let cpu_ok = self.cpu.load_average[0] < LOAD_WARNING;
        HealthAssessment {
            status: if memory_ok && cpu_ok { "healthy" } else { "warning" },
            memory_status: if memory_ok { "ok" } else { "high" },
            cpu_status: if cpu_ok { "ok" } else { "high" },
        }
    }

    /// Resident memory as a share of host memory.
    pub fn memory_usage_percent(&self) -> i64 {
        if self.system.total_memory_mb == 0 {
            return 0;
        }
        (self.memory.rss_mb as f64 / self.system.total_memory_mb as f64 * 100.0).round() as i64
    }
}

#[derive(Debug, Clone, Copy)]
struct CpuBaseline {
    usage: CpuUsage,
    at: Instant,
}

/// Samples resource usage, tracking the previous CPU reading between calls.
///
/// Safe to share across tasks: reading the counters, computing the delta and
/// replacing the baseline happen under one lock.
#[derive(Debug)]
pub struct SystemSampler<P: ResourceProbe = OsProbe> {
    probe: P,
    baseline: Mutex<CpuBaseline>,
    started_at: Instant,
}

impl SystemSampler<OsProbe> {
    pub fn new() -> Self {
        Self::with_probe(OsProbe)
    }
}

impl Default for SystemSampler<OsProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ResourceProbe> SystemSampler<P> {
    /// Build a sampler over `probe`, capturing the initial CPU baseline.
    pub fn with_probe(probe: P) -> Self {
        let baseline = CpuBaseline {
            usage: probe.cpu_usage(),
            at: probe.now(),
        };
        Self {
            started_at: baseline.at,
            baseline: Mutex::new(baseline),
            probe,
        }
    }

    /// Take a snapshot and make it the baseline for the next one.
    pub fn sample(&self) -> MetricsSnapshot {
        let (usage, now, user_percent, system_percent, total_percent) = {
            let mut baseline = self.baseline.lock();
            let usage = self.probe.cpu_usage();
            let now = self.probe.now();
            let elapsed = now.saturating_duration_since(baseline.at);

            let user_delta = usage.user_micros.saturating_sub(baseline.usage.user_micros);
            let system_delta = usage
                .system_micros
                .saturating_sub(baseline.usage.system_micros);

            *baseline = CpuBaseline { usage, at: now };
            (
                usage,
                now,
                percent(user_delta, elapsed),
                percent(system_delta, elapsed),
                percent(user_delta + system_delta, elapsed),
            )
        };

        let memory = self.probe.memory();
        let host = self.probe.host();

        let snapshot = MetricsSnapshot {
            memory: MemorySnapshot {
                rss_mb: to_mb(memory.rss),
                heap_used_mb: to_mb(memory.heap_used),
                heap_total_mb: to_mb(memory.heap_total),
                external_mb: to_mb(memory.external),
                virtual_mb: to_mb(memory.virtual_size),
            },
            cpu: CpuSnapshot {
                user_ms: (usage.user_micros as f64 / 1000.0).round() as u64,
                system_ms: (usage.system_micros as f64 / 1000.0).round() as u64,
                user_percent,
                system_percent,
                total_percent,
                load_average: host.load_average,
                cores: host.cores,
            },
            system: HostSnapshot {
                platform: std::env::consts::OS,
                arch: std::env::consts::ARCH,
                uptime_secs: host.uptime_secs,
                free_memory_mb: to_mb(host.free_memory),
                total_memory_mb: to_mb(host.total_memory),
            },
            process: ProcessSnapshot {
                pid: std::process::id(),
                uptime_secs: now.saturating_duration_since(self.started_at).as_secs_f64().round()
                    as u64,
                version: env!("CARGO_PKG_VERSION"),
                title: process_title(),
            },
        };

        record_memory_rss(snapshot.memory.rss_mb);
        snapshot
    }
}

fn percent(delta_micros: u64, elapsed: Duration) -> i64 {
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    if elapsed_ms <= 0.0 {
        return 0;
    }
    (delta_micros as f64 / 1000.0 / elapsed_ms * 100.0).round() as i64
}

fn to_mb(bytes: u64) -> u64 {
    (bytes as f64 / BYTES_PER_MB).round() as u64
}

fn process_title() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "beacon".to_string())
}

/// Attach a snapshot to the active span as `system.*` / `process.*`
/// attributes plus a `system.metrics.collected` event.
pub fn add_system_metrics_to_span(snapshot: &MetricsSnapshot) {
    let [load_1m, load_5m, load_15m] = snapshot.cpu.load_average;
    add_attributes([
        KeyValue::new("system.memory.rss_mb", snapshot.memory.rss_mb as i64),
        KeyValue::new("system.memory.heap_used_mb", snapshot.memory.heap_used_mb as i64),
        KeyValue::new("system.memory.heap_total_mb", snapshot.memory.heap_total_mb as i64),
        KeyValue::new("system.memory.free_mb", snapshot.system.free_memory_mb as i64),
        KeyValue::new("system.memory.total_mb", snapshot.system.total_memory_mb as i64),
        KeyValue::new("system.memory.usage_percent", snapshot.memory_usage_percent()),
        KeyValue::new("system.cpu.cores", snapshot.cpu.cores as i64),
        KeyValue::new("system.cpu.user_percent", snapshot.cpu.user_percent),
        KeyValue::new("system.cpu.system_percent", snapshot.cpu.system_percent),
        KeyValue::new("system.cpu.total_percent", snapshot.cpu.total_percent),
        KeyValue::new("system.cpu.load_1m", load_1m),
        KeyValue::new("system.cpu.load_5m", load_5m),
        KeyValue::new("system.cpu.load_15m", load_15m),
        KeyValue::new("process.uptime_seconds", snapshot.process.uptime_secs as i64),
        KeyValue::new("process.pid", i64::from(snapshot.process.pid)),
        KeyValue::new("process.version", snapshot.process.version),
    ]);

    record_event(
        "system.metrics.collected",
        [
            KeyValue::new("memory_mb", snapshot.memory.rss_mb as i64),
            KeyValue::new("cpu_total_percent", snapshot.cpu.total_percent),
            KeyValue::new("cpu_user_percent", snapshot.cpu.user_percent),
            KeyValue::new("cpu_system_percent", snapshot.cpu.system_percent),
            KeyValue::new("uptime", snapshot.process.uptime_secs as i64),
        ],
    );
}

#[cfg(unix)]
mod os {
    use super::{CpuUsage, HostInfo, MemoryUsage};

    fn timeval_micros(tv: libc::timeval) -> u64 {
        (tv.tv_sec as u64) * 1_000_000 + tv.tv_usec as u64
    }

    pub(super) fn cpu_usage() -> CpuUsage {
        // SAFETY: getrusage writes a fully initialized rusage into the zeroed buffer.
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
        if rc != 0 {
            return CpuUsage::default();
        }
        CpuUsage {
            user_micros: timeval_micros(usage.ru_utime),
            system_micros: timeval_micros(usage.ru_stime),
        }
    }

    #[cfg(target_os = "linux")]
    fn page_size() -> u64 {
        // SAFETY: sysconf has no memory-safety preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as u64
        } else {
            4096
        }
    }

    #[cfg(target_os = "linux")]
    pub(super) fn memory() -> MemoryUsage {
        // statm: size resident shared text lib data dt, in pages
        let pages: Vec<u64> = std::fs::read_to_string("/proc/self/statm")
            .map(|statm| {
                statm
                    .split_whitespace()
                    .filter_map(|field| field.parse().ok())
                    .collect()
            })
            .unwrap_or_default();
        let page = page_size();
        let field = |i: usize| pages.get(i).copied().unwrap_or(0) * page;
        let (heap_used, heap_total) = heap();

        MemoryUsage {
            rss: field(1),
            heap_used,
            heap_total,
            external: field(2),
            virtual_size: field(0),
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub(super) fn memory() -> MemoryUsage {
        // SAFETY: see cpu_usage.
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
        MemoryUsage {
            // Peak RSS; macOS reports bytes, others kilobytes.
            rss: if rc != 0 {
                0
            } else if cfg!(target_os = "macos") {
                usage.ru_maxrss as u64
            } else {
                usage.ru_maxrss as u64 * 1024
            },
            ..MemoryUsage::default()
        }
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn heap() -> (u64, u64) {
        // SAFETY: mallinfo2 only reads allocator bookkeeping.
        let info = unsafe { libc::mallinfo2() };
        let mapped = info.hblkhd as u64;
        (info.uordblks as u64 + mapped, info.arena as u64 + mapped)
    }

    #[cfg(all(target_os = "linux", not(target_env = "gnu")))]
    fn heap() -> (u64, u64) {
        (0, 0)
    }

    #[cfg(target_os = "linux")]
    pub(super) fn host() -> HostInfo {
        // SAFETY: sysinfo writes a fully initialized struct into the zeroed buffer.
        let mut info: libc::sysinfo = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::sysinfo(&mut info) };
        let unit = u64::from(info.mem_unit.max(1));

        HostInfo {
            uptime_secs: if rc == 0 { info.uptime.max(0) as u64 } else { 0 },
            free_memory: if rc == 0 { info.freeram as u64 * unit } else { 0 },
            total_memory: if rc == 0 { info.totalram as u64 * unit } else { 0 },
            load_average: load_average(),
            cores: num_cpus::get(),
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub(super) fn host() -> HostInfo {
        HostInfo {
            load_average: load_average(),
            cores: num_cpus::get(),
            ..HostInfo::default()
        }
    }

    #[cfg(target_os = "linux")]
    fn load_average() -> [f64; 3] {
        let mut loads = [0.0; 3];
        if let Ok(raw) = std::fs::read_to_string("/proc/loadavg") {
            for (slot, field) in loads.iter_mut().zip(raw.split_whitespace()) {
                *slot = field.parse().unwrap_or(0.0);
            }
        }
        loads
    }

    #[cfg(not(target_os = "linux"))]
    fn load_average() -> [f64; 3] {
        [0.0; 3]
    }
}

#[cfg(not(unix))]
mod os {
    use super::{CpuUsage, HostInfo, MemoryUsage};

    pub(super) fn cpu_usage() -> CpuUsage {
        CpuUsage::default()
    }

    pub(super) fn memory() -> MemoryUsage {
        MemoryUsage::default()
    }

    pub(super) fn host() -> HostInfo {
        HostInfo {
            cores: num_cpus::get(),
            ..HostInfo::default()
        }
    }
}
