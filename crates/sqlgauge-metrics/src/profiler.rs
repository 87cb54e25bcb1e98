//! In-process resource profiling of a single query execution.
//!
//! CPU time and disk counters are process-wide, so only one profiled window
//! may be open per process at a time; [`Profiler::profile`] holds a global
//! lock for the whole window.

use anyhow::Context;
use sqlgauge_core::model::{ExecutionMetrics, BYTES_PER_MB};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

static WINDOW: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone)]
pub struct Profiler {
    sample_interval: Duration,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl Profiler {
    pub fn new(sample_interval: Duration) -> Self {
        Self {
            sample_interval: sample_interval.max(Duration::from_millis(1)),
        }
    }

    /// Runs `f` and measures it. An error from `f` is returned as-is with
    /// context; it never turns into a zeroed measurement.
    pub fn profile<T>(
        &self,
        f: impl FnOnce() -> anyhow::Result<T>,
    ) -> anyhow::Result<(T, ExecutionMetrics)> {
        let _window = WINDOW.lock().unwrap_or_else(|p| p.into_inner());

        let before = Counters::capture();
        let peak = Arc::new(AtomicU64::new(resident_bytes()));
        let stop = Arc::new(AtomicBool::new(false));

        let sampler = {
            let peak = peak.clone();
            let stop = stop.clone();
            let interval = self.sample_interval;
            thread::Builder::new()
                .name("sqlgauge-rss-sampler".into())
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        peak.fetch_max(resident_bytes(), Ordering::Relaxed);
                        thread::park_timeout(interval);
                    }
                })
                .context("failed to start memory sampler")?
        };

        let started = Instant::now();
        let result = f();
        let elapsed = started.elapsed();

        stop.store(true, Ordering::Release);
        sampler.thread().unpark();
        let _ = sampler.join();
        peak.fetch_max(resident_bytes(), Ordering::Relaxed);

        let after = Counters::capture();
        let value = result.context("profiled query failed")?;

        let (used, clamped) = after.since(&before);
        if clamped {
            tracing::debug!(event = "profiler.counter_reset", "negative counter delta clamped to 0");
        }

        Ok((
            value,
            ExecutionMetrics {
                execution_time_s: elapsed.as_secs_f64(),
                peak_memory_mb: peak.load(Ordering::Relaxed) as f64 / BYTES_PER_MB,
                cpu_time_s: used.cpu_seconds,
                disk_read_bytes: used.read_bytes,
                disk_write_bytes: used.write_bytes,
                clamped,
            },
        ))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    cpu_seconds: f64,
    read_bytes: u64,
    write_bytes: u64,
}

impl Counters {
    fn capture() -> Self {
        let (read_bytes, write_bytes) = disk_bytes();
        Self {
            cpu_seconds: cpu_seconds(),
            read_bytes,
            write_bytes,
        }
    }

    /// Usage between `before` and `self`. A counter that went backwards
    /// counts as 0 and sets the returned flag.
    fn since(&self, before: &Counters) -> (Counters, bool) {
        let cpu = self.cpu_seconds - before.cpu_seconds;
        let read = self.read_bytes.checked_sub(before.read_bytes);
        let write = self.write_bytes.checked_sub(before.write_bytes);
        let clamped = cpu < 0.0 || read.is_none() || write.is_none();
        let used = Counters {
            cpu_seconds: cpu.max(0.0),
            read_bytes: read.unwrap_or(0),
            write_bytes: write.unwrap_or(0),
        };
        (used, clamped)
    }
}

/// User plus system CPU time of this process.
#[cfg(unix)]
fn cpu_seconds() -> f64 {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage only writes into the provided struct.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return 0.0;
    }
    // SAFETY: rc == 0 means the struct was filled; zeroed() covers the rest.
    let usage = unsafe { usage.assume_init() };
    let secs = |tv: libc::timeval| tv.tv_sec as f64 + tv.tv_usec as f64 / 1e6;
    secs(usage.ru_utime) + secs(usage.ru_stime)
}

#[cfg(not(unix))]
fn cpu_seconds() -> f64 {
    0.0
}

#[cfg(target_os = "linux")]
fn resident_bytes() -> u64 {
    // /proc/self/statm: size resident shared text lib data dt (pages)
    let Ok(content) = std::fs::read_to_string("/proc/self/statm") else {
        return 0;
    };
    let pages = content
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    pages * page_size()
}

#[cfg(target_os = "linux")]
fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if sz > 0 {
        sz as u64
    } else {
        4096
    }
}

#[cfg(not(target_os = "linux"))]
fn resident_bytes() -> u64 {
    0
}

/// Bytes this process caused to be fetched from / sent to storage.
#[cfg(target_os = "linux")]
fn disk_bytes() -> (u64, u64) {
    let Ok(content) = std::fs::read_to_string("/proc/self/io") else {
        return (0, 0);
    };
    parse_proc_io(&content)
}

#[cfg(not(target_os = "linux"))]
fn disk_bytes() -> (u64, u64) {
    (0, 0)
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_io(content: &str) -> (u64, u64) {
    let mut read = 0;
    let mut write = 0;
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().parse::<u64>().unwrap_or(0);
        match key.trim() {
            "read_bytes" => read = value,
            "write_bytes" => write = value,
            _ => {}
        }
    }
    (read, write)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgauge_core::errors::{try_map_error, ErrorClass, ExecutionError};

    #[test]
    fn test_counters_going_backwards_clamp_to_zero() {
        let before = Counters {
            cpu_seconds: 2.0,
            read_bytes: 4096,
            write_bytes: 100,
        };
        let after = Counters {
            cpu_seconds: 1.5,
            read_bytes: 1024,
            write_bytes: 300,
        };
        let (used, clamped) = after.since(&before);
        assert!(clamped);
        assert_eq!(used.cpu_seconds, 0.0);
        assert_eq!(used.read_bytes, 0);
        assert_eq!(used.write_bytes, 200);

        let after = Counters {
            cpu_seconds: 2.25,
            read_bytes: 8192,
            write_bytes: 100,
        };
        let (used, clamped) = after.since(&before);
        assert!(!clamped);
        assert_eq!(used.cpu_seconds, 0.25);
        assert_eq!(used.read_bytes, 4096);
        assert_eq!(used.write_bytes, 0);
    }

    #[test]
    fn test_noop_has_non_negative_deltas() {
        let (v, m) = Profiler::default().profile(|| Ok(42)).unwrap();
        assert_eq!(v, 42);
        assert!(m.execution_time_s >= 0.0);
        assert!(m.peak_memory_mb >= 0.0);
        assert!(m.cpu_time_s >= 0.0);
    }

    #[test]
    fn test_failing_callable_propagates() {
        let err = Profiler::default()
            .profile(|| -> anyhow::Result<()> {
                Err(ExecutionError::new("no such table: ghosts").into())
            })
            .unwrap_err();
        assert_eq!(try_map_error(&err), Some(ErrorClass::Execution));
        assert!(format!("{:#}", err).contains("no such table"));
    }

    #[test]
    fn test_windows_never_overlap() {
        let spans = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let spans = spans.clone();
                thread::spawn(move || {
                    Profiler::new(Duration::from_millis(5))
                        .profile(|| {
                            let start = Instant::now();
                            thread::sleep(Duration::from_millis(20));
                            spans.lock().unwrap().push((start, Instant::now()));
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut spans = spans.lock().unwrap().clone();
        spans.sort();
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0);
        }
    }

    #[test]
    fn test_parse_proc_io() {
        let io = "rchar: 10\nwchar: 20\nread_bytes: 4096\nwrite_bytes: 8192\ncancelled_write_bytes: 0\n";
        assert_eq!(parse_proc_io(io), (4096, 8192));
    }
}
