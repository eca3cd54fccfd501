//! Snapshot producer over the host's OS, process, and GPU data sources.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};

use crate::gpu;
use crate::rate::RateTracker;
use crate::stats::{CpuStats, DiskStats, MemoryStats, NetworkStats, Snapshot};
use crate::temperature::TemperatureProbe;

/// Anything that can produce snapshots for the hub.
#[async_trait]
pub trait SnapshotSource: Send {
    /// Produces one snapshot. Must never fail: individual probe failures
    /// degrade their own fields to zero/unavailable values.
    async fn sample(&mut self) -> Snapshot;
}

/// Stateful system sampler.
///
/// Caches the invariant CPU facts at construction and carries the previous
/// network counter reading between samples. Exactly one caller at a time.
pub struct Sampler {
    sys: System,
    rate: RateTracker,
    temperature: TemperatureProbe,
    model_name: String,
    core_count: usize,
    measure_window: Duration,
    last_time_ms: i64,
}

impl Sampler {
    /// Creates a sampler.
    ///
    /// `measure_window` is the interval CPU usage is measured over; it is
    /// also how long each `sample()` call takes, and is normally the tick
    /// period itself.
    pub fn new(measure_window: Duration, temperature_command: Option<&str>) -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );

        let model_name = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .unwrap_or_default();
        let core_count = sys.cpus().len();

        Self {
            sys,
            rate: RateTracker::new(),
            temperature: TemperatureProbe::new(temperature_command),
            model_name,
            core_count,
            measure_window,
            last_time_ms: 0,
        }
    }

    async fn collect_cpu(&mut self) -> CpuStats {
        // Usage needs a measurement interval; the wait here is the blocking
        // body of one tick rather than a separate background loop.
        self.sys.refresh_cpu();
        tokio::time::sleep(self.measure_window).await;
        self.sys.refresh_cpu();

        let core_usage: Vec<f64> = self.sys.cpus().iter().map(|cpu| f64::from(cpu.cpu_usage())).collect();
        let usage = if core_usage.is_empty() {
            0.0
        } else {
            core_usage.iter().sum::<f64>() / core_usage.len() as f64
        };

        CpuStats {
            usage,
            core_usage,
            model_name: self.model_name.clone(),
            cores: self.core_count,
            temperature: self.temperature.read().await,
        }
    }

    fn collect_memory(&mut self) -> MemoryStats {
        self.sys.refresh_memory();

        let total = self.sys.total_memory();
        let used = self.sys.used_memory();
        MemoryStats {
            total,
            used,
            available: self.sys.available_memory(),
            used_percent: if total > 0 {
                used as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    fn collect_network(&mut self) -> NetworkStats {
        // Totals are summed over every interface, loopback included.
        let networks = Networks::new_with_refreshed_list();
        let (sent, recv) = networks.iter().fold((0u64, 0u64), |(sent, recv), (_, data)| {
            (
                sent.saturating_add(data.total_transmitted()),
                recv.saturating_add(data.total_received()),
            )
        });

        let rates = self.rate.update(sent, recv, Instant::now());
        NetworkStats {
            bytes_sent: sent,
            bytes_recv: recv,
            speed_sent: rates.sent_bps,
            speed_recv: rates.recv_bps,
        }
    }

    fn collect_disks() -> Vec<DiskStats> {
        let disks = Disks::new_with_refreshed_list();
        let mut seen = HashSet::new();
        let mut stats = Vec::new();

        for disk in disks.list() {
            let mount_point = disk.mount_point().to_string_lossy().to_string();
            // The same volume can show up once per bind mount.
            if !seen.insert(mount_point.clone()) {
                continue;
            }

            let total = disk.total_space();
            if total == 0 {
                continue;
            }
            let free = disk.available_space();
            let used = total.saturating_sub(free);

            stats.push(DiskStats {
                device: disk.name().to_string_lossy().to_string(),
                mount_point,
                total,
                used,
                free,
                used_percent: used as f64 / total as f64 * 100.0,
                fs_type: disk.file_system().to_string_lossy().to_string(),
            });
        }

        stats
    }

    /// Epoch milliseconds, forced strictly increasing even if the wall
    /// clock steps backwards.
    fn next_time_ms(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let time = if now <= self.last_time_ms {
            self.last_time_ms + 1
        } else {
            now
        };
        self.last_time_ms = time;
        time
    }
}

#[async_trait]
impl SnapshotSource for Sampler {
    async fn sample(&mut self) -> Snapshot {
        let cpu = self.collect_cpu().await;
        let memory = self.collect_memory();
        let gpu = gpu::probe().await;
        let network = self.collect_network();
        let disks = Self::collect_disks();

        Snapshot {
            cpu,
            memory,
            gpu,
            network,
            disks,
            time: self.next_time_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_facts_cached_at_construction() {
        let sampler = Sampler::new(Duration::from_millis(0), None);
        assert!(sampler.core_count > 0);
    }

    #[test]
    fn test_time_strictly_increases() {
        let mut sampler = Sampler::new(Duration::from_millis(0), None);
        let first = sampler.next_time_ms();
        let second = sampler.next_time_ms();
        let third = sampler.next_time_ms();
        assert!(second > first);
        assert!(third > second);
    }

    #[tokio::test]
    async fn test_sample_never_fails() {
        let mut sampler = Sampler::new(Duration::from_millis(10), None);
        let snapshot = sampler.sample().await;
        assert_eq!(snapshot.cpu.cores, sampler.core_count);
        assert!(snapshot.time > 0);
    }

    #[test]
    fn test_disks_deduplicated_by_mount_point() {
        let disks = Sampler::collect_disks();
        let mut seen = HashSet::new();
        for disk in &disks {
            assert!(seen.insert(disk.mount_point.clone()));
            assert!(disk.total > 0);
        }
    }
}
