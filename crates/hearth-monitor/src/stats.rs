//! Snapshot data types shared between the sampler and the wire.

use serde::{Deserialize, Serialize};

/// One immutable bundle of all sampled metrics.
///
/// Produced once per tick; `time` is strictly increasing across snapshots
/// from the same sampler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub gpu: GpuStats,
    pub network: NetworkStats,
    pub disks: Vec<DiskStats>,
    /// Epoch milliseconds at sampling time.
    pub time: i64,
}

/// CPU usage and identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    /// Aggregate usage percentage (0-100).
    pub usage: f64,
    /// Per-core usage percentages.
    pub core_usage: Vec<f64>,
    /// Model name, cached at sampler construction.
    pub model_name: String,
    /// Logical core count.
    pub cores: usize,
    /// Temperature in Celsius; 0 when unavailable.
    pub temperature: f64,
}

/// Memory usage in bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub used_percent: f64,
}

/// GPU usage, queried from the vendor utility.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuStats {
    pub name: String,
    /// Usage percentage (0-100).
    pub usage: f64,
    /// Total VRAM in MB.
    pub memory_total: u64,
    /// Used VRAM in MB.
    pub memory_used: u64,
    /// Temperature in Celsius.
    pub temperature: f64,
    /// False when no GPU or the query failed; all numeric fields are 0 then.
    pub available: bool,
}

/// Network traffic, aggregated over all interfaces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    /// Cumulative bytes sent since boot.
    pub bytes_sent: u64,
    /// Cumulative bytes received since boot.
    pub bytes_recv: u64,
    /// Send rate in bytes/second.
    pub speed_sent: u64,
    /// Receive rate in bytes/second.
    pub speed_recv: u64,
}

/// One mounted volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskStats {
    pub device: String,
    pub mount_point: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub used_percent: f64,
    pub fs_type: String,
}

/// One entry of the point-in-time process listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    /// CPU usage percentage.
    pub cpu: f64,
    /// Resident memory in bytes.
    pub memory: u64,
    pub mem_percent: f64,
    pub status: String,
}

/// Formats a byte count with binary units (e.g., "1.5 KB").
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}B", bytes as f64 / div as f64, ['K', 'M', 'G', 'T', 'P', 'E'][exp])
}

/// Formats a byte rate as a human-readable string (e.g., "1.2 MB/s").
pub fn format_rate(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= 1_000_000_000.0 {
        format!("{:.1} GB/s", bytes_per_sec / 1_000_000_000.0)
    } else if bytes_per_sec >= 1_000_000.0 {
        format!("{:.1} MB/s", bytes_per_sec / 1_000_000.0)
    } else if bytes_per_sec >= 1_000.0 {
        format!("{:.1} KB/s", bytes_per_sec / 1_000.0)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}
