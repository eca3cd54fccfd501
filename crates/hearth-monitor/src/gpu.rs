//! GPU probe backed by the nvidia-smi vendor utility.

use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::stats::GpuStats;

/// A query not answered within this window is abandoned for the tick.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const QUERY_FIELDS: &str = "name,utilization.gpu,memory.total,memory.used,temperature.gpu";

/// Queries the first GPU.
///
/// Returns `available: false` with zeroed fields when the utility is
/// missing, fails, times out, or prints nothing useful. Never errors.
pub async fn probe() -> GpuStats {
    let query = Command::new("nvidia-smi")
        .arg(format!("--query-gpu={}", QUERY_FIELDS))
        .arg("--format=csv,noheader,nounits")
        .output();

    let output = match timeout(PROBE_TIMEOUT, query).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(_)) | Ok(Err(_)) => return GpuStats::default(),
        Err(_) => {
            debug!("nvidia-smi query timed out");
            return GpuStats::default();
        }
    };

    parse_query_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parses the CSV query output; only the first GPU line is used.
///
/// Individual fields that fail to parse stay at zero rather than
/// invalidating the reading.
fn parse_query_output(text: &str) -> GpuStats {
    let mut stats = GpuStats::default();

    let Some(line) = text.trim().lines().next() else {
        return stats;
    };
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 5 {
        return stats;
    }

    stats.available = true;
    stats.name = simplify_name(parts[0]);
    if let Ok(usage) = parts[1].parse() {
        stats.usage = usage;
    }
    if let Ok(total) = parts[2].parse() {
        stats.memory_total = total;
    }
    if let Ok(used) = parts[3].parse() {
        stats.memory_used = used;
    }
    if let Ok(temperature) = parts[4].parse() {
        stats.temperature = temperature;
    }

    stats
}

/// Strips vendor noise from the reported name.
fn simplify_name(name: &str) -> String {
    name.replace("NVIDIA ", "")
        .replace("GeForce ", "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
