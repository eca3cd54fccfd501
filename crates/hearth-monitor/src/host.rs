//! Static host facts reported alongside the metric stream.

use serde::Serialize;
use sysinfo::System;

use crate::stats::format_bytes;

/// Host identity and uptime; cheap enough to gather per request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub kernel_version: String,
    pub uptime_secs: u64,
    /// Uptime formatted as "Xd Yh Zm".
    pub uptime: String,
    /// Total memory formatted for display.
    pub memory_total: String,
}

/// Gathers the current host facts.
pub fn host_info() -> HostInfo {
    let uptime_secs = System::uptime();

    let mut sys = System::new();
    sys.refresh_memory();

    HostInfo {
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        os: System::long_os_version().unwrap_or_default(),
        kernel_version: System::kernel_version().unwrap_or_default(),
        uptime_secs,
        uptime: format_uptime(uptime_secs),
        memory_total: format_bytes(sys.total_memory()),
    }
}

/// Formats an uptime as "Xd Yh Zm".
fn format_uptime(uptime_secs: u64) -> String {
    let days = uptime_secs / 86400;
    let hours = (uptime_secs % 86400) / 3600;
    let minutes = (uptime_secs % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
