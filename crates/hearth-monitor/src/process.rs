//! Point-in-time process listing, independent of the streaming pipeline.

use std::cmp::Ordering;

use sysinfo::{ProcessRefreshKind, RefreshKind, System};

use crate::stats::ProcessInfo;

/// Default cap on the number of returned processes.
pub const DEFAULT_PROCESS_LIMIT: usize = 20;

/// Returns up to `limit` process summaries, sorted by CPU usage descending.
///
/// Two refreshes bracket a short window so per-process CPU usage has a
/// baseline to measure against.
pub async fn top_processes(limit: usize) -> Vec<ProcessInfo> {
    let mut sys = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::everything()),
    );
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    sys.refresh_processes();
    sys.refresh_memory();

    let total_memory = sys.total_memory();
    let mut processes: Vec<ProcessInfo> = sys
        .processes()
        .values()
        .filter_map(|process| {
            let name = process.name().to_string();
            if name.is_empty() {
                return None;
            }
            let memory = process.memory();
            Some(ProcessInfo {
                pid: process.pid().as_u32(),
                name,
                cpu: f64::from(process.cpu_usage()),
                memory,
                mem_percent: if total_memory > 0 {
                    memory as f64 / total_memory as f64 * 100.0
                } else {
                    0.0
                },
                status: process.status().to_string(),
            })
        })
        .collect();

    processes.sort_by(|a, b| b.cpu.partial_cmp(&a.cpu).unwrap_or(Ordering::Equal));
    processes.truncate(limit);
    processes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sorted_and_limited() {
        let processes = top_processes(5).await;
        assert!(processes.len() <= 5);
        assert!(processes.windows(2).all(|w| w[0].cpu >= w[1].cpu));
        assert!(processes.iter().all(|p| !p.name.is_empty()));
    }
}
