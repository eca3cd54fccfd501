//! Best-effort CPU temperature probe.
//!
//! Either runs a user-configured external command that prints the
//! temperature in Celsius, or falls back to the host's sensor components.
//! Both paths are deadline-bounded so a wedged probe cannot stall the
//! sampling tick; implausible readings report as 0 (unavailable).

use std::time::Duration;
use sysinfo::Components;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::command::split_command;

/// A reading not produced within this window is abandoned for the tick.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_PLAUSIBLE_CELSIUS: f64 = 150.0;

/// CPU temperature probe with an optional external command override.
pub struct TemperatureProbe {
    command: Option<Vec<String>>,
}

impl TemperatureProbe {
    /// Creates a probe. `command` is tokenized with [`split_command`]; an
    /// empty or whitespace-only command falls back to the built-in sensors.
    pub fn new(command: Option<&str>) -> Self {
        let command = command.map(split_command).filter(|argv| !argv.is_empty());
        Self { command }
    }

    /// Returns the temperature in Celsius, or 0.0 when unavailable.
    pub async fn read(&self) -> f64 {
        let reading = match &self.command {
            Some(argv) => read_external(argv).await,
            None => read_components().await,
        };
        clamp_plausible(reading.unwrap_or(0.0))
    }
}

/// Runs the configured command and takes the first float token of stdout.
async fn read_external(argv: &[String]) -> Option<f64> {
    let run = Command::new(&argv[0]).args(&argv[1..]).output();
    let output = match timeout(PROBE_TIMEOUT, run).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!("temperature command failed to run: {}", e);
            return None;
        }
        Err(_) => {
            debug!("temperature command timed out");
            return None;
        }
    };
    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout.split_whitespace().find_map(|token| token.parse::<f64>().ok())
}

/// Takes the hottest CPU-ish sensor component.
async fn read_components() -> Option<f64> {
    let refresh = tokio::task::spawn_blocking(|| {
        let components = Components::new_with_refreshed_list();
        let mut hottest: Option<f32> = None;
        for component in components.iter() {
            let label = component.label().to_ascii_lowercase();
            if label.contains("cpu") || label.contains("core") || label.contains("package") {
                let reading = component.temperature();
                hottest = Some(hottest.map_or(reading, |t| t.max(reading)));
            }
        }
        hottest.map(f64::from)
    });

    match timeout(PROBE_TIMEOUT, refresh).await {
        Ok(Ok(reading)) => reading,
        _ => None,
    }
}

/// Readings outside the physically plausible window count as unavailable.
fn clamp_plausible(celsius: f64) -> f64 {
    if (0.0..=MAX_PLAUSIBLE_CELSIUS).contains(&celsius) {
        celsius
    } else {
        0.0
    }
}
