//! Hearth Telemetry Core
//!
//! Samples host resource metrics (CPU, memory, GPU, disk, network) into
//! immutable snapshots and streams them to every connected observer over a
//! transport-agnostic duplex channel, with non-blocking per-observer
//! delivery and eviction on overflow.

pub mod channel;
pub mod command;
pub mod error;
pub mod gpu;
pub mod host;
pub mod hub;
pub mod process;
pub mod rate;
pub mod sampler;
pub mod session;
pub mod stats;
pub mod temperature;

pub use channel::{Channel, ChannelSink, ChannelStream, Inbound};
pub use error::{Error, Result};
pub use hub::{Hub, MonitorConfig};
pub use sampler::{Sampler, SnapshotSource};
pub use session::{ObserverId, ObserverState};
pub use stats::Snapshot;

/// Default sampling tick period.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Default per-observer outbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default inbound idle timeout before an observer is considered dead.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;
