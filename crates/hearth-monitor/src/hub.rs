//! Snapshot fan-out hub and observer registry.
//!
//! One tick loop samples while at least one observer is registered and
//! broadcasts each snapshot to every active observer's bounded queue.
//! Delivery is non-blocking per observer: a full queue evicts that observer
//! instead of delaying the tick or anyone else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::sampler::{Sampler, SnapshotSource};
use crate::session::{self, Observer, ObserverId, ObserverState};
use crate::stats::Snapshot;
use crate::{DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_QUEUE_CAPACITY, DEFAULT_TICK_INTERVAL_MS};

/// Streaming configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Sampling tick period; also the CPU usage measurement window.
    pub tick_interval: Duration,

    /// Per-observer outbound queue capacity.
    pub queue_capacity: usize,

    /// How long the inbound side may stay silent before the observer is
    /// considered dead.
    pub idle_timeout: Duration,

    /// Optional external command printing the CPU temperature in Celsius.
    pub temperature_command: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            temperature_command: None,
        }
    }
}

/// Registry entry: the observer's queue plus its shared record.
struct Member {
    queue: mpsc::Sender<Arc<Snapshot>>,
    observer: Arc<Observer>,
}

/// The set of currently registered observers. Mutated only under the
/// registry lock; critical sections are constant-time.
#[derive(Default)]
struct Registry {
    members: HashMap<ObserverId, Member>,
}

impl Registry {
    fn insert(&mut self, id: ObserverId, member: Member) {
        self.members.insert(id, member);
    }

    fn remove(&mut self, id: ObserverId) -> Option<Member> {
        self.members.remove(&id)
    }

    fn drain(&mut self) -> Vec<Member> {
        self.members.drain().map(|(_, member)| member).collect()
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    /// Point-in-time copy of the member list for iteration outside the lock.
    fn broadcast_view(&self) -> Vec<(ObserverId, mpsc::Sender<Arc<Snapshot>>, Arc<Observer>)> {
        self.members
            .iter()
            .map(|(id, member)| (*id, member.queue.clone(), Arc::clone(&member.observer)))
            .collect()
    }
}

struct Shared {
    cfg: MonitorConfig,
    registry: Mutex<Registry>,
    source: tokio::sync::Mutex<Box<dyn SnapshotSource>>,
    closed: AtomicBool,
    next_id: AtomicU64,
}

/// Coordinator owning the registry and the periodic sample/broadcast loop.
///
/// Cheap to clone; all clones share one hub.
#[derive(Clone)]
pub struct Hub {
    shared: Arc<Shared>,
}

impl Hub {
    /// Creates a hub sampling real host metrics.
    pub fn new(cfg: MonitorConfig) -> Self {
        let sampler = Sampler::new(cfg.tick_interval, cfg.temperature_command.as_deref());
        Self::with_source(cfg, sampler)
    }

    /// Creates a hub over a custom snapshot source.
    pub fn with_source(cfg: MonitorConfig, source: impl SnapshotSource + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                cfg,
                registry: Mutex::new(Registry::default()),
                source: tokio::sync::Mutex::new(Box::new(source)),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Runs the tick loop until shutdown. Sampling happens only while at
    /// least one observer is registered.
    pub async fn run(&self) {
        // First tick after one full period, not immediately.
        let start = tokio::time::Instant::now() + self.shared.cfg.tick_interval;
        let mut ticker = tokio::time::interval_at(start, self.shared.cfg.tick_interval);
        // Sampling occupies most of a tick period; drop missed ticks
        // instead of bursting to catch up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if self.is_closed() {
                break;
            }
            if self.observer_count() == 0 {
                continue;
            }

            // Holding the source lock across the broadcast keeps enqueue
            // order identical to timestamp order on every queue.
            let mut source = self.shared.source.lock().await;
            let snapshot = Arc::new(source.sample().await);
            self.broadcast(&snapshot);
        }
        debug!("monitor tick loop stopped");
    }

    /// Registers a new observer over an established channel and immediately
    /// queues one fresh snapshot to it, independent of tick timing.
    ///
    /// Fails with [`Error::HubClosed`] after shutdown.
    pub async fn join<C: Channel>(&self, channel: C) -> Result<ObserverId> {
        if self.is_closed() {
            return Err(Error::HubClosed);
        }

        let (sink, stream) = channel.split();
        let id = ObserverId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let observer = Arc::new(Observer::new(id));
        let (queue_tx, queue_rx) = mpsc::channel(self.shared.cfg.queue_capacity);

        let mut source = self.shared.source.lock().await;
        {
            let mut registry = self.shared.registry.lock().unwrap();
            // Re-checked under the registry lock: shutdown drains the
            // registry under the same lock, so we never slip in after it.
            if self.is_closed() {
                return Err(Error::HubClosed);
            }
            registry.insert(
                id,
                Member {
                    queue: queue_tx.clone(),
                    observer: Arc::clone(&observer),
                },
            );
        }
        observer.advance(ObserverState::Active);
        info!("observer {} joined ({} active)", id, self.observer_count());

        // Cold start: the queue is empty, so this cannot fail.
        let snapshot = Arc::new(source.sample().await);
        let _ = queue_tx.try_send(snapshot);
        drop(source);

        tokio::spawn(session::drain_loop(Arc::clone(&observer), queue_rx, sink));
        tokio::spawn(session::liveness_loop(
            self.clone(),
            observer,
            stream,
            self.shared.cfg.idle_timeout,
        ));

        Ok(id)
    }

    /// Deregisters an observer. Idempotent; safe to call concurrently with
    /// an in-flight broadcast.
    pub fn leave(&self, id: ObserverId) {
        let removed = self.shared.registry.lock().unwrap().remove(id);
        if let Some(member) = removed {
            member.observer.advance(ObserverState::Closing);
            member.observer.cancel();
            info!("observer {} left ({} active)", id, self.observer_count());
        }
    }

    /// Stops accepting observers and disconnects every current one. The
    /// tick loop exits on its next firing.
    pub fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let members = self.shared.registry.lock().unwrap().drain();
        for member in &members {
            member.observer.advance(ObserverState::Closing);
            member.observer.cancel();
        }
        info!("monitor hub shut down, dropped {} observers", members.len());
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.shared.registry.lock().unwrap().len()
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Queues one snapshot to every active observer, never blocking. A full
    /// queue evicts its observer on the spot.
    fn broadcast(&self, snapshot: &Arc<Snapshot>) {
        let members = self.shared.registry.lock().unwrap().broadcast_view();
        for (id, queue, observer) in members {
            if !observer.is_active() {
                continue;
            }
            match queue.try_send(Arc::clone(snapshot)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("observer {} cannot keep up, evicting", id);
                    self.leave(id);
                }
                Err(TrySendError::Closed(_)) => self.leave(id),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::task::yield_now;

    use crate::channel::{ChannelSink, ChannelStream, Inbound};

    /// Counting source; timestamps are the sample ordinal.
    struct TestSource {
        samples: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SnapshotSource for TestSource {
        async fn sample(&mut self) -> Snapshot {
            let n = self.samples.fetch_add(1, Ordering::SeqCst);
            Snapshot {
                time: n as i64 + 1,
                ..Default::default()
            }
        }
    }

    struct TestChannel {
        sink: TestSink,
        stream: TestStream,
    }

    struct TestSink {
        frames: Arc<Mutex<Vec<String>>>,
        stalled: bool,
    }

    #[async_trait]
    impl ChannelSink for TestSink {
        async fn send(&mut self, frame: String) -> Result<()> {
            if self.stalled {
                std::future::pending::<()>().await;
            }
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }

        async fn close(&mut self) {}
    }

    /// Inbound side: either silent forever or closed by the peer at once.
    enum TestStream {
        Silent,
        PeerClosed,
    }

    #[async_trait]
    impl ChannelStream for TestStream {
        async fn recv(&mut self) -> Result<Inbound> {
            match self {
                Self::Silent => std::future::pending().await,
                Self::PeerClosed => Ok(Inbound::Closed),
            }
        }
    }

    impl Channel for TestChannel {
        type Sink = TestSink;
        type Stream = TestStream;

        fn split(self) -> (TestSink, TestStream) {
            (self.sink, self.stream)
        }
    }

    fn test_hub(queue_capacity: usize) -> (Hub, Arc<AtomicUsize>) {
        let samples = Arc::new(AtomicUsize::new(0));
        let cfg = MonitorConfig {
            tick_interval: Duration::from_secs(1),
            queue_capacity,
            idle_timeout: Duration::from_secs(3600),
            temperature_command: None,
        };
        let hub = Hub::with_source(
            cfg,
            TestSource {
                samples: Arc::clone(&samples),
            },
        );
        (hub, samples)
    }

    fn test_channel(stalled: bool) -> (TestChannel, Arc<Mutex<Vec<String>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        (
            TestChannel {
                sink: TestSink {
                    frames: Arc::clone(&frames),
                    stalled,
                },
                stream: TestStream::Silent,
            },
            frames,
        )
    }

    fn spawn_run(hub: &Hub) {
        let hub = hub.clone();
        tokio::spawn(async move { hub.run().await });
    }

    async fn advance_ticks(n: u32) {
        for _ in 0..n {
            tokio::time::sleep(Duration::from_secs(1)).await;
            yield_now().await;
        }
    }

    /// Lets spawned session tasks run to idle without crossing a tick.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn delivered_times(frames: &Mutex<Vec<String>>) -> Vec<i64> {
        frames
            .lock()
            .unwrap()
            .iter()
            .map(|frame| serde_json::from_str::<Snapshot>(frame).unwrap().time)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sampling_without_observers() {
        let (hub, samples) = test_hub(10);
        spawn_run(&hub);

        advance_ticks(5).await;
        assert_eq!(samples.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_delivers_cold_start_snapshot() {
        let (hub, samples) = test_hub(10);
        spawn_run(&hub);

        let (channel, frames) = test_channel(false);
        hub.join(channel).await.unwrap();
        settle().await;

        // One sample taken and delivered without waiting for a tick.
        assert_eq!(samples.load(Ordering::SeqCst), 1);
        assert_eq!(delivered_times(&frames), vec![1]);
        assert_eq!(hub.observer_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_same_snapshot_to_all_observers() {
        let (hub, _samples) = test_hub(10);
        spawn_run(&hub);

        let (a, frames_a) = test_channel(false);
        let (b, frames_b) = test_channel(false);
        hub.join(a).await.unwrap();
        hub.join(b).await.unwrap();

        advance_ticks(1).await;

        let times_a = delivered_times(&frames_a);
        let times_b = delivered_times(&frames_b);
        // Cold-start snapshots differ; the tick snapshot is identical.
        assert_eq!(times_a.last(), times_b.last());
        // And per-observer delivery is in increasing time order.
        assert!(times_a.windows(2).all(|w| w[0] < w[1]));
        assert!(times_b.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_observer_is_evicted_without_blocking_others() {
        let (hub, _samples) = test_hub(2);
        spawn_run(&hub);

        let (slow, slow_frames) = test_channel(true);
        let (fast, fast_frames) = test_channel(false);
        let slow_id = hub.join(slow).await.unwrap();
        hub.join(fast).await.unwrap();
        settle().await;
        assert_eq!(hub.observer_count(), 2);

        // The stalled sink holds one snapshot in flight, so the queue
        // (capacity 2) fills after two ticks; the third evicts.
        advance_ticks(4).await;

        assert_eq!(hub.observer_count(), 1);
        assert!(slow_frames.lock().unwrap().is_empty());
        assert!(!fast_frames.lock().unwrap().is_empty());

        // Eviction is idempotent and the evictee gets nothing further.
        hub.leave(slow_id);
        let delivered = fast_frames.lock().unwrap().len();
        advance_ticks(2).await;
        assert!(fast_frames.lock().unwrap().len() > delivered);
        assert!(slow_frames.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_stops_sampling() {
        let (hub, samples) = test_hub(10);
        spawn_run(&hub);

        let (channel, _frames) = test_channel(false);
        let id = hub.join(channel).await.unwrap();
        advance_ticks(2).await;

        hub.leave(id);
        assert_eq!(hub.observer_count(), 0);

        // At most one in-flight tick may still sample; after that, silence.
        advance_ticks(1).await;
        let settled = samples.load(Ordering::SeqCst);
        advance_ticks(3).await;
        assert_eq!(samples.load(Ordering::SeqCst), settled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_is_idempotent() {
        let (hub, _samples) = test_hub(10);
        let (channel, _frames) = test_channel(false);
        let id = hub.join(channel).await.unwrap();

        hub.leave(id);
        hub.leave(id);
        assert_eq!(hub.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_close_deregisters() {
        let (hub, _samples) = test_hub(10);

        let (mut channel, _frames) = test_channel(false);
        channel.stream = TestStream::PeerClosed;
        hub.join(channel).await.unwrap();

        settle().await;
        assert_eq!(hub.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_observer_is_dropped() {
        let samples = Arc::new(AtomicUsize::new(0));
        let cfg = MonitorConfig {
            tick_interval: Duration::from_secs(1),
            queue_capacity: 10,
            idle_timeout: Duration::from_secs(5),
            temperature_command: None,
        };
        let hub = Hub::with_source(
            cfg,
            TestSource {
                samples: Arc::clone(&samples),
            },
        );
        spawn_run(&hub);

        let (channel, _frames) = test_channel(false);
        hub.join(channel).await.unwrap();
        assert_eq!(hub.observer_count(), 1);

        advance_ticks(6).await;
        assert_eq!(hub.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_after_shutdown_is_rejected() {
        let (hub, _samples) = test_hub(10);
        let (channel, _frames) = test_channel(false);
        hub.join(channel).await.unwrap();

        hub.shutdown();
        assert_eq!(hub.observer_count(), 0);

        let (late, _frames) = test_channel(false);
        assert!(matches!(hub.join(late).await, Err(Error::HubClosed)));
    }
}
