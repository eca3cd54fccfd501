//! Per-observer session state and I/O loops.
//!
//! Every observer runs two independent tasks: an outbound drain writing
//! queued snapshots to the transport, and an inbound liveness watch. Both
//! stop promptly when the observer's cancellation token fires.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::{ChannelSink, ChannelStream, Inbound};
use crate::hub::Hub;
use crate::stats::Snapshot;

/// Opaque observer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Observer lifecycle states, in order. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ObserverState {
    Joining = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl ObserverState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Joining,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Shared per-observer record; the registry and both session tasks hold it.
pub struct Observer {
    id: ObserverId,
    state: AtomicU8,
    cancel: CancellationToken,
}

impl Observer {
    pub(crate) fn new(id: ObserverId) -> Self {
        Self {
            id,
            state: AtomicU8::new(ObserverState::Joining as u8),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn state(&self) -> ObserverState {
        ObserverState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == ObserverState::Active
    }

    /// Moves the state forward; a later state never regresses.
    pub(crate) fn advance(&self, to: ObserverState) {
        self.state.fetch_max(to as u8, Ordering::AcqRel);
    }

    /// Tells both session tasks to stop.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Writes queued snapshots to the transport until the queue closes, the
/// transport fails, or the observer is cancelled. Always releases the
/// transport and finishes the state machine.
pub(crate) async fn drain_loop<S: ChannelSink>(
    observer: Arc<Observer>,
    mut queue: mpsc::Receiver<Arc<Snapshot>>,
    mut sink: S,
) {
    loop {
        let snapshot = tokio::select! {
            _ = observer.cancelled() => break,
            next = queue.recv() => match next {
                Some(snapshot) => snapshot,
                None => break,
            },
        };

        let frame = match serde_json::to_string(&*snapshot) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("observer {}: snapshot encode failed: {}", observer.id, e);
                continue;
            }
        };

        tokio::select! {
            _ = observer.cancelled() => break,
            sent = sink.send(frame) => {
                if let Err(e) = sent {
                    debug!("observer {}: write failed: {}", observer.id, e);
                    break;
                }
            }
        }
    }

    sink.close().await;
    observer.advance(ObserverState::Closed);
}

/// Watches the inbound side of the transport. Any frame counts as
/// keep-alive; closure, a transport error, idle timeout, or cancellation
/// ends the session and deregisters the observer.
pub(crate) async fn liveness_loop<R: ChannelStream>(
    hub: Hub,
    observer: Arc<Observer>,
    mut stream: R,
    idle_timeout: Duration,
) {
    loop {
        let inbound = tokio::select! {
            _ = observer.cancelled() => break,
            inbound = tokio::time::timeout(idle_timeout, stream.recv()) => inbound,
        };
        match inbound {
            Ok(Ok(Inbound::Activity)) => {}
            Ok(Ok(Inbound::Closed)) => {
                debug!("observer {}: closed by peer", observer.id);
                break;
            }
            Ok(Err(e)) => {
                debug!("observer {}: transport error: {}", observer.id, e);
                break;
            }
            Err(_) => {
                debug!("observer {}: idle timeout", observer.id);
                break;
            }
        }
    }

    hub.leave(observer.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;

    #[test]
    fn test_state_only_advances() {
        let observer = Observer::new(ObserverId(1));
        assert_eq!(observer.state(), ObserverState::Joining);

        observer.advance(ObserverState::Active);
        assert!(observer.is_active());

        observer.advance(ObserverState::Closed);
        observer.advance(ObserverState::Active);
        assert_eq!(observer.state(), ObserverState::Closed);
    }

    /// Sink that never completes a write, like a peer that stopped reading.
    struct StuckSink;

    #[async_trait]
    impl ChannelSink for StuckSink {
        async fn send(&mut self, _frame: String) -> Result<()> {
            std::future::pending().await
        }

        async fn close(&mut self) {}
    }

    #[tokio::test]
    async fn test_cancel_finishes_drain_even_mid_write() {
        let observer = Arc::new(Observer::new(ObserverId(7)));
        observer.advance(ObserverState::Active);

        let (tx, rx) = mpsc::channel(4);
        tx.send(Arc::new(Snapshot::default())).await.unwrap();
        let drain = tokio::spawn(drain_loop(Arc::clone(&observer), rx, StuckSink));

        observer.cancel();
        drain.await.unwrap();
        assert_eq!(observer.state(), ObserverState::Closed);
    }

    #[tokio::test]
    async fn test_drain_finishes_when_queue_closes() {
        let observer = Arc::new(Observer::new(ObserverId(8)));
        observer.advance(ObserverState::Active);

        let (tx, rx) = mpsc::channel::<Arc<Snapshot>>(4);
        let drain = tokio::spawn(drain_loop(Arc::clone(&observer), rx, StuckSink));

        drop(tx);
        drain.await.unwrap();
        assert_eq!(observer.state(), ObserverState::Closed);
    }
}
