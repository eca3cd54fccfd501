//! Transport-agnostic duplex channel abstraction.
//!
//! The web layer performs the protocol upgrade and hands the hub an
//! already-open channel; the core never touches the transport directly.

use async_trait::async_trait;

use crate::error::Result;

/// Inbound event surfaced by a channel's read half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Any client frame arrived; content is ignored, it counts as liveness.
    Activity,
    /// Orderly close from the peer.
    Closed,
}

/// Write half of an observer's transport.
#[async_trait]
pub trait ChannelSink: Send + 'static {
    /// Sends one serialized snapshot frame.
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Releases the transport. Failures are irrelevant; the session is over.
    async fn close(&mut self);
}

/// Read half of an observer's transport.
#[async_trait]
pub trait ChannelStream: Send + 'static {
    /// Waits for the next inbound event.
    async fn recv(&mut self) -> Result<Inbound>;
}

/// An established duplex message channel.
pub trait Channel: Send + 'static {
    type Sink: ChannelSink;
    type Stream: ChannelStream;

    /// Splits the channel into independently owned halves.
    fn split(self) -> (Self::Sink, Self::Stream);
}
