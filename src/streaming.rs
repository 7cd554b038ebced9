//! # Streaming Delivery Channel
//!
//! Producer/consumer discipline for token-by-token delivery. The transport
//! layer owns the socket; this module owns the channel between a backend's
//! chunk producer and that transport sink. The one rule that matters: a
//! disconnected client stops *delivery*, not *production*: the forwarder
//! keeps draining the producer so the completed response can still be
//! cached and counted.

use crate::models::ErrorKind;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

/// One unit of streamed output.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Incremental text.
    Delta(String),
    /// Producer finished; the full response was assembled.
    Done { tokens_used: u64 },
    /// Producer failed terminally; no further chunks follow.
    Failed { kind: ErrorKind },
}

/// Receiving side, handed to the transport layer. Dropping it cancels
/// delivery without cancelling production.
pub struct StreamHandle {
    rx: mpsc::Receiver<StreamChunk>,
}

impl StreamHandle {
    pub async fn next_chunk(&mut self) -> Option<StreamChunk> {
        self.rx.recv().await
    }
}

/// Producing side, driven by the orchestration layer.
pub struct StreamSender {
    tx: mpsc::Sender<StreamChunk>,
}

/// Bounded channel between producer and transport sink.
pub fn channel(capacity: usize) -> (StreamSender, StreamHandle) {
    let (tx, rx) = mpsc::channel(capacity);
    (StreamSender { tx }, StreamHandle { rx })
}

impl StreamSender {
    /// Forward a backend's chunk sequence into the channel, returning the
    /// fully assembled text regardless of whether the receiver is still
    /// listening. Send failures (receiver dropped) flip into drain-only
    /// mode instead of aborting the producer.
    pub async fn forward<S>(self, mut chunks: S, tokens_used: u64) -> String
    where
        S: Stream<Item = String> + Unpin,
    {
        let mut assembled = String::new();
        let mut delivering = true;

        while let Some(delta) = chunks.next().await {
            assembled.push_str(&delta);
            if delivering && self.tx.send(StreamChunk::Delta(delta)).await.is_err() {
                debug!("Stream receiver gone; draining producer for cache population");
                delivering = false;
            }
        }

        if delivering {
            let _ = self.tx.send(StreamChunk::Done { tokens_used }).await;
        }
        assembled
    }

    /// Report a terminal failure to the consumer, if still listening.
    pub async fn fail(self, kind: ErrorKind) {
        let _ = self.tx.send(StreamChunk::Failed { kind }).await;
    }
}
