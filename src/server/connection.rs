//! Per-connection frame reading and record forwarding

use crate::codec::FrameCodec;
use crate::sink::RecordSink;
use crate::RelayError;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Peer closed the connection on a frame boundary
    PeerClosed,
    /// Peer closed the connection partway through a frame
    ClosedEarly {
        /// Bytes of the unfinished frame
        pending: usize,
    },
    /// A frame could not be decoded; the session was dropped
    DecodeFailed(String),
    /// Reading from the socket failed
    ReadFailed(String),
}

impl SessionEnd {
    /// Whether the session ended without a fault on the peer's side
    pub fn is_clean(&self) -> bool {
        matches!(self, SessionEnd::PeerClosed | SessionEnd::ClosedEarly { .. })
    }
}

/// Outcome of one connection
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Session identifier used in diagnostics
    pub id: Uuid,
    /// Remote address, when known
    pub peer: Option<SocketAddr>,
    /// Records decoded and handed to the sink
    pub records: u64,
    /// Records the sink reported an error for
    pub sink_errors: u64,
    /// How the session ended
    pub end: SessionEnd,
}

/// Reads frames from one connection and forwards each decoded record to a sink.
///
/// Records of one connection reach the sink strictly in arrival order.
#[derive(Clone)]
pub struct ConnectionHandler {
    sink: Arc<dyn RecordSink>,
    max_frame_size: usize,
}

impl ConnectionHandler {
    /// Create a handler forwarding to `sink`
    pub fn new(sink: Arc<dyn RecordSink>, max_frame_size: usize) -> Self {
        Self {
            sink,
            max_frame_size,
        }
    }

    /// Serve one connection until the peer closes it or a frame fails to decode
    pub async fn handle<S>(&self, stream: S, peer: Option<SocketAddr>) -> SessionSummary
    where
        S: AsyncRead + Unpin,
    {
        let id = Uuid::new_v4();
        let peer_label = peer.map_or_else(|| "-".to_string(), |p| p.to_string());
        debug!(session = %id, peer = %peer_label, "Session started");

        let mut frames = FramedRead::new(stream, FrameCodec::new(self.max_frame_size));
        let mut records = 0u64;
        let mut sink_errors = 0u64;

        let end = loop {
            match frames.next().await {
                None => break SessionEnd::PeerClosed,
                Some(Ok(record)) => {
                    records += 1;
                    if let Err(e) = self.sink.accept(&record).await {
                        sink_errors += 1;
                        error!(
                            session = %id,
                            peer = %peer_label,
                            logger = %record.name,
                            error = %e,
                            "Sink rejected record"
                        );
                    }
                }
                Some(Err(RelayError::ConnectionClosedEarly { pending })) => {
                    debug!(session = %id, peer = %peer_label, pending, "Peer closed mid-frame");
                    break SessionEnd::ClosedEarly { pending };
                }
                Some(Err(e)) if e.is_decode_fault() => {
                    warn!(
                        session = %id,
                        peer = %peer_label,
                        records,
                        error = %e,
                        "Dropping session after undecodable frame"
                    );
                    break SessionEnd::DecodeFailed(e.to_string());
                }
                Some(Err(e)) => {
                    warn!(session = %id, peer = %peer_label, error = %e, "Read failed");
                    break SessionEnd::ReadFailed(e.to_string());
                }
            }
        };

        debug!(session = %id, peer = %peer_label, records, end = ?end, "Session ended");
        SessionSummary {
            id,
            peer,
            records,
            sink_errors,
            end,
        }
    }
}
