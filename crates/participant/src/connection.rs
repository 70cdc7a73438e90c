//! The registry connection: connect/handshake, then a reader task feeding
//! the dispatcher queue and a writer task draining the outbound queue.

use std::time::Duration;

use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vib_wire::{
    read_frame, write_frame, ParticipantAnnouncement, ProtocolError, WireFrame, PROTOCOL_VERSION,
};

use crate::bus::{DispatchItem, WriterItem};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from connecting to or talking with the registry.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to reach registry: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("registry refused the connection: {0}")]
    Refused(String),

    #[error("registry handshake timed out")]
    HandshakeTimeout,

    #[error("configuration error: {0}")]
    Config(#[from] vib_core::ConfigError),
}

/// An established registry connection, already past the handshake.
pub(crate) struct Connection {
    read_half: OwnedReadHalf,
    write_half: OwnedWriteHalf,
    /// Per-peer service lists the registry knew at connect time.
    pub announcements: Vec<ParticipantAnnouncement>,
}

impl Connection {
    /// Connect, say hello, and wait for the registry's welcome.
    pub async fn establish(
        participant_name: &str,
        registry_addr: impl ToSocketAddrs,
    ) -> Result<Self, ConnectionError> {
        let stream = TcpStream::connect(registry_addr).await?;
        stream.set_nodelay(true)?;
        let (mut read_half, mut write_half) = stream.into_split();

        write_frame(
            &mut write_half,
            &WireFrame::Hello {
                participant_name: participant_name.to_string(),
                version: PROTOCOL_VERSION,
            },
        )
        .await?;

        let reply = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_frame(&mut read_half))
            .await
            .map_err(|_| ConnectionError::HandshakeTimeout)??;

        match reply {
            WireFrame::Welcome { announcements } => {
                debug!(peers = announcements.len(), "registry welcome");
                Ok(Self { read_half, write_half, announcements })
            }
            WireFrame::Refused { reason } => Err(ConnectionError::Refused(reason)),
            other => Err(ConnectionError::Refused(format!("unexpected frame {other:?}"))),
        }
    }

    /// Spawn the reader and writer tasks. Inbound messages go to the
    /// dispatcher queue in arrival order; connection loss enqueues a
    /// `Disconnected` item.
    pub fn start(
        self,
        queue_tx: mpsc::UnboundedSender<DispatchItem>,
        wire_rx: mpsc::UnboundedReceiver<WriterItem>,
        shutdown: CancellationToken,
    ) {
        tokio::spawn(read_loop(self.read_half, queue_tx, shutdown.clone()));
        tokio::spawn(write_loop(self.write_half, wire_rx, shutdown));
    }
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    queue_tx: mpsc::UnboundedSender<DispatchItem>,
    shutdown: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return,
            frame = read_frame::<_, WireFrame>(&mut read_half) => frame,
        };
        match frame {
            Ok(WireFrame::Msg(envelope)) => {
                let _ = queue_tx.send(DispatchItem::Deliver(envelope));
            }
            Ok(WireFrame::PeerGone { participant_name }) => {
                let _ = queue_tx.send(DispatchItem::PeerGone(participant_name));
            }
            Ok(other) => {
                warn!(frame = ?other, "unexpected control frame from registry");
            }
            Err(ProtocolError::Closed) => {
                let _ = queue_tx.send(DispatchItem::Disconnected);
                return;
            }
            Err(e) => {
                warn!(error = %e, "registry read failed");
                let _ = queue_tx.send(DispatchItem::Disconnected);
                return;
            }
        }
    }
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut wire_rx: mpsc::UnboundedReceiver<WriterItem>,
    shutdown: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            _ = shutdown.cancelled() => return,
            item = wire_rx.recv() => item,
        };
        match item {
            Some(WriterItem::Frame(frame)) => {
                if let Err(e) = write_frame(&mut write_half, &frame).await {
                    warn!(error = %e, "registry write failed");
                    return;
                }
            }
            Some(WriterItem::Flush(ack)) => {
                let _ = ack.send(());
            }
            None => return,
        }
    }
}
