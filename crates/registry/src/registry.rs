//! Accept loop and relay logic.
//!
//! One reader task and one writer task per peer. Relaying happens on the
//! reader task of the sending peer, which preserves per-sender order at
//! every receiver.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vib_core::ServiceDescriptor;
use vib_wire::{
    read_frame, write_frame, DiscoveryEventKind, Message, ParticipantAnnouncement, ProtocolError,
    WireFrame,
};

/// Errors from starting the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to bind listen address: {0}")]
    Bind(#[from] std::io::Error),
}

struct Peer {
    tx: mpsc::UnboundedSender<WireFrame>,
    /// Current service descriptors of this peer, kept up to date from its
    /// announcement and subsequent discovery events.
    services: Vec<ServiceDescriptor>,
    announced: bool,
}

#[derive(Default)]
struct Shared {
    peers: Mutex<HashMap<String, Peer>>,
}

impl Shared {
    /// Relay a frame to every peer except `from`.
    fn relay(&self, from: &str, frame: &WireFrame) {
        let peers = self.peers.lock();
        for (name, peer) in peers.iter() {
            if name == from {
                continue;
            }
            // A closed receiver is cleaned up by its own reader task.
            let _ = peer.tx.send(frame.clone());
        }
    }

    fn announcements(&self, except: &str) -> Vec<ParticipantAnnouncement> {
        let peers = self.peers.lock();
        peers
            .iter()
            .filter(|(name, peer)| name.as_str() != except && peer.announced)
            .map(|(name, peer)| ParticipantAnnouncement {
                participant_name: name.clone(),
                services: peer.services.clone(),
            })
            .collect()
    }
}

/// The central rendezvous broker. Binds a TCP listener and relays frames
/// between all connected participants.
pub struct Registry {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl Registry {
    /// Bind `addr` and start accepting participants.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, RegistryError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shared = Arc::new(Shared::default());

        info!(%local_addr, "registry listening");
        tokio::spawn(accept_loop(listener, shared, shutdown.clone()));

        Ok(Self { local_addr, shutdown })
    }

    /// The bound listen address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and drop all peer connections.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("registry accept loop stopping");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!(%peer_addr, "incoming connection");
                        tokio::spawn(handle_peer(
                            stream,
                            Arc::clone(&shared),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}

async fn handle_peer(stream: TcpStream, shared: Arc<Shared>, shutdown: CancellationToken) {
    let (mut read_half, mut write_half) = stream.into_split();

    // Handshake: the first frame must be Hello.
    let name = match read_frame::<_, WireFrame>(&mut read_half).await {
        Ok(WireFrame::Hello { participant_name, version }) => {
            debug!(participant = %participant_name, version, "hello received");
            participant_name
        }
        Ok(other) => {
            warn!(frame = ?other, "expected hello as first frame");
            return;
        }
        Err(e) => {
            debug!(error = %e, "connection dropped before hello");
            return;
        }
    };

    let (tx, rx) = mpsc::unbounded_channel::<WireFrame>();
    let duplicate = {
        let mut peers = shared.peers.lock();
        if peers.contains_key(&name) {
            true
        } else {
            // Queue the welcome before releasing the lock so no relayed frame
            // can overtake it.
            let welcome = WireFrame::Welcome { announcements: shared.announcements(&name) };
            let _ = tx.send(welcome);
            peers.insert(name.clone(), Peer { tx, services: Vec::new(), announced: false });
            false
        }
    };
    if duplicate {
        warn!(participant = %name, "duplicate participant name refused");
        let refused = WireFrame::Refused {
            reason: format!("participant name {name:?} is already connected"),
        };
        let _ = write_frame(&mut write_half, &refused).await;
        return;
    }
    info!(participant = %name, "participant connected");

    let writer = tokio::spawn(write_loop(write_half, rx, shutdown.clone()));

    read_loop(&mut read_half, &name, &shared, &shutdown).await;

    // Teardown: forget the peer and tell everybody else.
    shared.peers.lock().remove(&name);
    shared.relay(&name, &WireFrame::PeerGone { participant_name: name.clone() });
    info!(participant = %name, "participant disconnected");
    writer.abort();
}

async fn read_loop(
    read_half: &mut OwnedReadHalf,
    name: &str,
    shared: &Shared,
    shutdown: &CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return,
            frame = read_frame::<_, WireFrame>(read_half) => frame,
        };
        match frame {
            Ok(WireFrame::Msg(envelope)) => {
                if envelope.sender.participant_name != name {
                    warn!(
                        participant = %name,
                        claimed = %envelope.sender.participant_name,
                        "sender descriptor does not match connection; frame dropped"
                    );
                    continue;
                }
                track_services(shared, name, &envelope.msg);
                shared.relay(name, &WireFrame::Msg(envelope));
            }
            Ok(other) => {
                warn!(participant = %name, frame = ?other, "unexpected control frame");
            }
            Err(ProtocolError::Closed) => return,
            Err(e) => {
                warn!(participant = %name, error = %e, "read failed");
                return;
            }
        }
    }
}

/// Keep the retained per-peer service view current so `Welcome` replies
/// always carry the complete picture.
fn track_services(shared: &Shared, name: &str, msg: &Message) {
    match msg {
        Message::ParticipantAnnouncement(announcement) => {
            let mut peers = shared.peers.lock();
            if let Some(peer) = peers.get_mut(name) {
                peer.services = announcement.services.clone();
                peer.announced = true;
            }
        }
        Message::ServiceDiscoveryEvent { kind, service } => {
            let mut peers = shared.peers.lock();
            if let Some(peer) = peers.get_mut(name) {
                match kind {
                    DiscoveryEventKind::ServiceCreated => {
                        if !peer.services.iter().any(|s| s.is_same_endpoint(service)) {
                            peer.services.push(service.clone());
                        }
                    }
                    DiscoveryEventKind::ServiceRemoved => {
                        peer.services.retain(|s| !s.is_same_endpoint(service));
                    }
                }
            }
        }
        _ => {}
    }
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<WireFrame>,
    shutdown: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return,
            frame = rx.recv() => frame,
        };
        let Some(frame) = frame else { return };
        if let Err(e) = write_frame(&mut write_half, &frame).await {
            debug!(error = %e, "write failed, dropping peer queue");
            return;
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
