//! Outbound side of the command link
//!
//! Sends encoded envelopes to the backend endpoint, the address of whoever
//! last delivered a datagram with our protocol tag. Sends are fire-and-forget:
//! failures are logged and counted, never retried.

use crate::error::Result;
use crate::protocol::encode;
use crate::protocol::messages::Envelope;
use parking_lot::Mutex;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Current backend endpoint (single base station at a time)
pub type BackendRegistry = Arc<Mutex<Option<SocketAddr>>>;

/// Empty registry
pub fn backend_registry() -> BackendRegistry {
    Arc::new(Mutex::new(None))
}

/// Send counters, shared with whoever wants to report them
#[derive(Debug, Default)]
pub struct LinkStats {
    sent: AtomicU64,
    send_failures: AtomicU64,
    unaddressed: AtomicU64,
}

/// Point-in-time copy of [`LinkStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatsSnapshot {
    pub sent: u64,
    pub send_failures: u64,
    /// Messages dropped because no backend was bound yet
    pub unaddressed: u64,
}

impl LinkStats {
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            unaddressed: self.unaddressed.load(Ordering::Relaxed),
        }
    }
}

/// Unicast sender to the registered backend
pub struct UdpLink {
    socket: UdpSocket,
    backend: BackendRegistry,
    stats: Arc<LinkStats>,
}

impl UdpLink {
    /// `socket` is normally a clone of the listening socket so replies leave
    /// from the port the base station talks to
    pub fn new(socket: UdpSocket, backend: BackendRegistry) -> Self {
        Self {
            socket,
            backend,
            stats: Arc::new(LinkStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }

    /// Current backend endpoint, if any
    pub fn backend(&self) -> Option<SocketAddr> {
        *self.backend.lock()
    }

    /// Encode and send one envelope. Returns true if it left the socket.
    pub fn send(&self, envelope: &Envelope) -> bool {
        let Some(target) = self.backend() else {
            log::trace!("No backend bound, dropping {} message", envelope.kind());
            self.stats.unaddressed.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        match self.send_to(envelope, target) {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                log::trace!(
                    "Sent {} (request {}) to {}",
                    envelope.kind(),
                    envelope.request_id,
                    target
                );
                true
            }
            Err(e) => {
                // UDP send errors are not fatal - just log and continue
                self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("Failed to send {} to {}: {}", envelope.kind(), target, e);
                false
            }
        }
    }

    fn send_to(&self, envelope: &Envelope, target: SocketAddr) -> Result<()> {
        let bytes = encode::to_bytes(envelope)?;
        self.socket.send_to(&bytes, target)?;
        Ok(())
    }
}
