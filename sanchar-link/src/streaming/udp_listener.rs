//! Inbound side of the command link
//!
//! A dedicated thread blocks on `recv_from` (with a read timeout so it can
//! observe shutdown) and forwards every datagram to the dispatch loop as a
//! [`Trigger::Datagram`]. No decoding happens here.

use crate::error::Result;
use crate::firmware::Trigger;
use crossbeam_channel::Sender;
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Receive loop feeding the trigger queue
pub struct UdpListener {
    socket: UdpSocket,
    frame_size: usize,
    triggers: Sender<Trigger>,
    running: Arc<AtomicBool>,
}

impl UdpListener {
    pub fn new(
        socket: UdpSocket,
        frame_size: usize,
        read_timeout: Duration,
        triggers: Sender<Trigger>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        socket.set_read_timeout(Some(read_timeout))?;
        Ok(Self {
            socket,
            frame_size,
            triggers,
            running,
        })
    }

    /// Run until `running` clears or the dispatch loop goes away
    pub fn run(&self) -> Result<()> {
        log::info!(
            "UDP listener started on {} (frame {} bytes)",
            self.socket.local_addr()?,
            self.frame_size
        );

        let mut buf = vec![0u8; self.frame_size];
        while self.running.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    log::trace!("RX {} bytes from {}", n, from);
                    let trigger = Trigger::Datagram {
                        bytes: buf[..n].to_vec(),
                        from,
                    };
                    if self.triggers.send(trigger).is_err() {
                        log::debug!("Trigger queue closed, listener exiting");
                        break;
                    }
                }
                Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) => {
                    // e.g. ICMP port unreachable surfaced on some platforms
                    log::warn!("UDP receive error: {}", e);
                }
            }
        }

        log::info!("UDP listener exiting");
        Ok(())
    }
}
