//! Single-consumer dispatch loop
//!
//! Packet arrival and the heartbeat timer are independent producers. Both
//! post a [`Trigger`] into one channel and this loop handles them one at a
//! time, so the dispatcher's state is only ever touched from one thread.
//! The motor duration stop is the third event source: the loop also selects
//! on a timer for the executor's pending stop.

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::heartbeat::SignalSource;
use crate::protocol::messages::Envelope;
use crate::streaming::UdpLink;
use crossbeam_channel::{Receiver, select};
use std::net::SocketAddr;

/// Event posted to the dispatch loop
#[derive(Debug)]
pub enum Trigger {
    /// Raw datagram from the listener thread
    Datagram { bytes: Vec<u8>, from: SocketAddr },
    /// Heartbeat period elapsed
    HeartbeatTick,
    /// Stop the loop
    Shutdown,
}

/// Dispatch loop state
pub struct Firmware {
    dispatcher: Dispatcher,
    link: UdpLink,
    signal: Box<dyn SignalSource>,
    triggers: Receiver<Trigger>,
}

impl Firmware {
    pub fn new(
        dispatcher: Dispatcher,
        link: UdpLink,
        signal: Box<dyn SignalSource>,
        triggers: Receiver<Trigger>,
    ) -> Self {
        Self {
            dispatcher,
            link,
            signal,
            triggers,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Process triggers until shutdown or until every producer is gone.
    ///
    /// Motors are released before returning.
    pub fn run(&mut self) -> Result<()> {
        log::info!("Dispatch loop running");
        let triggers = self.triggers.clone();

        loop {
            let pending = self.dispatcher.next_motor_stop();
            let timer = match pending {
                Some(stop) => crossbeam_channel::at(stop.deadline),
                None => crossbeam_channel::never(),
            };

            select! {
                recv(triggers) -> msg => match msg {
                    Ok(Trigger::Shutdown) | Err(_) => break,
                    Ok(trigger) => self.handle(trigger),
                },
                recv(timer) -> _ => {
                    if let Some(stop) = pending {
                        let out = self.dispatcher.expire_motor_stop(stop);
                        self.send_all(&out);
                    }
                },
            }
        }

        let stats = self.dispatcher.stats();
        let link = self.link.stats().snapshot();
        log::info!(
            "Dispatch loop stopped: processed={} duplicates={} decode_failures={} ignored={} sent={} send_failures={}",
            stats.processed,
            stats.duplicates,
            stats.decode_failures,
            stats.ignored,
            link.sent,
            link.send_failures
        );
        self.dispatcher.shutdown()
    }

    /// Handle one trigger synchronously
    pub fn handle(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Datagram { bytes, from } => {
                let out = self.dispatcher.handle_datagram(&bytes, from);
                self.send_all(&out);
            }
            Trigger::HeartbeatTick => {
                let rssi = self.signal.rssi();
                if let Some(heartbeat) = self.dispatcher.heartbeat(rssi) {
                    self.link.send(&heartbeat);
                } else {
                    log::trace!("Heartbeat skipped, no backend bound");
                }
            }
            Trigger::Shutdown => {}
        }
    }

    fn send_all(&self, out: &[Envelope]) {
        for envelope in out {
            self.link.send(envelope);
        }
    }
}
