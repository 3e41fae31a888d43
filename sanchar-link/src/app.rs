//! Application orchestration for the SancharLink daemon
//!
//! Binds the command socket, wires the dispatcher to the actuator driver,
//! starts the listener and heartbeat threads, and runs the dispatch loop on
//! the calling thread.

use crate::config::AppConfig;
use crate::core::driver::ActuatorDriver;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::firmware::{Firmware, Trigger};
use crate::heartbeat::{self, FixedSignal, SignalSource};
use crate::motor::{SafeStop, shared_driver};
use crate::streaming::{LinkStats, UdpLink, UdpListener, backend_registry};
use crossbeam_channel::Sender;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Bound capacity of the trigger queue
const TRIGGER_QUEUE_DEPTH: usize = 64;

/// Everything needed to stop a running app from another thread
#[derive(Clone)]
pub struct ShutdownHandle {
    triggers: Sender<Trigger>,
    running: Arc<AtomicBool>,
    safe_stop: SafeStop,
}

impl ShutdownHandle {
    /// Release the motors immediately, then ask the loops to exit
    pub fn shutdown(&self) {
        if let Err(e) = self.safe_stop.engage() {
            log::error!("Safe stop failed during shutdown: {}", e);
        }
        self.running.store(false, Ordering::Relaxed);
        let _ = self.triggers.send(Trigger::Shutdown);
    }
}

/// Main application structure
pub struct SancharApp {
    config: AppConfig,
    socket: UdpSocket,
    firmware: Firmware,
    triggers: Sender<Trigger>,
    running: Arc<AtomicBool>,
    link_stats: Arc<LinkStats>,
}

impl SancharApp {
    /// Bind the command socket and build the component graph
    pub fn new(config: AppConfig, driver: impl ActuatorDriver + 'static) -> Result<Self> {
        let signal = FixedSignal(config.network.rssi_dbm);
        Self::with_signal(config, driver, Box::new(signal))
    }

    pub fn with_signal(
        config: AppConfig,
        driver: impl ActuatorDriver + 'static,
        signal: Box<dyn SignalSource>,
    ) -> Result<Self> {
        config.validate()?;
        let bind_addr = config.network.socket_addr()?;
        let socket = UdpSocket::bind(bind_addr)
            .map_err(|e| Error::Other(format!("Failed to bind to {}: {}", bind_addr, e)))?;
        log::info!("Command socket bound to {}", socket.local_addr()?);

        let backend = backend_registry();
        let link = UdpLink::new(socket.try_clone()?, Arc::clone(&backend));
        let link_stats = link.stats();
        let dispatcher = Dispatcher::new(&config, shared_driver(driver), backend);

        let (triggers, rx) = crossbeam_channel::bounded(TRIGGER_QUEUE_DEPTH);
        let firmware = Firmware::new(dispatcher, link, signal, rx);

        Ok(Self {
            config,
            socket,
            firmware,
            triggers,
            running: Arc::new(AtomicBool::new(true)),
            link_stats,
        })
    }

    /// Actual bound address (resolves port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn link_stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.link_stats)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            triggers: self.triggers.clone(),
            running: Arc::clone(&self.running),
            safe_stop: self.firmware.dispatcher().safe_stop_handle(),
        }
    }

    /// Start the producer threads and run the dispatch loop until shutdown
    pub fn run(mut self) -> Result<()> {
        let listener = UdpListener::new(
            self.socket.try_clone()?,
            self.config.network.frame_size,
            self.config.network.read_timeout(),
            self.triggers.clone(),
            Arc::clone(&self.running),
        )?;
        let listener_handle = thread::Builder::new()
            .name("udp-listener".to_string())
            .spawn(move || {
                if let Err(e) = listener.run() {
                    log::error!("UDP listener error: {}", e);
                }
            })
            .map_err(|e| Error::Other(format!("Failed to spawn UDP listener: {}", e)))?;

        let heartbeat_handle = heartbeat::spawn_ticker(
            self.config.heartbeat.period(),
            self.triggers.clone(),
            Arc::clone(&self.running),
        )?;

        // Only the producers may keep the queue open
        drop(self.triggers);

        let result = self.firmware.run();

        self.running.store(false, Ordering::Relaxed);
        if listener_handle.join().is_err() {
            log::error!("UDP listener thread panicked");
        }
        if heartbeat_handle.join().is_err() {
            log::error!("Heartbeat thread panicked");
        }
        log::info!("SancharLink stopped");
        result
    }
}
