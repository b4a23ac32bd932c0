//! Flume-backed hook and the shared run flag used to stop a server.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use super::traits::{ServerEvent, ServerHook};

/// Cooperative cancellation flag shared by the accept loop, the serial
/// reader and whoever wants to stop them.
///
/// Loops re-check the flag at least once per poll interval; stopping never
/// interrupts a request that is already being answered.
#[derive(Debug, Clone)]
pub struct ServerControl {
    running: Arc<AtomicBool>,
}

impl ServerControl {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Request the server to stop
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for ServerControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Hook that forwards every server event through a flume channel, e.g. to a
/// status panel running on another thread.
pub struct FlumeEventHook {
    sender: flume::Sender<ServerEvent>,
}

impl FlumeEventHook {
    /// Create a hook with an unbounded channel
    pub fn new() -> (Self, flume::Receiver<ServerEvent>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender }, receiver)
    }

    /// Create a hook with a bounded channel. Events are dropped while the
    /// channel is full rather than stalling the transport.
    pub fn with_capacity(cap: usize) -> (Self, flume::Receiver<ServerEvent>) {
        let (sender, receiver) = flume::bounded(cap);
        (Self { sender }, receiver)
    }
}

impl ServerHook for FlumeEventHook {
    fn on_event(&self, event: &ServerEvent) {
        if let Err(err) = self.sender.try_send(event.clone()) {
            log::debug!("Server event not delivered: {err}");
        }
    }
}
