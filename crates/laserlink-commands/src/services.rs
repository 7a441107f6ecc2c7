//! Wiring of the command path components.

use std::sync::Arc;

use laserlink_core::{MacroConfig, PollConfig};
use laserlink_storage::EventLog;

use crate::dispatcher::Dispatcher;
use crate::macros::MacroSequencer;
use crate::poll::LongPollCoordinator;
use crate::runtime::DeviceRegistry;
use crate::writer::EventWriter;

/// The registry, poller and dispatcher sharing one event log.
#[derive(Clone)]
pub struct RelayServices {
    pub log: Arc<dyn EventLog>,
    pub registry: Arc<DeviceRegistry>,
    pub poller: Arc<LongPollCoordinator>,
    pub dispatcher: Arc<Dispatcher>,
}

impl RelayServices {
    pub fn new(log: Arc<dyn EventLog>, poll: PollConfig, macros: MacroConfig) -> Self {
        let registry = Arc::new(DeviceRegistry::new(log.clone(), poll.tail_cache_size));
        let writer = Arc::new(EventWriter::new(log.clone(), registry.clone()));
        let sequencer = Arc::new(MacroSequencer::new(writer.clone(), macros));
        let dispatcher = Arc::new(Dispatcher::new(writer, sequencer));
        let poller = Arc::new(LongPollCoordinator::new(registry.clone(), log.clone(), poll));
        Self {
            log,
            registry,
            poller,
            dispatcher,
        }
    }

    /// Cancel running macros; called on shutdown.
    pub fn shutdown(&self) {
        self.dispatcher.macros().shutdown();
    }
}
