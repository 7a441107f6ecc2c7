//! Shared server state.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};

use laserlink_commands::RelayServices;
use laserlink_core::RelayConfig;
use laserlink_rules::{ScheduleEngine, ScheduleRuleStore};
use laserlink_storage::{EventLog, RedbEventLog};

/// Maximum request body size (256 KiB).
pub const MAX_REQUEST_BODY_SIZE: usize = 256 * 1024;

/// State shared across all handlers.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<RelayConfig>,
    /// Event log, device runtimes, poller and dispatcher.
    pub services: RelayServices,
    pub schedules: Arc<ScheduleEngine>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    /// Wire the services around an already opened log and rule store.
    pub fn new(
        config: RelayConfig,
        log: Arc<dyn EventLog>,
        rules: Arc<ScheduleRuleStore>,
    ) -> anyhow::Result<Self> {
        let timezone = config.schedule.tz()?;
        let services = RelayServices::new(log, config.poll.clone(), config.macros.clone());
        let schedules = Arc::new(ScheduleEngine::new(
            rules,
            services.dispatcher.clone(),
            services.registry.clone(),
            timezone,
            config.schedule.tick_interval(),
        ));
        Ok(Self {
            config: Arc::new(config),
            services,
            schedules,
            started_at: Utc::now(),
        })
    }

    /// Open the redb files under `config.data_dir`.
    pub fn open(config: RelayConfig) -> anyhow::Result<Self> {
        let events_path = config.events_db_path();
        let log = RedbEventLog::open(&events_path)
            .with_context(|| format!("Failed to open event log at {}", events_path.display()))?;

        let rules_path = config.schedules_db_path();
        let rules = ScheduleRuleStore::open(&rules_path)
            .with_context(|| format!("Failed to open rule store at {}", rules_path.display()))?;

        tracing::info!(
            events = %events_path.display(),
            rules = %rules_path.display(),
            "Opened storage"
        );
        Self::new(config, Arc::new(log), Arc::new(rules))
    }

    /// Temporary storage, removed when the state is dropped.
    pub fn memory(config: RelayConfig) -> anyhow::Result<Self> {
        let log = RedbEventLog::memory()?;
        let rules = ScheduleRuleStore::memory()?;
        Self::new(config, Arc::new(log), Arc::new(rules))
    }

    /// Token required on admin routes, if any.
    pub fn admin_token(&self) -> Option<&str> {
        self.config.admin_token()
    }
}
