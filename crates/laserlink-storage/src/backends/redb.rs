//! Redb event log.
//!
//! Tables:
//! - `events`: `(device, id)` → event JSON, so "device after cursor" is one range scan
//! - `event_sequence`: the last allocated global id
//! - `device_summaries`: device → [`DeviceSummary`] JSON
//!
//! All three are written in the same transaction, so a crash never leaves a
//! gap between the sequence and the rows it handed out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use laserlink_core::{Command, CommandKind, Event, EventId};

use crate::error::{Error, Result};
use crate::event_log::{DeviceSummary, EventLog};

const EVENTS_TABLE: TableDefinition<(&str, u64), &str> = TableDefinition::new("events");

const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("event_sequence");

const SUMMARIES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("device_summaries");

const SEQUENCE_KEY: &str = "last";

/// Event log backed by a redb file.
pub struct RedbEventLog {
    db: Arc<Database>,
    path: PathBuf,
    /// Set for throw-away databases removed on drop.
    temp_path: Option<PathBuf>,
}

impl RedbEventLog {
    /// Open or create the log at `path`, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = if path_ref.exists() {
            Database::open(path_ref)?
        } else {
            Database::create(path_ref)?
        };
        let log = Self {
            db: Arc::new(db),
            path: path_ref.to_path_buf(),
            temp_path: None,
        };
        log.ensure_tables()?;
        tracing::info!(path = %path_ref.display(), "Opened event log");
        Ok(log)
    }

    /// Open a log on a fresh temporary file, deleted when dropped.
    pub fn memory() -> Result<Self> {
        let temp_path =
            std::env::temp_dir().join(format!("laserlink_events_{}.redb", uuid::Uuid::new_v4()));
        let db = Database::create(&temp_path)?;
        let log = Self {
            db: Arc::new(db),
            path: temp_path.clone(),
            temp_path: Some(temp_path),
        };
        log.ensure_tables()?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_tables(&self) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let _events = write_txn.open_table(EVENTS_TABLE)?;
            let _sequence = write_txn.open_table(SEQUENCE_TABLE)?;
            let _summaries = write_txn.open_table(SUMMARIES_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl EventLog for RedbEventLog {
    fn append_batch(&self, device: &str, commands: &[Command]) -> Result<Vec<Event>> {
        if commands.is_empty() {
            return Err(Error::InvalidInput("empty batch".to_string()));
        }

        let ts = Utc::now();
        let mut appended = Vec::with_capacity(commands.len());

        let write_txn = self.db.begin_write()?;
        {
            let mut sequence = write_txn.open_table(SEQUENCE_TABLE)?;
            let mut events = write_txn.open_table(EVENTS_TABLE)?;
            let mut summaries = write_txn.open_table(SUMMARIES_TABLE)?;

            let mut next_id = sequence.get(SEQUENCE_KEY)?.map(|v| v.value()).unwrap_or(0);
            for command in commands {
                next_id += 1;
                let event = Event {
                    id: next_id,
                    device: device.to_string(),
                    ts,
                    command: command.clone(),
                };
                let json = serde_json::to_string(&event)?;
                events.insert((device, next_id), json.as_str())?;
                appended.push(event);
            }
            sequence.insert(SEQUENCE_KEY, next_id)?;

            let previous = summaries.get(device)?.map(|v| v.value().to_string());
            let event_count = match previous {
                Some(json) => serde_json::from_str::<DeviceSummary>(&json)?.event_count,
                None => 0,
            } + commands.len() as u64;
            let summary = DeviceSummary {
                device: device.to_string(),
                last_id: next_id,
                last_event_at: ts,
                event_count,
            };
            let json = serde_json::to_string(&summary)?;
            summaries.insert(device, json.as_str())?;
        }
        write_txn.commit()?;

        tracing::debug!(
            device = %device,
            count = appended.len(),
            last_id = appended.last().map(|e| e.id).unwrap_or_default(),
            "Appended events"
        );
        Ok(appended)
    }

    fn query_after(
        &self,
        device: &str,
        cursor: EventId,
        limit: usize,
        exclude: &[CommandKind],
    ) -> Result<Vec<Event>> {
        let mut out = Vec::new();
        if limit == 0 || cursor == EventId::MAX {
            return Ok(out);
        }

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EVENTS_TABLE)?;
        let start = (device, cursor + 1);
        let end = (device, EventId::MAX);

        for result in table.range(start..=end)? {
            let (_key, value) = result?;
            let event: Event = serde_json::from_str(value.value())?;
            if exclude.contains(&event.kind()) {
                continue;
            }
            out.push(event);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    fn last_id(&self, device: &str) -> Result<EventId> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EVENTS_TABLE)?;
        let last = table.range((device, 0)..=(device, EventId::MAX))?.next_back();
        match last {
            Some(result) => {
                let (key, _value) = result?;
                Ok(key.value().1)
            }
            None => Ok(0),
        }
    }

    fn last_event(&self, device: &str, exclude: &[CommandKind]) -> Result<Option<Event>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EVENTS_TABLE)?;

        for result in table.range((device, 0)..=(device, EventId::MAX))?.rev() {
            let (_key, value) = result?;
            let event: Event = serde_json::from_str(value.value())?;
            if !exclude.contains(&event.kind()) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    fn list_devices(&self, limit: usize) -> Result<Vec<DeviceSummary>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SUMMARIES_TABLE)?;

        let mut summaries = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            match serde_json::from_str::<DeviceSummary>(value.value()) {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable device summary"),
            }
        }

        summaries.sort_by(|a, b| b.last_id.cmp(&a.last_id));
        summaries.truncate(limit);
        Ok(summaries)
    }
}

impl Drop for RedbEventLog {
    fn drop(&mut self) {
        if let Some(temp_path) = &self.temp_path {
            if let Err(e) = std::fs::remove_file(temp_path) {
                tracing::debug!(
                    "Failed to remove temporary event log {}: {}",
                    temp_path.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_global_and_increasing() {
        let log = RedbEventLog::memory().unwrap();
        let a = log.append("D1", Command::scene("1")).unwrap();
        let b = log.append("D2", Command::Off).unwrap();
        let c = log.append("D1", Command::raw("1 0")).unwrap();
        assert_eq!((a.id, b.id, c.id), (1, 2, 3));
        assert_eq!(log.last_id("D1").unwrap(), 3);
        assert_eq!(log.last_id("D2").unwrap(), 2);
        assert_eq!(log.last_id("nobody").unwrap(), 0);
    }

    #[test]
    fn test_batch_shares_timestamp() {
        let log = RedbEventLog::memory().unwrap();
        let events = log
            .append_batch("D1", &[Command::Hang, Command::SimOn, Command::Get])
            .unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.ts == events[0].ts));
        assert!(log.append_batch("D1", &[]).is_err());
    }

    #[test]
    fn test_device_prefixes_do_not_collide() {
        let log = RedbEventLog::memory().unwrap();
        log.append("D1", Command::Hang).unwrap();
        log.append("D10", Command::SimOn).unwrap();
        let d1 = log.query_after("D1", 0, 10, &[]).unwrap();
        assert_eq!(d1.len(), 1);
        assert_eq!(d1[0].kind(), CommandKind::Hang);
    }

    #[test]
    fn test_reopen_keeps_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.redb");
        {
            let log = RedbEventLog::open(&path).unwrap();
            log.append("D1", Command::Hang).unwrap();
        }
        let log = RedbEventLog::open(&path).unwrap();
        let event = log.append("D1", Command::SimOn).unwrap();
        assert_eq!(event.id, 2);
    }
}
