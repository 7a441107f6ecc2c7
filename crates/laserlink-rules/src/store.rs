//! Persistent schedule rule storage using redb.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{Result, RuleError};
use crate::rule::{ScheduleRule, ScheduleRuleInput};

/// Rule id → rule JSON.
const RULES_TABLE: TableDefinition<u64, &str> = TableDefinition::new("schedule_rules");

/// Last allocated rule id.
const RULE_SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("rule_sequence");

const SEQUENCE_KEY: &str = "last";

/// Schedule rule store.
pub struct ScheduleRuleStore {
    db: Arc<Database>,
    temp_path: Option<PathBuf>,
}

impl ScheduleRuleStore {
    /// Open or create a rule store at the given path.
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
        let store = Self {
            db: Arc::new(db),
            temp_path: None,
        };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Store on a temporary file, removed when dropped.
    pub fn memory() -> Result<Self> {
        let temp_path =
            std::env::temp_dir().join(format!("laserlink_rules_{}.redb", uuid::Uuid::new_v4()));
        let db = Database::create(&temp_path)?;
        let store = Self {
            db: Arc::new(db),
            temp_path: Some(temp_path),
        };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&self) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let _rules = write_txn.open_table(RULES_TABLE)?;
            let _sequence = write_txn.open_table(RULE_SEQUENCE_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Create or replace a rule. Without an id a new one is allocated.
    pub fn upsert(&self, input: ScheduleRuleInput) -> Result<ScheduleRule> {
        let write_txn = self.db.begin_write()?;
        let rule = {
            let mut rules = write_txn.open_table(RULES_TABLE)?;
            let mut sequence = write_txn.open_table(RULE_SEQUENCE_TABLE)?;
            let last = sequence.get(SEQUENCE_KEY)?.map(|v| v.value()).unwrap_or(0);

            let (id, created_at) = match input.id {
                Some(id) => {
                    let existing = rules.get(id)?.map(|v| v.value().to_string());
                    let created_at = match existing {
                        Some(json) => Some(serde_json::from_str::<ScheduleRule>(&json)?.created_at),
                        None => None,
                    };
                    (id, created_at)
                }
                None => (last + 1, None),
            };

            let rule = input.into_rule(id, created_at)?;
            let json = serde_json::to_string(&rule)?;
            rules.insert(id, json.as_str())?;
            if id > last {
                sequence.insert(SEQUENCE_KEY, id)?;
            }
            rule
        };
        write_txn.commit()?;

        tracing::info!(
            rule_id = rule.id,
            device = rule.device_id.as_deref().unwrap_or("*"),
            window = %rule.window_label(),
            priority = rule.priority,
            "Saved schedule rule"
        );
        Ok(rule)
    }

    pub fn get(&self, id: u64) -> Result<Option<ScheduleRule>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RULES_TABLE)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_str(value.value())?)),
            None => Ok(None),
        }
    }

    /// All rules ordered by id.
    pub fn list(&self) -> Result<Vec<ScheduleRule>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(RULES_TABLE)?;

        let mut rules = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            match serde_json::from_str::<ScheduleRule>(value.value()) {
                Ok(rule) => rules.push(rule),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable schedule rule"),
            }
        }
        Ok(rules)
    }

    pub fn list_enabled(&self) -> Result<Vec<ScheduleRule>> {
        Ok(self.list()?.into_iter().filter(|r| r.enabled).collect())
    }

    pub fn delete(&self, id: u64) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(RULES_TABLE)?;
            let removed = table.remove(id)?.is_some();
            removed
        };
        write_txn.commit()?;
        if deleted {
            tracing::info!(rule_id = id, "Deleted schedule rule");
            Ok(())
        } else {
            Err(RuleError::NotFound(id))
        }
    }
}

impl Drop for ScheduleRuleStore {
    fn drop(&mut self) {
        if let Some(temp_path) = &self.temp_path {
            let _ = std::fs::remove_file(temp_path);
        }
    }
}
