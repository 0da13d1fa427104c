//! Persisted schedule records.
//!
//! # Table design
//!
//! One redb table, named by `scheduler.table_name`, keyed by instance id:
//! ```text
//! key:   instance id (&str)
//! value: JSON-encoded PersistedRecord
//! ```
//!
//! Keys are ordered bytewise, so paging walks ids in lexical order and
//! resumes strictly after the last id returned.

use std::ops::Bound;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{Result, SchedError};
use crate::paths;
use crate::persisted::PersistedRecord;

/// Records fetched per page by [`ScheduleStore::load_all`].
pub const PAGE_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// ScheduleStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorePage {
    pub records: Vec<PersistedRecord>,
    /// Cursor for the next page, `None` once the table is exhausted.
    pub next: Option<String>,
}

pub trait ScheduleStore: Send + Sync {
    /// Up to `limit` records with ids strictly greater than `after`. `limit` must be positive.
    fn page(&self, after: Option<&str>, limit: usize) -> Result<StorePage>;

    fn get(&self, instance_id: &str) -> Result<Option<PersistedRecord>>;

    fn upsert(&self, record: &PersistedRecord) -> Result<()>;

    /// Drain every page.
    fn load_all(&self) -> Result<Vec<PersistedRecord>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.page(cursor.as_deref(), PAGE_SIZE)?;
            all.extend(page.records);
            match page.next {
                Some(next) => cursor = Some(next),
                None => return Ok(all),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RedbScheduleStore
// ---------------------------------------------------------------------------

fn store_err(e: impl std::fmt::Display) -> SchedError {
    SchedError::Store(e.to_string())
}

pub struct RedbScheduleStore {
    db: Database,
    table_name: String,
}

impl RedbScheduleStore {
    /// Open or create the store at `.vmsched/schedules.redb` under `root`.
    pub fn open_in(root: &Path, table_name: &str) -> Result<Self> {
        std::fs::create_dir_all(paths::sched_dir(root))?;
        Self::open(&paths::store_path(root), table_name)
    }

    /// Open or create the redb database at `path`, creating the table if needed.
    pub fn open(path: &Path, table_name: &str) -> Result<Self> {
        if table_name.trim().is_empty() {
            return Err(SchedError::InvalidConfig("table name is empty".to_string()));
        }
        let db = Database::create(path).map_err(store_err)?;
        let store = Self {
            db,
            table_name: table_name.to_string(),
        };
        let wt = store.db.begin_write().map_err(store_err)?;
        wt.open_table(store.table()).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(store)
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn table(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.table_name)
    }
}

impl ScheduleStore for RedbScheduleStore {
    fn page(&self, after: Option<&str>, limit: usize) -> Result<StorePage> {
        if limit == 0 {
            return Err(SchedError::Store("page limit must be at least 1".to_string()));
        }
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(self.table()).map_err(store_err)?;

        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        let mut records = Vec::new();
        let mut more = false;
        for entry in table
            .range::<&str>((lower, Bound::Unbounded))
            .map_err(store_err)?
        {
            if records.len() == limit {
                more = true;
                break;
            }
            let (_, v) = entry.map_err(store_err)?;
            let record: PersistedRecord = serde_json::from_slice(v.value()).map_err(store_err)?;
            records.push(record);
        }

        let next = if more {
            records.last().map(|r| r.instance_id.clone())
        } else {
            None
        };
        Ok(StorePage { records, next })
    }

    fn get(&self, instance_id: &str) -> Result<Option<PersistedRecord>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(self.table()).map_err(store_err)?;
        match table.get(instance_id).map_err(store_err)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value()).map_err(store_err)?)),
            None => Ok(None),
        }
    }

    fn upsert(&self, record: &PersistedRecord) -> Result<()> {
        paths::validate_resource_id(&record.instance_id)?;
        let value = serde_json::to_vec(record).map_err(store_err)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(self.table()).map_err(store_err)?;
            table
                .insert(record.instance_id.as_str(), value.as_slice())
                .map_err(store_err)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
