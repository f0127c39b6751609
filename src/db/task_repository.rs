use crate::core::{Checkpoint, TaskRecord, TaskStatus};
use crate::db::checkpoint_repository::upsert_checkpoint;
use crate::db::models::TaskRow;
use crate::db::patch::Patch;
use crate::db::Database;
use crate::errors::StoreError;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// In-process mutual exclusion per task id. Cross-process exclusion comes
/// from the IMMEDIATE transaction each write runs in.
#[derive(Debug, Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let result = {
            let _guard = entry.lock().unwrap_or_else(|p| p.into_inner());
            f()
        };

        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // map + this call are the only holders: nobody else is queued on it
        if Arc::strong_count(&entry) == 2 {
            locks.remove(key);
        }
        result
    }
}

/// Durable store of task records, shared by the engine, the approval path
/// and the API.
///
/// Every write is a read-modify-write of the JSON `data` column performed
/// under a per-id lock and inside an SQLite IMMEDIATE transaction, so
/// concurrent writers touching disjoint fields never lose each other's
/// updates, in this process or in another one.
#[derive(Clone, Debug)]
pub struct TaskRepository {
    database: Database,
    locks: Arc<KeyedLocks>,
}

impl TaskRepository {
    pub fn new(database: Database) -> Self {
        TaskRepository {
            database,
            locks: Arc::new(KeyedLocks::default()),
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Inserts a new task record
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidInput` if a record with the same id exists
    pub fn create(&self, record: &TaskRecord) -> Result<(), StoreError> {
        use crate::schema::tasks;

        let row = TaskRow {
            id: record.id.clone(),
            query: record.query.clone(),
            status: record.status.as_str().to_string(),
            data: serde_json::to_string(record)?,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        };

        let mut conn = self.database.get_conn()?;
        conn.immediate_transaction::<_, StoreError, _>(|conn| {
            let exists = tasks::table
                .filter(tasks::id.eq(&row.id))
                .count()
                .get_result::<i64>(conn)?;
            if exists > 0 {
                return Err(StoreError::InvalidInput(format!(
                    "task {} already exists",
                    row.id
                )));
            }
            diesel::insert_into(tasks::table).values(&row).execute(conn)?;
            Ok(())
        })?;

        debug!("Created task record {}", record.id);
        Ok(())
    }

    /// Retrieves a task record by id
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no record exists
    pub fn get(&self, id: &str) -> Result<TaskRecord, StoreError> {
        let mut conn = self.database.get_conn()?;
        let row = load_row(&mut conn, id)?;
        Ok(serde_json::from_str(&row.data)?)
    }

    /// Shallow-merges `patch` into the stored record and returns the result
    pub fn put(&self, id: &str, patch: &Patch) -> Result<TaskRecord, StoreError> {
        self.put_guarded(id, patch, |_| true)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Like `put`, but the merge only happens when `guard` accepts the record
    /// read inside the transaction.
    ///
    /// # Arguments
    ///
    /// * `id` - Task id
    /// * `patch` - Fields to overwrite
    /// * `guard` - Predicate evaluated against the current record
    ///
    /// # Returns
    ///
    /// `Some(updated record)` when the patch was written, `None` when the
    /// guard refused it
    pub fn put_guarded<G>(
        &self,
        id: &str,
        patch: &Patch,
        guard: G,
    ) -> Result<Option<TaskRecord>, StoreError>
    where
        G: FnOnce(&TaskRecord) -> bool,
    {
        self.locks.with_lock(id, || {
            let mut conn = self.database.get_conn()?;
            conn.immediate_transaction::<_, StoreError, _>(|conn| merge_in_tx(conn, id, patch, guard))
        })
    }

    /// Writes the engine's step patch and its checkpoint atomically.
    ///
    /// Refused (returns `false`) when the task was cancelled concurrently, in
    /// which case neither the patch nor the checkpoint is written.
    pub fn commit_step(
        &self,
        id: &str,
        patch: &Patch,
        checkpoint: &Checkpoint,
    ) -> Result<bool, StoreError> {
        self.locks.with_lock(id, || {
            let mut conn = self.database.get_conn()?;
            conn.immediate_transaction::<_, StoreError, _>(|conn| {
                let merged = merge_in_tx(conn, id, patch, |current| {
                    current.status != TaskStatus::Cancelled
                })?;
                if merged.is_none() {
                    return Ok(false);
                }
                upsert_checkpoint(conn, checkpoint)?;
                Ok(true)
            })
        })
    }

    /// Task history, newest first
    ///
    /// # Returns
    ///
    /// The total number of tasks and the requested page
    pub fn list(&self, limit: i64, offset: i64) -> Result<(i64, Vec<TaskRecord>), StoreError> {
        use crate::schema::tasks;

        let mut conn = self.database.get_conn()?;
        let total = tasks::table.count().get_result::<i64>(&mut conn)?;
        let rows = tasks::table
            .order(tasks::created_at.desc())
            .limit(limit)
            .offset(offset)
            .load::<TaskRow>(&mut conn)?;

        let records = rows
            .iter()
            .map(|row| serde_json::from_str(&row.data))
            .collect::<Result<Vec<TaskRecord>, _>>()?;
        Ok((total, records))
    }

    /// Tasks currently in any of `statuses`, oldest first
    pub fn list_by_status(&self, statuses: &[TaskStatus]) -> Result<Vec<TaskRecord>, StoreError> {
        use crate::schema::tasks;

        let wanted: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let mut conn = self.database.get_conn()?;
        let rows = tasks::table
            .filter(tasks::status.eq_any(wanted))
            .order(tasks::created_at.asc())
            .load::<TaskRow>(&mut conn)?;

        rows.iter()
            .map(|row| serde_json::from_str(&row.data).map_err(StoreError::from))
            .collect()
    }

    /// Atomically claims an unclaimed pending task for `worker_id`
    pub fn claim(&self, id: &str, worker_id: &str) -> Result<bool, StoreError> {
        let patch = Patch::new().set("claimed_by", worker_id);
        let claimed = self.put_guarded(id, &patch, |current| {
            current.status == TaskStatus::Pending && current.claimed_by.is_none()
        })?;
        Ok(claimed.is_some())
    }
}

fn load_row(conn: &mut SqliteConnection, id: &str) -> Result<TaskRow, StoreError> {
    use crate::schema::tasks;

    tasks::table
        .filter(tasks::id.eq(id))
        .first::<TaskRow>(conn)
        .optional()?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
}

fn merge_in_tx<G>(
    conn: &mut SqliteConnection,
    id: &str,
    patch: &Patch,
    guard: G,
) -> Result<Option<TaskRecord>, StoreError>
where
    G: FnOnce(&TaskRecord) -> bool,
{
    use crate::schema::tasks;

    let row = load_row(conn, id)?;
    let mut fields: Map<String, Value> = serde_json::from_str(&row.data)?;
    let current: TaskRecord = serde_json::from_value(Value::Object(fields.clone()))?;
    if !guard(&current) {
        return Ok(None);
    }

    let now = Utc::now();
    patch.apply_to(&mut fields);
    fields.insert("id".to_string(), Value::String(row.id.clone()));
    fields.insert("updated_at".to_string(), serde_json::to_value(now)?);

    let updated: TaskRecord = serde_json::from_value(Value::Object(fields.clone()))?;
    diesel::update(tasks::table.filter(tasks::id.eq(id)))
        .set((
            tasks::status.eq(updated.status.as_str()),
            tasks::data.eq(Value::Object(fields).to_string()),
            tasks::updated_at.eq(now.to_rfc3339()),
        ))
        .execute(conn)?;

    Ok(Some(updated))
}
