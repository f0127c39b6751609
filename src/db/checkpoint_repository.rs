use crate::core::Checkpoint;
use crate::db::models::CheckpointRow;
use crate::db::Database;
use crate::errors::StoreError;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

/// Replaces the stored checkpoint of `checkpoint.task_id` (last write wins)
pub(crate) fn upsert_checkpoint(
    conn: &mut SqliteConnection,
    checkpoint: &Checkpoint,
) -> Result<(), StoreError> {
    use crate::schema::checkpoints;

    let row = CheckpointRow {
        task_id: checkpoint.task_id.clone(),
        status: checkpoint.record.status.as_str().to_string(),
        sequence: checkpoint.sequence as i64,
        snapshot: serde_json::to_string(&checkpoint.record)?,
        saved_at: checkpoint.saved_at.to_rfc3339(),
    };
    diesel::replace_into(checkpoints::table)
        .values(&row)
        .execute(conn)?;
    Ok(())
}

/// Read side of the checkpoint table, plus standalone saves for callers that
/// do not go through `TaskRepository::commit_step`.
#[derive(Clone, Debug)]
pub struct CheckpointRepository {
    database: Database,
}

impl CheckpointRepository {
    pub fn new(database: Database) -> Self {
        CheckpointRepository { database }
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let mut conn = self.database.get_conn()?;
        upsert_checkpoint(&mut conn, checkpoint)
    }

    /// Loads the latest checkpoint of a task, if one was ever written
    pub fn load(&self, task_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        use crate::schema::checkpoints;

        let mut conn = self.database.get_conn()?;
        let row = checkpoints::table
            .filter(checkpoints::task_id.eq(task_id))
            .first::<CheckpointRow>(&mut conn)
            .optional()?;

        match row {
            Some(row) => Ok(Some(Checkpoint {
                task_id: row.task_id,
                sequence: row.sequence.max(0) as u64,
                record: serde_json::from_str(&row.snapshot)?,
                saved_at: chrono::DateTime::parse_from_rfc3339(&row.saved_at)
                    .map(|t| t.with_timezone(&chrono::Utc))
                    .map_err(|e| StoreError::InvalidInput(e.to_string()))?,
            })),
            None => Ok(None),
        }
    }

    pub fn delete(&self, task_id: &str) -> Result<(), StoreError> {
        use crate::schema::checkpoints;

        let mut conn = self.database.get_conn()?;
        diesel::delete(checkpoints::table.filter(checkpoints::task_id.eq(task_id)))
            .execute(&mut conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NewTask, OutputFormat, TaskRecord, TaskStatus};
    use crate::db::test_support::{reopen, temp_database};

    fn record() -> TaskRecord {
        TaskRecord::new(
            "cp-1".to_string(),
            NewTask {
                query: "q".to_string(),
                max_iterations: 2,
                output_format: OutputFormat::Html,
                auto_approve: true,
                approval_timeout_secs: 10,
            },
        )
    }

    #[test]
    fn last_write_wins_and_is_visible_to_another_handle() {
        let (dir, db) = temp_database();
        let writer = CheckpointRepository::new(db);

        let first = Checkpoint::initial(record());
        writer.save(&first).unwrap();
        let mut advanced = first.record.clone();
        advanced.status = TaskStatus::Researching;
        advanced.iteration_count = 1;
        let second = first.next(advanced);
        writer.save(&second).unwrap();

        let reader = CheckpointRepository::new(reopen(&dir));
        let loaded = reader.load("cp-1").unwrap().unwrap();
        assert_eq!(loaded.sequence, 1);
        assert_eq!(loaded.record, second.record);
        assert_eq!(loaded.step(), TaskStatus::Researching);

        reader.delete("cp-1").unwrap();
        assert!(writer.load("cp-1").unwrap().is_none());
    }
}
