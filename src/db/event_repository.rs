use crate::db::models::{EventRow, NewEventRow};
use crate::core::TaskStatus;
use crate::db::Database;
use crate::errors::StoreError;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Append-only outbox of task events, read by sequence number.
#[derive(Clone, Debug)]
pub struct EventRepository {
    database: Database,
}

impl EventRepository {
    pub fn new(database: Database) -> Self {
        EventRepository { database }
    }

    pub fn append(
        &self,
        task_id: &str,
        channel: &str,
        kind: &str,
        payload: &str,
    ) -> Result<(), StoreError> {
        use crate::schema::task_events;

        let created_at = Utc::now().to_rfc3339();
        let row = NewEventRow {
            task_id,
            channel,
            kind,
            payload,
            created_at: &created_at,
        };
        let mut conn = self.database.get_conn()?;
        diesel::insert_into(task_events::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    /// Events with a sequence number above `after_seq`, optionally limited to
    /// one channel, in insertion order
    pub fn read_after(
        &self,
        after_seq: i64,
        channel: Option<&str>,
        limit: i64,
    ) -> Result<Vec<EventRow>, StoreError> {
        use crate::schema::task_events;

        let mut conn = self.database.get_conn()?;
        let mut query = task_events::table
            .filter(task_events::seq.gt(after_seq))
            .into_boxed();
        if let Some(channel) = channel {
            query = query.filter(task_events::channel.eq(channel.to_string()));
        }
        Ok(query
            .order(task_events::seq.asc())
            .limit(limit)
            .load::<EventRow>(&mut conn)?)
    }

    /// Deletes the events of finished tasks written before `older_than`.
    /// Events of unfinished tasks are kept however old they are.
    ///
    /// # Returns
    ///
    /// The number of deleted events
    pub fn prune_finished(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        use crate::schema::{task_events, tasks};

        let finished: Vec<&str> = TaskStatus::ALL
            .iter()
            .filter(|status| status.is_terminal())
            .map(|status| status.as_str())
            .collect();
        let finished_tasks = tasks::table
            .filter(tasks::status.eq_any(finished))
            .select(tasks::id);

        let mut conn = self.database.get_conn()?;
        Ok(diesel::delete(
            task_events::table
                .filter(task_events::created_at.lt(older_than.to_rfc3339()))
                .filter(task_events::task_id.eq_any(finished_tasks)),
        )
        .execute(&mut conn)?)
    }

    /// Highest sequence number written so far, 0 when the outbox is empty
    pub fn last_seq(&self) -> Result<i64, StoreError> {
        use crate::schema::task_events;
        use diesel::dsl::max;

        let mut conn = self.database.get_conn()?;
        let last = task_events::table
            .select(max(task_events::seq))
            .first::<Option<i64>>(&mut conn)?;
        Ok(last.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NewTask, OutputFormat, TaskRecord};
    use crate::db::test_support::temp_database;
    use crate::db::{Patch, TaskRepository};

    #[test]
    fn reads_filter_by_channel_and_sequence() {
        let (_dir, db) = temp_database();
        let events = EventRepository::new(db);
        assert_eq!(events.last_seq().unwrap(), 0);

        events.append("a", "tasks:updates:a", "progress", "{}").unwrap();
        events.append("b", "tasks:updates:b", "progress", "{}").unwrap();
        events.append("a", "tasks:updates:a", "report_ready", "{}").unwrap();

        let all = events.read_after(0, None, 100).unwrap();
        assert_eq!(all.len(), 3);

        let only_a = events.read_after(0, Some("tasks:updates:a"), 100).unwrap();
        let kinds: Vec<_> = only_a.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["progress", "report_ready"]);

        let tail = events.read_after(only_a[0].seq, Some("tasks:updates:a"), 100).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(events.last_seq().unwrap(), all[2].seq);
    }

    #[test]
    fn pruning_removes_only_old_events_of_finished_tasks() {
        let (_dir, db) = temp_database();
        let tasks = TaskRepository::new(db.clone());
        for id in ["done", "open"] {
            tasks
                .create(&TaskRecord::new(
                    id.to_string(),
                    NewTask {
                        query: "q".to_string(),
                        max_iterations: 1,
                        output_format: OutputFormat::Markdown,
                        auto_approve: true,
                        approval_timeout_secs: 300,
                    },
                ))
                .unwrap();
        }
        tasks
            .put("done", &Patch::new().set("status", &TaskStatus::Completed))
            .unwrap();

        let events = EventRepository::new(db);
        events.append("done", "tasks:updates:done", "report_ready", "{}").unwrap();
        events.append("open", "tasks:updates:open", "plan_ready", "{}").unwrap();

        // nothing is old enough yet
        let past = Utc::now() - chrono::Duration::days(1);
        assert_eq!(events.prune_finished(past).unwrap(), 0);

        let future = Utc::now() + chrono::Duration::seconds(5);
        assert_eq!(events.prune_finished(future).unwrap(), 1);
        let left = events.read_after(0, None, 100).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].task_id, "open");
    }
}
