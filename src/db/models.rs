use crate::schema::{checkpoints, task_events, tasks};
use diesel::{AsChangeset, Insertable, Queryable};

/// Row of the `tasks` table. `data` holds the JSON object of every task field;
/// `query`, `status` and the timestamps are denormalized for listing.
#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = tasks)]
pub struct TaskRow {
    pub id: String,
    pub query: String,
    pub status: String,
    pub data: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Row of the `checkpoints` table; one per task, replaced on every write
#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = checkpoints)]
pub struct CheckpointRow {
    pub task_id: String,
    pub status: String,
    pub sequence: i64,
    pub snapshot: String,
    pub saved_at: String,
}

/// Row of the `task_events` outbox
#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = task_events)]
pub struct EventRow {
    pub seq: i64,
    pub task_id: String,
    pub channel: String,
    pub kind: String,
    pub payload: String,
    pub created_at: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = task_events)]
pub struct NewEventRow<'a> {
    pub task_id: &'a str,
    pub channel: &'a str,
    pub kind: &'a str,
    pub payload: &'a str,
    pub created_at: &'a str,
}
