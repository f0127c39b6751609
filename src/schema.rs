// Table definitions matching `db::SCHEMA_SQL`.

diesel::table! {
    checkpoints (task_id) {
        task_id -> Text,
        status -> Text,
        sequence -> BigInt,
        snapshot -> Text,
        saved_at -> Text,
    }
}

diesel::table! {
    task_events (seq) {
        seq -> BigInt,
        task_id -> Text,
        channel -> Text,
        kind -> Text,
        payload -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    tasks (id) {
        id -> Text,
        query -> Text,
        status -> Text,
        data -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(checkpoints, task_events, tasks,);
