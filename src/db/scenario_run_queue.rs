use sqlx::{PgPool, Row};

/// Persist a `scenario_run_id` message to the broker table so it survives a
/// process restart before a worker picks it up (spec.md §4.8/§5, the same
/// durability shape as the teacher's `job_queue` table).
pub async fn enqueue(pool: &PgPool, scenario_run_id: i64) {
    let _ = sqlx::query("INSERT INTO scenario_run_queue (scenario_run_id, status) VALUES ($1, 'queued')")
        .bind(scenario_run_id)
        .execute(pool)
        .await;
}

pub struct QueuedMessage {
    pub id: i32,
    pub scenario_run_id: i64,
}

pub async fn fetch_queued(pool: &PgPool) -> Vec<QueuedMessage> {
    sqlx::query("SELECT id, scenario_run_id FROM scenario_run_queue WHERE status = 'queued' ORDER BY id")
        .fetch_all(pool)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|row| QueuedMessage {
            id: row.get("id"),
            scenario_run_id: row.get("scenario_run_id"),
        })
        .collect()
}

pub async fn mark_processing(pool: &PgPool, id: i32) {
    let _ = sqlx::query("UPDATE scenario_run_queue SET status = 'processing' WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await;
}

/// Acknowledge (delete) the message. Ack happens only after the message has
/// been fully handled — late-ack, never prefetch-ahead (spec.md §5).
pub async fn ack(pool: &PgPool, id: i32) {
    let _ = sqlx::query("DELETE FROM scenario_run_queue WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await;
}
