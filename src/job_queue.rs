//! Run Queue Worker (C8). Drains `scenario_run_queue` messages into an
//! in-process channel and, for each one, claims and drives the referenced
//! `ScenarioRun` through the Orchestrator (spec.md §4.8). Generalizes the
//! teacher's `job_queue::start_worker` shape (Postgres-backed queue table
//! replayed into a `tokio::sync::mpsc` channel on startup, then drained by a
//! long-running task) to scenario runs instead of server lifecycle jobs.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

use crate::config::RUN_WORKER_CONCURRENCY;
use crate::db;
use crate::orchestrator::{self, RunContext};

/// One durable message: "drive this scenario run". Mirrors the broker wire
/// shape `{"scenario_run_id": <int>}` from spec.md §6.
#[derive(Debug, Clone, Copy)]
pub struct Job {
    pub queue_id: i32,
    pub scenario_run_id: i64,
}

/// Spawns the replay loop (picks up rows left by a prior process) and the
/// consumer loop (claims + drives each run, then acks). Returns a sender so
/// HTTP handlers can enqueue a freshly created run without waiting for the
/// next poll tick.
pub fn start_worker(pool: PgPool) -> Sender<Job> {
    let (tx, rx): (Sender<Job>, Receiver<Job>) = channel(64);

    let replay_pool = pool.clone();
    let replay_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            for message in db::scenario_run_queue::fetch_queued(&replay_pool).await {
                db::scenario_run_queue::mark_processing(&replay_pool, message.id).await;
                let _ = replay_tx
                    .send(Job {
                        queue_id: message.id,
                        scenario_run_id: message.scenario_run_id,
                    })
                    .await;
            }
            sleep(Duration::from_secs(2)).await;
        }
    });

    spawn_consumers(pool, rx);
    tx
}

/// Enqueue a freshly created `ScenarioRun` for execution, mirroring the
/// teacher's `enqueue_job` — persist first (so a crash before the in-memory
/// send still survives via replay), then nudge the in-process channel.
pub async fn enqueue(pool: &PgPool, tx: &Sender<Job>, scenario_run_id: i64) {
    db::scenario_run_queue::enqueue(pool, scenario_run_id).await;
    // Best-effort: if this send is dropped (channel full/closed) the replay
    // loop still picks the row up on its next tick.
    let _ = tx.try_send(Job { queue_id: -1, scenario_run_id });
}

/// Spawns `RUN_WORKER_CONCURRENCY` consumer tasks sharing one channel, so up
/// to that many scenario runs drive concurrently (spec.md §5).
fn spawn_consumers(pool: PgPool, rx: Receiver<Job>) {
    let rx = Arc::new(Mutex::new(rx));
    for _ in 0..*RUN_WORKER_CONCURRENCY {
        let pool = pool.clone();
        let rx = rx.clone();
        tokio::spawn(async move {
            loop {
                let job = { rx.lock().await.recv().await };
                match job {
                    Some(job) => handle_one(&pool, job).await,
                    None => break,
                }
            }
        });
    }
}

/// Steps 1-7 of spec.md §4.8, in order. Every branch acknowledges
/// (deletes the queue row) before returning, except the replay-only
/// `queue_id == -1` sentinel used for the optimistic nudge in `enqueue`,
/// which has no row of its own to delete.
async fn handle_one(pool: &PgPool, job: Job) {
    let ack = |id: i32| async move {
        if id >= 0 {
            db::scenario_run_queue::ack(pool, id).await;
        }
    };

    let Ok(Some(scenario_run)) = db::scenario_runs::get(pool, job.scenario_run_id).await else {
        ack(job.queue_id).await;
        return;
    };

    let status = crate::models::RunStatus::parse(&scenario_run.run_status);
    if status.is_terminal() {
        ack(job.queue_id).await;
        return;
    }
    if status == crate::models::RunStatus::Running {
        ack(job.queue_id).await;
        return;
    }
    if scenario_run.cancel_requested {
        let _ = db::scenario_runs::cancel_before_claim(pool, job.scenario_run_id, "scenario run canceled").await;
        ack(job.queue_id).await;
        return;
    }

    match db::scenario_runs::try_claim(pool, job.scenario_run_id).await {
        Ok(true) => {}
        Ok(false) => {
            ack(job.queue_id).await;
            return;
        }
        Err(_) => {
            ack(job.queue_id).await;
            return;
        }
    }

    let scenario = match db::scenarios::get(pool, scenario_run.scenario_id).await {
        Ok(Some(scenario)) => scenario,
        _ => {
            let _ = db::scenario_runs::mark_failed(pool, job.scenario_run_id, "scenario not found").await;
            ack(job.queue_id).await;
            return;
        }
    };

    let ctx = RunContext { pool: pool.clone(), scenario_run_id: job.scenario_run_id };
    if let Err(err) = orchestrator::run(&ctx, &scenario).await {
        tracing::error!(?err, scenario_run_id = job.scenario_run_id, "orchestrator run failed");
        let _ = db::scenario_runs::mark_failed(pool, job.scenario_run_id, &err.to_string()).await;
    }

    ack(job.queue_id).await;
}
