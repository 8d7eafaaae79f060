//! Background Elo updater (spec §4.3): picks are the hot path, so rating
//! updates are queued here instead of being applied inline on the request.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use decided_core::elo::apply_pick_result;
use decided_core::ids::{MovieId, UserId};
use tokio::time::Instant;

/// One resolved bracket pick: `selected` beat `rejected` for `user_id`.
#[derive(Debug, Clone)]
pub struct EloJob {
    pub user_id: UserId,
    pub selected_movie_id: MovieId,
    pub rejected_movie_id: MovieId,
}

const COALESCE_WINDOW: Duration = Duration::from_millis(200);

pub fn channel(capacity: usize) -> (async_channel::Sender<EloJob>, async_channel::Receiver<EloJob>) {
    async_channel::bounded(capacity.max(1))
}

/// The sender half plus one spare receiver clone, held process-wide so
/// `actions.rs` can enqueue jobs without threading the channel through
/// every call site. `init` is called once from `main` before `run` starts
/// draining the primary receiver.
static CHANNEL: OnceLock<(async_channel::Sender<EloJob>, async_channel::Receiver<EloJob>)> = OnceLock::new();

pub fn init(capacity: usize) -> async_channel::Receiver<EloJob> {
    let (tx, rx) = channel(capacity);
    let spare = rx.clone();
    CHANNEL.set((tx, spare)).ok();
    rx
}

fn channel_handles() -> &'static (async_channel::Sender<EloJob>, async_channel::Receiver<EloJob>) {
    CHANNEL.get().expect("elo_worker::init should run before enqueue")
}

pub fn enqueue(job: EloJob) {
    let (tx, spare_rx) = channel_handles();
    try_enqueue(tx, spare_rx, job);
}

/// Enqueues `job`, dropping the oldest queued job and logging a warning if
/// the queue is full (spec §4.3). `async-channel`'s `Sender` has no eviction
/// primitive of its own, so this keeps a spare `Receiver` around purely to
/// pop one item off the front before retrying the send.
pub fn try_enqueue(tx: &async_channel::Sender<EloJob>, spare_rx: &async_channel::Receiver<EloJob>, job: EloJob) {
    match tx.try_send(job) {
        Ok(()) => {}
        Err(async_channel::TrySendError::Full(job)) => {
            if spare_rx.try_recv().is_ok() {
                tracing::warn!("elo queue full, dropped oldest job");
            }
            if tx.try_send(job).is_err() {
                tracing::warn!("elo queue still full after eviction, dropping incoming job");
            }
        }
        Err(async_channel::TrySendError::Closed(_)) => {
            tracing::error!("elo worker channel closed, job dropped");
        }
    }
}

fn coalesce_key(job: &EloJob) -> (UserId, MovieId, MovieId) {
    (job.user_id, job.selected_movie_id.clone(), job.rejected_movie_id.clone())
}

/// Drains `rx` for as long as jobs keep arriving within `COALESCE_WINDOW` of
/// each other, then applies the batch's distinct `(user, selected, rejected)`
/// pairs in one pass before waiting again.
pub async fn run(rx: async_channel::Receiver<EloJob>) {
    loop {
        let Ok(first) = rx.recv().await else {
            tracing::info!("elo worker channel closed, shutting down");
            return;
        };

        let mut batch: HashMap<(UserId, MovieId, MovieId), EloJob> = HashMap::new();
        batch.insert(coalesce_key(&first), first);

        let deadline = Instant::now() + COALESCE_WINDOW;
        while let Ok(Ok(job)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            batch.insert(coalesce_key(&job), job);
        }

        flush(batch.into_values().collect()).await;
    }
}

async fn flush(jobs: Vec<EloJob>) {
    let count = jobs.len();
    let result = tokio::task::spawn_blocking(move || {
        let mut conn = decided_data::connect()?;
        for job in jobs {
            apply_job(&mut conn, &job)?;
        }
        Ok::<_, decided_data::DataError>(())
    })
    .await;

    match result {
        Ok(Ok(())) => tracing::debug!(count, "elo batch applied"),
        Ok(Err(err)) => tracing::error!(error = %err, count, "elo batch failed"),
        Err(err) => tracing::error!(error = %err, "elo batch worker task panicked"),
    }
}

fn apply_job(conn: &mut diesel::PgConnection, job: &EloJob) -> decided_data::DataResult<()> {
    let selected = decided_data::elo::get_or_default(conn, job.user_id, &job.selected_movie_id)?;
    let rejected = decided_data::elo::get_or_default(conn, job.user_id, &job.rejected_movie_id)?;
    let (selected_new, rejected_new) = apply_pick_result(&selected, &rejected);

    decided_data::elo::upsert_elo(conn, job.user_id, &job.selected_movie_id, true, |_, _| selected_new)?;
    decided_data::elo::upsert_elo(conn, job.user_id, &job.rejected_movie_id, false, |_, _| rejected_new)?;
    Ok(())
}
