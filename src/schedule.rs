//! Bounded, paced fan-out over a sequence of chunks.
//!
//! [`run_chunks`] is the sole admission-control mechanism protecting the
//! external reasoning service: at most `max_concurrent` workers run at once,
//! and each slot is held for `pacing_delay` after its worker completes, so
//! the steady-state call rate is bounded by `max_concurrent / pacing_delay`.
//! There is no dynamic back-off on observed rate-limit errors — fixed pacing
//! is the entire defense.
//!
//! Results come back in **completion order**, not submission order. Callers
//! that need positional correspondence carry the chunk index inside the
//! worker's result and reorder afterwards, which is exactly what the
//! enhancement callers in [`crate::enhance`] do.

use crate::error::EnhancementError;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Concurrency ceiling and per-slot pacing for one scheduler run.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    pub max_concurrent: usize,
    pub pacing_delay: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            pacing_delay: Duration::from_secs(1),
        }
    }
}

/// Run `worker` over every chunk with bounded concurrency and pacing.
///
/// `worker(chunk, index, total)` is the unit of work. A failing worker does
/// not cancel its siblings: the failure is logged and replaced by
/// `fallback(index)`, so the batch always yields one value per chunk. This
/// availability-over-strictness trade-off fits best-effort enhancement; the
/// mandatory extraction path never goes through this scheduler.
///
/// The returned vector is in completion order.
pub async fn run_chunks<C, R, W, Fut, FB>(
    chunks: Vec<C>,
    worker: W,
    fallback: FB,
    options: SchedulerOptions,
) -> Vec<R>
where
    W: Fn(C, usize, usize) -> Fut,
    Fut: Future<Output = Result<R, EnhancementError>>,
    FB: Fn(usize) -> R,
{
    let total = chunks.len();
    let pacing = options.pacing_delay;
    let worker = &worker;

    let raw: Vec<Result<R, usize>> = stream::iter(chunks.into_iter().enumerate().map(
        |(index, chunk)| async move {
            debug!("processing chunk {}/{}", index + 1, total);
            let outcome = match worker(chunk, index, total).await {
                Ok(result) => Ok(result),
                Err(err) => {
                    warn!("chunk {}/{} failed: {err}", index + 1, total);
                    Err(index)
                }
            };
            // The slot stays occupied through the pacing delay, bounding the
            // steady-state call rate.
            tokio::time::sleep(pacing).await;
            outcome
        },
    ))
    .buffer_unordered(options.max_concurrent.max(1))
    .collect()
    .await;

    raw.into_iter()
        .map(|outcome| match outcome {
            Ok(result) => result,
            Err(index) => fallback(index),
        })
        .collect()
}
