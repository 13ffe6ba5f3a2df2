use anyhow::{Context, Result};
use rayon::ThreadPoolBuilder;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

/// Run `work` once per item on a pool of at most `max_workers` threads.
/// Results come back in input order.
pub fn map_entities<T, R, F>(max_workers: usize, items: Vec<T>, work: F) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Send + Sync,
{
    if max_workers <= 1 || items.len() <= 1 {
        return Ok(items.into_iter().map(work).collect());
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(max_workers.min(items.len()))
        .thread_name(|idx| format!("damwatch-worker-{idx}"))
        .build()
        .context("failed to build entity worker pool")?;
    Ok(pool.install(|| items.into_par_iter().map(work).collect()))
}
