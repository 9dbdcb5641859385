//! Bounded fan-out of independent per-file work.

use crate::bundler::error::{Error, Result};
use std::{future::Future, sync::Arc};
use tokio::{sync::Semaphore, task::JoinSet};

/// Runs `job` for every item, at most one task per CPU at a time.
///
/// Returns once every task has finished. The first failure cancels the
/// tasks still outstanding, waits for them to wind down and is returned.
pub async fn for_each_bounded<T, F, Fut>(items: Vec<T>, job: F) -> Result<()>
where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let limit = Arc::new(Semaphore::new(num_cpus::get().max(1)));
    let mut tasks = JoinSet::new();

    for item in items {
        let limit = Arc::clone(&limit);
        let work = job(item);
        tasks.spawn(async move {
            let _permit = limit
                .acquire_owned()
                .await
                .map_err(|e| Error::GenericError(format!("worker pool closed: {e}")))?;
            work.await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e,
            Err(e) => Error::GenericError(format!("worker task panicked: {e}")),
        };
        tasks.abort_all();
        // Aborted tasks drop their futures (and any child processes) here.
        while tasks.join_next().await.is_some() {}
        return Err(failure);
    }

    Ok(())
}
