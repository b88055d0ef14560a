//! Bounded fan-out over a sequence of items.
//!
//! [`for_each_bounded`] splits work across a fixed number of workers that pull
//! from a shared queue, so at most `limit` units are in flight at once and
//! every item is handed out exactly once.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::error;

/// Aggregate failure of a bounded batch.
#[derive(Debug)]
pub struct BatchFailure<T, E> {
    /// Errors returned by individual units, in completion order
    pub errors: Vec<E>,
    /// Items whose unit panicked
    pub panicked: Vec<T>,
}

impl<T, E> BatchFailure<T, E> {
    fn new() -> Self {
        Self {
            errors: Vec::new(),
            panicked: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.panicked.is_empty()
    }
}

impl<T, E: fmt::Display> fmt::Display for BatchFailure<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unit(s) failed", self.errors.len())?;
        if !self.panicked.is_empty() {
            write!(f, ", {} unit(s) panicked", self.panicked.len())?;
        }
        if let Some(first) = self.errors.first() {
            write!(f, "; first error: {}", first)?;
        }
        Ok(())
    }
}

impl<T: fmt::Debug, E: fmt::Debug + fmt::Display> std::error::Error for BatchFailure<T, E> {}

/// Runs `work` once per item with at most `limit` invocations in flight.
///
/// Completes when every item has been processed. Unit errors do not stop the
/// batch; they are collected and returned together once all workers finish.
/// Each unit runs in its own task, so a panicking unit is reported with its
/// item and the worker carries on with the queue.
/// A `limit` of zero is treated as one.
pub async fn for_each_bounded<I, T, E, F, Fut>(
    items: I,
    limit: usize,
    work: F,
) -> Result<(), BatchFailure<T, E>>
where
    I: IntoIterator<Item = T>,
    T: Clone + Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    let queue: VecDeque<T> = items.into_iter().collect();
    if queue.is_empty() {
        return Ok(());
    }

    let workers = limit.max(1).min(queue.len());
    let queue = Arc::new(Mutex::new(queue));
    let work = Arc::new(work);

    let mut in_flight = JoinSet::new();
    for _ in 0..workers {
        let queue = Arc::clone(&queue);
        let work = Arc::clone(&work);

        in_flight.spawn(async move {
            let mut failure = BatchFailure::new();
            loop {
                let next = queue.lock().pop_front();
                let Some(item) = next else {
                    break;
                };
                match tokio::spawn(work(item.clone())).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => failure.errors.push(e),
                    Err(e) => {
                        error!("Batch unit failed: {}", e);
                        failure.panicked.push(item);
                    }
                }
            }
            failure
        });
    }

    let mut failure = BatchFailure::new();
    while let Some(res) = in_flight.join_next().await {
        match res {
            Ok(worker) => {
                failure.errors.extend(worker.errors);
                failure.panicked.extend(worker.panicked);
            }
            Err(e) => error!("Batch worker failed: {}", e),
        }
    }

    if failure.is_empty() {
        Ok(())
    } else {
        Err(failure)
    }
}
