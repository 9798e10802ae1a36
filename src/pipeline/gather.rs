use std::future::Future;

use futures::stream::{self, StreamExt};

use crate::models::Record;

/// Run `work` for every record with at most `concurrency` in flight and
/// return the outputs in record order, regardless of completion order.
pub async fn gather_ordered<'a, T, F, Fut>(
    records: &'a [Record],
    concurrency: usize,
    mut work: F,
) -> Vec<T>
where
    F: FnMut(usize, &'a Record) -> Fut,
    Fut: Future<Output = T> + 'a,
{
    // Collected up front: a `map` adapter over a borrowing closure makes the
    // caller's future lose `Send`.
    let pending: Vec<Fut> = records
        .iter()
        .enumerate()
        .map(|(index, record)| work(index, record))
        .collect();
    stream::iter(pending)
        .buffered(concurrency.max(1))
        .collect()
        .await
}
