/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use crossbeam::channel::unbounded;
use log::error;

use crate::errors::PipelineError;

/// Run `work` over `items` on `workers` scoped threads.
///
/// Results are handed to `on_result` on the calling thread as they complete,
/// so aggregation never needs shared mutable state.
pub fn run_pool<T, R, W, C>(
    items: Vec<T>,
    workers: usize,
    work: W,
    mut on_result: C,
) -> Result<(), PipelineError>
where
    T: Send,
    R: Send,
    W: Fn(T) -> R + Sync,
    C: FnMut(R),
{
    if items.is_empty() {
        return Ok(());
    }
    let workers = workers.clamp(1, items.len());

    let (task_tx, task_rx) = unbounded::<T>();
    let (result_tx, result_rx) = unbounded::<R>();
    for item in items {
        // receiver is alive; an unbounded send cannot fail here
        let _ = task_tx.send(item);
    }
    drop(task_tx);

    crossbeam::scope(|s| {
        for _ in 0..workers {
            let rx = task_rx.clone();
            let tx = result_tx.clone();
            let work = &work;
            s.spawn(move |_| {
                for item in rx.iter() {
                    if tx.send(work(item)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        for r in result_rx.iter() {
            on_result(r);
        }
    })
    .map_err(|_| {
        error!("a worker thread panicked");
        PipelineError::Setup("worker thread panicked".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_item_is_processed_once() {
        let mut seen = Vec::new();
        run_pool((0..100).collect(), 4, |i: u32| i * 2, |r| seen.push(r)).unwrap();
        seen.sort();
        assert_eq!(seen, (0..100).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut calls = 0;
        run_pool(Vec::<u32>::new(), 4, |i| i, |_| calls += 1).unwrap();
        assert_eq!(calls, 0);
    }

    #[test]
    fn worker_panic_is_reported() {
        let res = run_pool(
            vec![1, 2, 3],
            2,
            |i: u32| {
                if i == 2 {
                    panic!("boom");
                }
                i
            },
            |_| {},
        );
        assert!(res.is_err());
    }
}
