//! Build pool
//!
//! Runs TableBuilder over every plan with `concurrency` scoped workers.
//! Jobs and results both travel over channels bounded at
//! `concurrency + 1`, so finished-but-unregistered tables never pile up.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::channel;

use crate::error::{RawDbError, Result};

use super::table::TableBuilder;
use super::{TableBuildPlan, TableBuildResult};

/// Build all plans; `on_done(done, total)` fires once per finished table.
///
/// Results come back ordered by file number. The first failure stops
/// workers from picking up new plans and is returned.
pub fn build_tables<F>(
    plans: &[TableBuildPlan],
    builder: &TableBuilder<'_>,
    concurrency: usize,
    mut on_done: F,
) -> Result<Vec<TableBuildResult>>
where
    F: FnMut(usize, usize),
{
    let total = plans.len();
    let workers = concurrency.max(1).min(total.max(1));
    let (job_tx, job_rx) = channel::bounded::<usize>(concurrency + 1);
    let (result_tx, result_rx) = channel::bounded::<Result<TableBuildResult>>(concurrency + 1);
    let abort = AtomicBool::new(false);

    let outcome = crossbeam::thread::scope(|s| {
        s.spawn(|_| {
            for index in 0..total {
                if abort.load(Ordering::SeqCst) || job_tx.send(index).is_err() {
                    break;
                }
            }
            drop(job_tx);
        });

        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let abort = &abort;
            s.spawn(move |_| {
                for index in job_rx {
                    if abort.load(Ordering::SeqCst) {
                        break;
                    }
                    let result = builder.build(index, &plans[index]);
                    if result.is_err() {
                        abort.store(true, Ordering::SeqCst);
                    }
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);
        drop(job_rx);

        let mut results = Vec::with_capacity(total);
        let mut first_error = None;
        for result in result_rx.iter() {
            match result {
                Ok(table) => {
                    results.push(table);
                    on_done(results.len(), total);
                }
                Err(e) => {
                    tracing::error!(error = %e, "table build failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(results),
        }
    })
    .map_err(|_| RawDbError::stage("build", "table builder thread panicked"))?;

    let mut results = outcome?;
    if results.len() != total {
        return Err(RawDbError::stage(
            "build",
            format!("built {} of {} tables", results.len(), total),
        ));
    }
    results.sort_by_key(|table| table.file_number);
    Ok(results)
}
