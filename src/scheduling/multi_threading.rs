//! Multi-threaded back-end of the event processing

use super::{process_batch, ProcessingSummary, EVENT_BATCH_SIZE};
use crate::event::Event;
use std::sync::Mutex;

/// Process events in multi-threaded mode
///
/// Each batch of events is processed by a separate task. The conditions of
/// the run are shared by reference between the tasks.
///
pub fn process_events_impl<E: Send>(
    events: &mut [Event],
    process_event: impl Send + Sync + Fn(&mut Event) -> Result<Option<usize>, E>,
) -> Result<ProcessingSummary, E> {
    let num_batches = events.len().div_ceil(EVENT_BATCH_SIZE);
    let accumulator = OrderedAccumulator::new(num_batches);

    // This function is a synchronization scope: it will only return
    // once all inner tasks have been executed
    rayon::scope(|scope| {
        for (batch_id, batch) in events.chunks_mut(EVENT_BATCH_SIZE).enumerate() {
            let accumulator_ref = &accumulator;
            let process_event_ref = &process_event;
            scope.spawn(move |_| {
                let result = process_batch(batch, process_event_ref);
                accumulator_ref.set_task_result(batch_id, result);
            });
        }
    });

    accumulator.get_merged_result()
}

/// Results accumulation mechanism which merges task results in batch order
struct OrderedAccumulator<E> {
    /// Storage for the results of parallel tasks
    results: Box<[Mutex<Option<Result<ProcessingSummary, E>>>]>,
}
//
impl<E> OrderedAccumulator<E> {
    /// Set up results storage for N parallel tasks
    fn new(num_tasks: usize) -> Self {
        Self {
            results: (0..num_tasks)
                .map(|_| Mutex::new(None))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    /// Record the result of the n-th task
    fn set_task_result(&self, task_id: usize, result: Result<ProcessingSummary, E>) {
        let mut lock = self.results[task_id]
            .lock()
            .expect("Mutex data should be valid");
        assert!(lock.is_none(), "Tasks should not report results twice");
        *lock = Some(result);
    }

    /// Merge the task results in order, stopping at the first error
    fn get_merged_result(self) -> Result<ProcessingSummary, E> {
        let mut summary = ProcessingSummary::default();
        for entry in self.results.into_vec() {
            let result = entry
                .into_inner()
                .expect("Mutex data should be valid")
                .expect("Result should be ready");
            summary.merge(result?);
        }
        Ok(summary)
    }
}
