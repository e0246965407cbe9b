//! Sequential back-end of the event processing

use super::{process_batch, ProcessingSummary, EVENT_BATCH_SIZE};
use crate::event::Event;

/// Process events in sequential mode
///
/// We use batched logic even in sequential mode, in order to report errors
/// and accumulate results in the same way as multi-threaded runs.
///
pub fn process_events_impl<E>(
    events: &mut [Event],
    process_event: impl Fn(&mut Event) -> Result<Option<usize>, E>,
) -> Result<ProcessingSummary, E> {
    let mut summary = ProcessingSummary::default();
    for batch in events.chunks_mut(EVENT_BATCH_SIZE) {
        summary.merge(process_batch(batch, &process_event)?);
    }
    Ok(summary)
}
