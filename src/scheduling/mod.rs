//! This module takes care of scheduling the event processing work,
//! encapsulating use of multiple threads

#[cfg(feature = "multi-threading")]
mod multi_threading;
#[cfg(not(feature = "multi-threading"))]
mod sequential;

use crate::event::Event;

/// Size of the event batches
///
/// Events are processed in batches of a certain size, so that threads are not
/// spawned for every single event in multi-threaded mode. Results are merged
/// in batch order in both modes, so that the outcome does not depend on the
/// scheduling mode.
///
const EVENT_BATCH_SIZE: usize = 64;

/// Bookkeeping of the events which went through the producer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessingSummary {
    /// Number of events which were processed
    pub num_events: usize,

    /// Number of events which were skipped for lack of a track collection
    pub num_skipped_events: usize,

    /// Number of tracks which were produced
    pub num_tracks: usize,
}
//
impl ProcessingSummary {
    /// Account for the outcome of processing one event
    fn record(&mut self, produced_tracks: Option<usize>) {
        self.num_events += 1;
        match produced_tracks {
            Some(num_tracks) => self.num_tracks += num_tracks,
            None => self.num_skipped_events += 1,
        }
    }

    /// Merge the bookkeeping of another set of events
    pub fn merge(&mut self, other: Self) {
        self.num_events += other.num_events;
        self.num_skipped_events += other.num_skipped_events;
        self.num_tracks += other.num_tracks;
    }
}

/// Process a set of events in the manner that was configured at build time
///
/// Takes as parameters the events, which are modified in place, and a kernel
/// that processes one event, returning the number of tracks produced or None
/// if the event was skipped.
///
/// Stops at the first error, in event order.
///
pub fn process_events<E: Send>(
    events: &mut [Event],
    process_event: impl Send + Sync + Fn(&mut Event) -> Result<Option<usize>, E>,
) -> Result<ProcessingSummary, E> {
    // ...in sequential mode
    #[cfg(not(feature = "multi-threading"))]
    {
        sequential::process_events_impl(events, process_event)
    }

    // ...in multi-threaded mode
    #[cfg(feature = "multi-threading")]
    {
        multi_threading::process_events_impl(events, process_event)
    }
}

/// Process a batch of events, in order
fn process_batch<E>(
    batch: &mut [Event],
    process_event: &impl Fn(&mut Event) -> Result<Option<usize>, E>,
) -> Result<ProcessingSummary, E> {
    let mut summary = ProcessingSummary::default();
    for event in batch {
        summary.record(process_event(event)?);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(num_events: usize) -> Vec<Event> {
        (0..num_events as u64)
            .map(|event| Event::new(1, event, true))
            .collect()
    }

    /// Pretend that every third event has no tracks, and that the others have
    /// as many tracks as their event number
    fn fake_producer(event: &mut Event) -> Result<Option<usize>, String> {
        event.put("", Vec::new());
        Ok((event.event % 3 != 0).then_some(event.event as usize))
    }

    #[test]
    fn summary() {
        let mut events = events(3 * EVENT_BATCH_SIZE + 5);
        let summary = process_events(&mut events, fake_producer).expect("No failure");
        let expected_tracks = (0..events.len()).filter(|i| i % 3 != 0).sum();
        assert_eq!(
            summary,
            ProcessingSummary {
                num_events: events.len(),
                num_skipped_events: (events.len() + 2) / 3,
                num_tracks: expected_tracks,
            }
        );
        assert!(events.iter().all(|e| !e.nothing_produced()));
    }

    #[test]
    fn first_error_wins() {
        let mut events = events(4 * EVENT_BATCH_SIZE);
        let result = process_events(&mut events, |event| {
            if event.event == 70 || event.event == 200 {
                Err(event.event)
            } else {
                Ok(Some(1))
            }
        });
        assert_eq!(result, Err(70));
    }

    #[test]
    fn no_events() {
        let summary = process_events(&mut [], fake_producer).expect("No failure");
        assert_eq!(summary, ProcessingSummary::default());
    }
}
