//! Fixed-capacity queue of reusable event slots.
//!
//! The handler writes every event of one processing step into this queue and
//! the client then reads them back one at a time. The queue is reset at the
//! start of each step; slots keep their buffers across resets.
//!
//! Writes normally append. Findings that annotate an already-queued marker
//! (see [`ValidationError::associated_marker`]) are instead placed directly
//! after the nearest such marker, shifting the events queued since then one
//! slot to the right.

use tracing::trace;

use crate::{
    event::{EventKind, StreamEvent, ValidationError},
    location::Location,
    schema::TypeRef,
};

/// Preallocated event slots plus write count and read cursor.
#[derive(Debug)]
pub struct EventQueue {
    slots: Vec<StreamEvent>,
    count: usize,
    index: usize,
}

impl EventQueue {
    /// Allocates `capacity` slots up front.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| StreamEvent::default()).collect(),
            count: 0,
            index: 0,
        }
    }

    /// Maximum number of events a single step may produce.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of events written during the current step.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether nothing has been written during the current step.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[cfg(any(test, feature = "fuzzing"))]
    /// Panics if the cursor or the write count left the slot range.
    pub fn assert_invariants(&self) {
        assert!(self.count <= self.slots.len(), "write count past capacity");
        assert!(self.index <= self.count, "cursor past write count");
    }

    /// Starts a new step. Previously written slots become garbage.
    pub fn reset(&mut self) {
        self.count = 0;
        self.index = 0;
    }

    /// Whether the read cursor points at an event.
    #[must_use]
    pub fn has_events(&self) -> bool {
        self.index < self.count
    }

    /// Advances the read cursor, returning whether an event remains.
    pub fn next_event(&mut self) -> bool {
        if self.index < self.count {
            self.index += 1;
        }
        self.index < self.count
    }

    /// The event under the read cursor.
    #[must_use]
    pub fn current(&self) -> Option<&StreamEvent> {
        self.slots[..self.count].get(self.index)
    }

    /// Every event written during the current step, in delivery order.
    #[must_use]
    pub fn events(&self) -> &[StreamEvent] {
        &self.slots[..self.count]
    }

    /// Events written but not yet read, open to in-place rewriting.
    pub fn pending_mut(&mut self) -> &mut [StreamEvent] {
        &mut self.slots[self.index..self.count]
    }

    /// Writes one event.
    ///
    /// # Panics
    ///
    /// Panics when the step produces more events than the queue's capacity.
    /// That is a configuration defect, never a property of the input.
    pub fn enqueue(
        &mut self,
        kind: EventKind,
        error: Option<ValidationError>,
        data: Option<&[u8]>,
        type_ref: Option<&TypeRef>,
        location: &Location,
    ) {
        assert!(
            self.count < self.slots.len(),
            "event queue capacity of {} exceeded in a single step",
            self.slots.len()
        );

        let mut target = self.count;

        if let Some(marker) = error.and_then(ValidationError::associated_marker) {
            if let Some(position) = self.slots[..self.count]
                .iter()
                .rposition(|event| event.kind() == marker)
            {
                target = position + 1;
                // The unused slot at `count` moves to `target`; everything in
                // between shifts right by one.
                self.slots[target..=self.count].rotate_right(1);
                trace!(?kind, ?error, ?marker, target, "placed finding after marker");
            }
        }

        self.slots[target].set(kind, error, data, type_ref, location);
        self.count += 1;
    }
}
