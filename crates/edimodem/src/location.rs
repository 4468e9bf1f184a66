//! Structural position within an EDI stream.
//!
//! A single *live* [`Location`] is owned by the handler and mutated as the
//! tokenizer advances. Every queued event carries its own copy, taken at the
//! moment the event was enqueued, so later movement of the live position can
//! never leak into an event the client has not read yet.

/// Position of the tokenizer within the document.
///
/// Positions are 1-based. `None` means "not inside such a construct", e.g.
/// `component_position` is `None` for an element that is not part of an
/// explicit (or synthesized) composite.
///
/// # Examples
///
/// ```
/// use edimodem::Location;
///
/// let mut live = Location::default();
/// live.increment_segment_position();
/// live.increment_element_position();
///
/// let frozen = live;
/// live.increment_element_position();
///
/// assert_eq!(frozen.element_position(), Some(1));
/// assert_eq!(live.element_position(), Some(2));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(any(test, feature = "serde"), derive(serde::Serialize))]
pub struct Location {
    line: usize,
    column: usize,
    character_offset: usize,
    segment_position: Option<u32>,
    element_position: Option<u32>,
    element_occurrence: Option<u32>,
    component_position: Option<u32>,
}

impl Location {
    /// Creates a location positioned before the first segment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Line of the current character, as tracked by the tokenizer.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    /// Column of the current character, as tracked by the tokenizer.
    #[must_use]
    pub fn column(&self) -> usize {
        self.column
    }

    /// Offset of the current character from the start of the stream.
    #[must_use]
    pub fn character_offset(&self) -> usize {
        self.character_offset
    }

    /// Position of the current segment within the stream.
    #[must_use]
    pub fn segment_position(&self) -> Option<u32> {
        self.segment_position
    }

    /// Position of the current element within its segment.
    #[must_use]
    pub fn element_position(&self) -> Option<u32> {
        self.element_position
    }

    /// Repetition of the current element.
    #[must_use]
    pub fn element_occurrence(&self) -> Option<u32> {
        self.element_occurrence
    }

    /// Position of the current component within its composite.
    #[must_use]
    pub fn component_position(&self) -> Option<u32> {
        self.component_position
    }

    /// Updates the character coordinates.
    pub fn set_text_position(&mut self, line: usize, column: usize, character_offset: usize) {
        self.line = line;
        self.column = column;
        self.character_offset = character_offset;
    }

    /// Moves to the next segment, clearing every element-level position.
    pub fn increment_segment_position(&mut self) {
        self.segment_position = Some(self.segment_position.map_or(1, |p| p + 1));
        self.clear_segment_locations();
    }

    /// Moves to the next element of the current segment.
    pub fn increment_element_position(&mut self) {
        self.element_position = Some(self.element_position.map_or(1, |p| p + 1));
        self.element_occurrence = Some(1);
        self.component_position = None;
    }

    /// Moves to the next repetition of the current element.
    pub fn increment_element_occurrence(&mut self) {
        self.element_occurrence = Some(self.element_occurrence.map_or(1, |o| o + 1));
        self.component_position = None;
    }

    /// Moves to the next component; the first call enters the composite.
    pub fn increment_component_position(&mut self) {
        self.component_position = Some(match self.component_position {
            None | Some(0) => 1,
            Some(p) => p + 1,
        });
    }

    /// Overrides the element position.
    pub fn set_element_position(&mut self, position: Option<u32>) {
        self.element_position = position;
    }

    /// Overrides the element repetition.
    pub fn set_element_occurrence(&mut self, occurrence: Option<u32>) {
        self.element_occurrence = occurrence;
    }

    /// Overrides the component position.
    pub fn set_component_position(&mut self, position: Option<u32>) {
        self.component_position = position;
    }

    /// Leaves the current composite.
    pub fn clear_component_position(&mut self) {
        self.component_position = None;
    }

    /// Leaves the current segment's elements.
    pub fn clear_segment_locations(&mut self) {
        self.element_position = None;
        self.element_occurrence = None;
        self.component_position = None;
    }
}
