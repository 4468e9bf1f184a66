//! Events delivered to the client cursor.
//!
//! [`EventKind`] enumerates what the handler emits and [`ValidationError`]
//! what the validators may find. [`StreamEvent`] is one slot of the
//! preallocated event queue: it is written in place, read by the client, and
//! overwritten by a later processing step.
//!
//! # Examples
//!
//! ```
//! use edimodem::{EventKind, ValidationError};
//!
//! let error = ValidationError::InvalidCodeValue;
//! assert_eq!(error.category(), EventKind::ElementDataError);
//! assert_eq!(error.associated_marker(), None);
//!
//! let error = ValidationError::ImplementationLoopOccursUnderMinimumTimes;
//! assert_eq!(error.associated_marker(), Some(EventKind::EndLoop));
//! ```

use bstr::{BStr, BString};

use crate::{location::Location, schema::TypeRef};

/// The kind of an event produced by the handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(any(test, feature = "serde"), derive(serde::Serialize))]
#[cfg_attr(feature = "fuzzing", derive(arbitrary::Arbitrary))]
pub enum EventKind {
    /// Beginning of an interchange envelope.
    #[default]
    StartInterchange,
    /// End of an interchange envelope.
    EndInterchange,
    /// Beginning of a functional group.
    StartGroup,
    /// End of a functional group.
    EndGroup,
    /// Beginning of a transaction.
    StartTransaction,
    /// End of a transaction.
    EndTransaction,
    /// Beginning of a loop within a transaction.
    StartLoop,
    /// End of a loop within a transaction.
    EndLoop,
    /// Beginning of a segment.
    StartSegment,
    /// End of a segment.
    EndSegment,
    /// Beginning of a composite element, explicit or synthesized.
    StartComposite,
    /// End of a composite element, explicit or synthesized.
    EndComposite,
    /// Character data of a simple element or component.
    ElementData,
    /// Marker for binary element data; the stream is held by the handler.
    ElementDataBinary,
    /// A segment-level validation finding.
    SegmentError,
    /// A finding about the content of an element.
    ElementDataError,
    /// A finding about the presence or count of an element.
    ElementOccurrenceError,
}

impl EventKind {
    /// Whether this kind carries a validation finding.
    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::SegmentError | Self::ElementDataError | Self::ElementOccurrenceError
        )
    }
}

/// A validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(any(test, feature = "serde"), derive(serde::Serialize))]
#[cfg_attr(feature = "fuzzing", derive(arbitrary::Arbitrary))]
pub enum ValidationError {
    /// The segment is not defined by the transaction schema.
    SegmentNotInTransactionSet,
    /// The segment is defined but not expected at this position.
    UnexpectedSegment,
    /// A mandatory segment was not present.
    MandatorySegmentMissing,
    /// The loop occurs more often than allowed.
    LoopOccursOverMaximumTimes,
    /// The segment occurs more often than allowed.
    SegmentExceedsMaximumUse,
    /// The segment is not defined for this transaction.
    SegmentNotInDefinedTransactionSet,
    /// The segment is out of order.
    SegmentNotInProperSequence,
    /// One or more elements of the segment failed validation.
    SegmentHasDataElementErrors,
    /// A segment unused by the implementation was present.
    ImplementationUnusedSegmentPresent,
    /// The segment occurs less often than the implementation requires.
    ImplementationSegmentBelowMinimumUse,
    /// The loop occurs less often than the implementation requires.
    ImplementationLoopOccursUnderMinimumTimes,
    /// The loop occurs more often than the implementation allows.
    ImplementationLoopOccursOverMaximumTimes,
    /// A required element was not present.
    RequiredDataElementMissing,
    /// An element required by a syntax rule was not present.
    ConditionalRequiredDataElementMissing,
    /// The segment carries more elements than defined.
    TooManyDataElements,
    /// Mutually exclusive elements were both present.
    ExclusionConditionViolated,
    /// The element repeats more often than allowed.
    TooManyRepetitions,
    /// The composite carries more components than defined.
    TooManyComponents,
    /// An element unused by the implementation was present.
    ImplementationUnusedDataElementPresent,
    /// The element repeats less often than the implementation requires.
    ImplementationTooFewRepetitions,
    /// The value is shorter than the minimum length.
    DataElementTooShort,
    /// The value is longer than the maximum length.
    DataElementTooLong,
    /// The value contains characters outside the allowed set.
    InvalidCharacterData,
    /// The value is not a member of the code list.
    InvalidCodeValue,
    /// The value is not a valid date.
    InvalidDate,
    /// The value is not a valid time.
    InvalidTime,
    /// The value is not a member of the implementation's code list.
    ImplementationInvalidCodeValue,
    /// The value does not match the implementation's pattern.
    ImplementationPatternMatchFailure,
    /// A control reference does not match its counterpart in the trailer.
    ControlReferenceMismatch,
    /// A control count does not match the actual count.
    ControlCountDoesNotMatchActualCount,
}

impl ValidationError {
    /// The event kind used to report this finding.
    #[must_use]
    pub fn category(self) -> EventKind {
        match self {
            Self::SegmentNotInTransactionSet
            | Self::UnexpectedSegment
            | Self::MandatorySegmentMissing
            | Self::LoopOccursOverMaximumTimes
            | Self::SegmentExceedsMaximumUse
            | Self::SegmentNotInDefinedTransactionSet
            | Self::SegmentNotInProperSequence
            | Self::SegmentHasDataElementErrors
            | Self::ImplementationUnusedSegmentPresent
            | Self::ImplementationSegmentBelowMinimumUse
            | Self::ImplementationLoopOccursUnderMinimumTimes
            | Self::ImplementationLoopOccursOverMaximumTimes => EventKind::SegmentError,

            Self::RequiredDataElementMissing
            | Self::ConditionalRequiredDataElementMissing
            | Self::TooManyDataElements
            | Self::ExclusionConditionViolated
            | Self::TooManyRepetitions
            | Self::TooManyComponents
            | Self::ImplementationUnusedDataElementPresent
            | Self::ImplementationTooFewRepetitions => EventKind::ElementOccurrenceError,

            Self::DataElementTooShort
            | Self::DataElementTooLong
            | Self::InvalidCharacterData
            | Self::InvalidCodeValue
            | Self::InvalidDate
            | Self::InvalidTime
            | Self::ImplementationInvalidCodeValue
            | Self::ImplementationPatternMatchFailure
            | Self::ControlReferenceMismatch
            | Self::ControlCountDoesNotMatchActualCount => EventKind::ElementDataError,
        }
    }

    /// The already-queued marker this finding must be delivered next to.
    ///
    /// Loop minimums can only be checked once the loop is closed, so the
    /// finding is placed directly after the nearest `EndLoop` rather than
    /// behind whatever was queued after it.
    #[must_use]
    pub fn associated_marker(self) -> Option<EventKind> {
        match self {
            Self::ImplementationLoopOccursUnderMinimumTimes => Some(EventKind::EndLoop),
            _ => None,
        }
    }

    /// Whether this finding is about the number of elements or repetitions
    /// rather than the element's value.
    #[must_use]
    pub fn is_occurrence_count(self) -> bool {
        matches!(self, Self::TooManyDataElements | Self::TooManyRepetitions)
    }
}

/// One slot of the event queue.
///
/// The payload buffer is kept across reuse so that steady-state parsing does
/// not allocate per event. Everything returned by the accessors is valid until
/// the queue is reset.
#[derive(Debug, Clone, Default)]
pub struct StreamEvent {
    kind: EventKind,
    error: Option<ValidationError>,
    data: BString,
    data_present: bool,
    type_ref: Option<TypeRef>,
    location: Location,
}

impl StreamEvent {
    /// Kind of the event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Validation finding carried by the event, if it is an error event.
    #[must_use]
    pub fn error(&self) -> Option<ValidationError> {
        self.error
    }

    /// Character data, distinguishing absent data (`None`) from an empty
    /// field (`Some("")`).
    #[must_use]
    pub fn data(&self) -> Option<&BStr> {
        self.data_present.then(|| BStr::new(self.data.as_slice()))
    }

    /// Schema node the event concerns.
    #[must_use]
    pub fn type_reference(&self) -> Option<&TypeRef> {
        self.type_ref.as_ref()
    }

    /// Replaces the schema node, used when discrimination resolves an
    /// implementation after the event was queued.
    pub fn set_type_reference(&mut self, type_ref: Option<TypeRef>) {
        self.type_ref = type_ref;
    }

    /// Implementation code, or standard code, of the referenced schema node.
    #[must_use]
    pub fn reference_code(&self) -> Option<&str> {
        self.type_ref.as_ref().map(TypeRef::reference_code)
    }

    /// Position captured when the event was queued.
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub(crate) fn set(
        &mut self,
        kind: EventKind,
        error: Option<ValidationError>,
        data: Option<&[u8]>,
        type_ref: Option<&TypeRef>,
        location: &Location,
    ) {
        self.kind = kind;
        self.error = error;
        self.data.clear();
        match data {
            Some(bytes) => {
                self.data.extend_from_slice(bytes);
                self.data_present = true;
            }
            None => self.data_present = false,
        }
        self.type_ref = type_ref.cloned();
        self.location = *location;
    }
}
