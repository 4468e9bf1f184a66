//! Contracts the handler consumes from schema validators and dialects.
//!
//! The constraint engine behind a [`Validator`] (syntax rules, code lists,
//! occurrence limits) is out of scope for this crate; the handler only needs
//! the narrow interface below. Validators never call back into the handler.
//! Loop boundaries and findings they discover are queued as
//! [`ValidationEvent`]s and drained by the handler after every call, which
//! keeps delivery order identical to the order of discovery.

use std::sync::Arc;

use bstr::{BStr, BString};

use crate::{
    event::{EventKind, StreamEvent, ValidationError},
    location::Location,
    schema::{Schema, TypeRef},
};

/// Envelope conventions of the interchange being read.
///
/// Every hook has a no-op default.
pub trait Dialect {
    /// Whether the segment is envelope advice (for example EDIFACT `UNA`)
    /// that no schema describes.
    fn is_service_advice_segment(&self, _tag: &str) -> bool {
        false
    }

    /// Observes each element's raw data before it is validated.
    fn element_data(&mut self, _data: Option<&BStr>, _location: &Location) {}

    /// A transaction loop has ended.
    fn transaction_end(&mut self) {}

    /// A group loop has ended.
    fn group_end(&mut self) {}
}

/// Dialect used until the tokenizer has recognized the interchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDialect;

impl Dialect for NoDialect {}

/// An element-level finding retrievable after [`Validator::validate_element`]
/// or [`Validator::valid_composite_occurrences`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError {
    /// The finding.
    pub error: ValidationError,
    /// Schema node the finding concerns.
    pub type_ref: Option<TypeRef>,
}

impl UsageError {
    /// Creates a finding.
    #[must_use]
    pub fn new(error: ValidationError, type_ref: Option<TypeRef>) -> Self {
        Self { error, type_ref }
    }

    /// Event kind used to report the finding.
    #[must_use]
    pub fn category(&self) -> EventKind {
        self.error.category()
    }
}

/// Something a validator discovered while handling a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationEvent {
    /// A schema loop has begun.
    LoopBegin(TypeRef),
    /// A schema loop has ended. The handler treats it like a tokenizer loop
    /// end, so the active validator checks the loop's syntax first.
    LoopEnd(TypeRef),
    /// A segment-level finding.
    SegmentError {
        /// The offending segment tag.
        token: BString,
        /// Schema node the finding concerns.
        type_ref: Option<TypeRef>,
        /// The finding.
        error: ValidationError,
    },
    /// An element-level finding at an explicit position.
    ElementError {
        /// Error category event kind.
        kind: EventKind,
        /// The finding.
        error: ValidationError,
        /// Schema node the finding concerns.
        type_ref: Option<TypeRef>,
        /// The offending data, if any.
        data: Option<BString>,
        /// Element position of the finding.
        element: Option<u32>,
        /// Component position of the finding.
        component: Option<u32>,
        /// Repetition of the finding.
        repetition: Option<u32>,
    },
}

/// Schema validator driven by the handler.
///
/// One validator is bound to the control schema for the whole session;
/// transaction validators are created whenever the client installs a new
/// transaction schema.
pub trait Validator {
    /// Schema type the validator is built from.
    type Schema: Schema;

    /// Creates a validator. `container` is the control schema when building
    /// a transaction validator, used for cross-schema lookups.
    fn new(
        schema: Arc<Self::Schema>,
        validate_code_values: bool,
        container: Option<Arc<Self::Schema>>,
    ) -> Self
    where
        Self: Sized;

    /// Rewinds the validator to the start of its schema.
    fn reset(&mut self);

    /// Pops the oldest undelivered loop boundary or finding.
    fn next_event(&mut self) -> Option<ValidationEvent>;

    /// Positions the validator on a segment.
    fn validate_segment(&mut self, tag: &str);

    /// Schema node of the segment last validated.
    fn segment_reference(&self) -> Option<&TypeRef>;

    /// Validates one element or component. Returns `false` when
    /// [`element_errors`](Self::element_errors) holds findings.
    fn validate_element(
        &mut self,
        dialect: &dyn Dialect,
        location: &Location,
        data: Option<&BStr>,
    ) -> bool;

    /// Findings of the last element or composite-occurrence check.
    fn element_errors(&self) -> &[UsageError];

    /// Schema node of the element last validated.
    fn element_reference(&self) -> Option<&TypeRef>;

    /// Schema node of the composite last entered.
    fn composite_reference(&self) -> Option<&TypeRef>;

    /// Whether the element last validated is composite by schema.
    fn is_composite(&self) -> bool;

    /// Checks that a composite may occur at `location`. Returns `false` when
    /// [`element_errors`](Self::element_errors) holds findings.
    fn valid_composite_occurrences(&mut self, dialect: &dyn Dialect, location: &Location) -> bool;

    /// Checks the trailing syntax rules of a segment or composite.
    fn validate_syntax(&mut self, dialect: &dyn Dialect, location: &Location, is_composite: bool);

    /// Checks version-dependent constraints of the segment just completed.
    fn validate_version_constraints(&mut self, dialect: &dyn Dialect);

    /// Checks the syntax of the loop being closed.
    fn validate_loop_syntax(&mut self);

    /// Whether several implementations still match the current position.
    fn is_pending_discrimination(&self) -> bool;

    /// Resolves a pending discrimination from the events queued but not yet
    /// delivered, rewriting their type references in place. Returns whether
    /// the events may now be delivered.
    fn select_implementation(&mut self, pending: &mut [StreamEvent]) -> bool;

    /// Whether the current element carries the length of a following binary
    /// element.
    fn is_binary_element_length(&self) -> bool;
}
