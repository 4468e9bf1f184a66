//! The proxy event handler.
//!
//! Overview
//! - The tokenizer pushes structural callbacks (`segment_begin`,
//!   `element_data`, ...) into [`ProxyEventHandler`]. Each callback validates
//!   against the active validator and writes zero or more events into the
//!   [`EventQueue`].
//! - The client pulls those events back one at a time through the cursor
//!   methods (`event`, `next_event`, `characters`, ...). The queue is reset at
//!   the start of every processing step, never per event.
//!
//! Validator switching
//! - Two validators cooperate: one bound once to the control (envelope)
//!   schema, one bound to whatever transaction schema the client installs.
//!   [`switch::select`](crate::switch::select) picks the authoritative one
//!   from the switch state, freshly on every callback.
//! - Entering a transaction loop opens a window during which the client may
//!   install the transaction schema. The window closes at the start of the
//!   next `segment_begin`, before that segment is validated.
//! - A segment the control schema claims, seen inside the transaction body,
//!   ends the transaction implicitly.
//!
//! Composite synthesis
//! - An element that the schema types as composite but that arrived without
//!   component delimiters is wrapped in synthesized `StartComposite` /
//!   `EndComposite` events. Count findings about the element are reported
//!   before the synthesized start; findings about its value after it.
//!
//! Discrimination
//! - When a validator cannot yet choose among several implementations of the
//!   current position, callbacks return `false` ("not ready"): events keep
//!   accumulating but the caller must not hand them to the client until a
//!   later callback of the same step returns `true`.
//!
//! Threading
//! - The handler is single-threaded and synchronous. It holds the binary
//!   stream and dialect as non-`Send` trait objects, so one instance belongs
//!   to exactly one parse session on one thread.

use std::{io::Read, iter, sync::Arc};

use bstr::BStr;
use tracing::{debug, trace};

use crate::{
    error::HandlerError,
    event::{EventKind, StreamEvent, ValidationError},
    location::Location,
    options::HandlerOptions,
    queue::EventQueue,
    schema::{TypeKind, TypeRef},
    switch::{ActiveValidator, SwitchState, Validators},
    validator::{Dialect, NoDialect, UsageError, ValidationEvent, Validator},
};

const EMPTY: Option<&[u8]> = Some(b"".as_slice());

/// Translates tokenizer callbacks into a validated, ordered event queue.
pub struct ProxyEventHandler<V: Validator> {
    location: Location,
    validators: Validators<V>,
    queue: EventQueue,
    dialect: Box<dyn Dialect>,
    binary: Option<Box<dyn Read>>,
    segment_tag: String,
    element_errors: Vec<UsageError>,
}

impl<V: Validator> ProxyEventHandler<V> {
    /// Creates a handler for one parse session.
    ///
    /// A `None` control schema leaves the control validator unbound; it may
    /// be bound once later through
    /// [`set_control_schema`](Self::set_control_schema).
    pub fn new(
        location: Location,
        control_schema: Option<Arc<V::Schema>>,
        options: HandlerOptions,
    ) -> Self {
        let mut validators = Validators::new();
        let bound = validators.bind_control(control_schema, options.validate_code_values);
        debug_assert!(bound.is_ok(), "a fresh handler has no control validator");

        Self {
            location,
            validators,
            queue: EventQueue::with_capacity(options.event_capacity),
            dialect: Box::new(NoDialect),
            binary: None,
            segment_tag: String::new(),
            element_errors: Vec::new(),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Schemas
    // --------------------------------------------------------------------------------------------

    /// Binds the control schema.
    ///
    /// # Errors
    ///
    /// [`HandlerError::ControlValidatorBound`] if a control validator already
    /// exists.
    pub fn set_control_schema(
        &mut self,
        schema: Option<Arc<V::Schema>>,
        validate_code_values: bool,
    ) -> Result<(), HandlerError> {
        self.validators.bind_control(schema, validate_code_values)
    }

    /// Whether the client may install the transaction schema right now.
    ///
    /// This is `true` from the `StartTransaction` event until the next
    /// segment begins. The window closes at the very start of that
    /// `segment_begin`, before the segment is validated; a client that only
    /// reacts after reading the segment's events is too late. Install the
    /// schema while handling the step that delivered `StartTransaction`.
    #[must_use]
    pub fn is_transaction_schema_allowed(&self) -> bool {
        self.validators.state().transaction_schema_allowed()
    }

    /// Current state of the validator switch.
    #[must_use]
    pub fn switch_state(&self) -> SwitchState {
        self.validators.state()
    }

    /// The transaction schema currently installed.
    #[must_use]
    pub fn transaction_schema(&self) -> Option<&Arc<V::Schema>> {
        self.validators.transaction_schema()
    }

    /// Installs or replaces the transaction schema. Installing the schema
    /// that is already bound keeps the existing validator.
    pub fn set_transaction_schema(&mut self, schema: Option<Arc<V::Schema>>) {
        self.validators.bind_transaction(schema);
    }

    // --------------------------------------------------------------------------------------------
    // Client cursor
    // --------------------------------------------------------------------------------------------

    /// Starts a new processing step.
    pub fn reset_events(&mut self) {
        self.queue.reset();
    }

    /// The queued events of the current step.
    #[must_use]
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// The event under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<&StreamEvent> {
        self.queue.current()
    }

    /// Kind of the event under the cursor.
    #[must_use]
    pub fn event(&self) -> Option<EventKind> {
        self.queue.current().map(StreamEvent::kind)
    }

    /// Whether the cursor points at an event.
    #[must_use]
    pub fn has_events(&self) -> bool {
        self.queue.has_events()
    }

    /// Advances the cursor, returning whether an event remains.
    pub fn next_event(&mut self) -> bool {
        self.queue.next_event()
    }

    /// Finding carried by the event under the cursor.
    #[must_use]
    pub fn error(&self) -> Option<ValidationError> {
        self.queue.current().and_then(StreamEvent::error)
    }

    /// Character data of the event under the cursor.
    ///
    /// # Errors
    ///
    /// [`HandlerError::NoCurrentEvent`] if the cursor is exhausted.
    pub fn characters(&self) -> Result<Option<&BStr>, HandlerError> {
        self.queue
            .current()
            .map(StreamEvent::data)
            .ok_or(HandlerError::NoCurrentEvent)
    }

    /// Reference code of the schema node of the event under the cursor.
    #[must_use]
    pub fn reference_code(&self) -> Option<&str> {
        self.queue.current().and_then(StreamEvent::reference_code)
    }

    /// Schema node of the event under the cursor.
    #[must_use]
    pub fn schema_type_reference(&self) -> Option<&TypeRef> {
        self.queue.current().and_then(StreamEvent::type_reference)
    }

    /// Location of the event under the cursor, or the live location once the
    /// cursor is exhausted.
    #[must_use]
    pub fn location(&self) -> &Location {
        self.queue
            .current()
            .map_or(&self.location, StreamEvent::location)
    }

    /// The live location, advanced by the tokenizer.
    pub fn location_mut(&mut self) -> &mut Location {
        &mut self.location
    }

    /// Stream of the last binary element.
    pub fn binary(&mut self) -> Option<&mut (dyn Read + 'static)> {
        self.binary.as_deref_mut()
    }

    /// Replaces the stream of the last binary element.
    pub fn set_binary(&mut self, binary: Option<Box<dyn Read>>) {
        self.binary = binary;
    }

    /// Takes ownership of the stream of the last binary element.
    pub fn take_binary(&mut self) -> Option<Box<dyn Read>> {
        self.binary.take()
    }

    /// Whether the current element gives the length of a following binary
    /// element.
    #[must_use]
    pub fn is_binary_element_length(&self) -> bool {
        self.validators
            .get(self.validators.active())
            .is_some_and(V::is_binary_element_length)
    }

    // --------------------------------------------------------------------------------------------
    // Tokenizer callbacks
    // --------------------------------------------------------------------------------------------

    /// An interchange has begun under `dialect`.
    pub fn interchange_begin(&mut self, dialect: Box<dyn Dialect>) {
        self.dialect = dialect;
        self.queue
            .enqueue(EventKind::StartInterchange, None, EMPTY, None, &self.location);
    }

    /// The interchange has ended.
    pub fn interchange_end(&mut self) {
        let active = self.validators.active();
        if let Some(validator) = self.validators.get_mut(active) {
            validator.validate_loop_syntax();
        }
        self.drain_validation_events(active);

        self.queue
            .enqueue(EventKind::EndInterchange, None, EMPTY, None, &self.location);
    }

    /// A group, transaction or loop has begun.
    pub fn loop_begin(&mut self, type_ref: &TypeRef) {
        let code = Some(type_ref.code().as_bytes());

        match type_ref.kind() {
            TypeKind::Transaction => {
                self.queue.enqueue(
                    EventKind::StartTransaction,
                    None,
                    code,
                    Some(type_ref),
                    &self.location,
                );
                self.validators.enter_transaction();
            }
            TypeKind::Group => {
                self.queue
                    .enqueue(EventKind::StartGroup, None, code, Some(type_ref), &self.location);
            }
            _ => {
                self.queue
                    .enqueue(EventKind::StartLoop, None, code, Some(type_ref), &self.location);
            }
        }
    }

    /// A group, transaction or loop has ended. The active validator checks
    /// the loop's syntax first.
    pub fn loop_end(&mut self, type_ref: &TypeRef) {
        let active = self.validators.active();
        if let Some(validator) = self.validators.get_mut(active) {
            validator.validate_loop_syntax();
        }
        self.drain_validation_events(active);

        self.close_loop(type_ref);
    }

    fn close_loop(&mut self, type_ref: &TypeRef) {
        let code = Some(type_ref.code().as_bytes());

        match type_ref.kind() {
            TypeKind::Transaction => {
                self.validators.leave_transaction();
                self.dialect.transaction_end();
                self.queue.enqueue(
                    EventKind::EndTransaction,
                    None,
                    code,
                    Some(type_ref),
                    &self.location,
                );
            }
            TypeKind::Group => {
                self.dialect.group_end();
                self.queue
                    .enqueue(EventKind::EndGroup, None, code, Some(type_ref), &self.location);
            }
            _ => {
                self.queue
                    .enqueue(EventKind::EndLoop, None, code, Some(type_ref), &self.location);
            }
        }
    }

    /// A segment has begun. Returns whether the queued events may be
    /// delivered.
    pub fn segment_begin(&mut self, tag: &str) -> bool {
        self.segment_tag.clear();
        self.segment_tag.push_str(tag);

        // A transaction loop begun by the previous segment (or by the
        // validator while it handles this one) commits here.
        self.validators.close_window();

        let active = self.validators.active();
        let mut events_ready = true;
        let mut type_ref = None;

        if !self.dialect.is_service_advice_segment(tag) {
            if let Some(validator) = self.validators.get_mut(active) {
                validator.validate_segment(tag);
                type_ref = validator.segment_reference().cloned();
                events_ready = !validator.is_pending_discrimination();
            }
            self.drain_validation_events(active);
        }

        if self.validators.exits_transaction(tag) {
            debug!(tag, "control segment ends transaction");

            if let Some(validator) = self.validators.get_mut(active) {
                validator.validate_loop_syntax();
            }
            self.drain_validation_events(active);

            self.validators.leave_transaction();

            let control = self.validators.active();
            if let Some(validator) = self.validators.get_mut(control) {
                validator.validate_segment(tag);
                type_ref = validator.segment_reference().cloned();
            }
            self.drain_validation_events(control);
        }

        self.queue.enqueue(
            EventKind::StartSegment,
            None,
            Some(tag.as_bytes()),
            type_ref.as_ref(),
            &self.location,
        );
        events_ready
    }

    /// The current segment has ended.
    pub fn segment_end(&mut self) -> bool {
        let active = self.validators.active();
        if let Some(validator) = self.validators.get_mut(active) {
            validator.validate_syntax(&*self.dialect, &self.location, false);
            validator.validate_version_constraints(&*self.dialect);
        }
        self.drain_validation_events(active);

        self.location.clear_segment_locations();
        self.queue.enqueue(
            EventKind::EndSegment,
            None,
            Some(self.segment_tag.as_bytes()),
            None,
            &self.location,
        );
        true
    }

    /// A composite has begun; `is_nil` marks a composite without data, which
    /// is not validated.
    pub fn composite_begin(&mut self, is_nil: bool) -> bool {
        let mut type_ref = None;
        let mut events_ready = true;

        if !is_nil {
            let active = self.validators.active();
            if let Some(validator) = self.validators.get_mut(active) {
                if validator.valid_composite_occurrences(&*self.dialect, &self.location) {
                    type_ref = validator.composite_reference().cloned();
                } else {
                    type_ref = validator.element_reference().cloned();
                    for error in validator.element_errors() {
                        self.queue.enqueue(
                            error.category(),
                            Some(error.error),
                            EMPTY,
                            error.type_ref.as_ref(),
                            &self.location,
                        );
                    }
                }
                events_ready = !validator.is_pending_discrimination();
            }
            self.drain_validation_events(active);
        }

        self.queue.enqueue(
            EventKind::StartComposite,
            None,
            EMPTY,
            type_ref.as_ref(),
            &self.location,
        );
        events_ready
    }

    /// The current composite has ended.
    pub fn composite_end(&mut self, is_nil: bool) -> bool {
        let mut events_ready = true;

        if !is_nil {
            let active = self.validators.active();
            if let Some(validator) = self.validators.get_mut(active) {
                validator.validate_syntax(&*self.dialect, &self.location, true);
                events_ready = !validator.is_pending_discrimination();
            }
            self.drain_validation_events(active);
        }

        self.location.clear_component_position();
        self.queue
            .enqueue(EventKind::EndComposite, None, EMPTY, None, &self.location);
        events_ready
    }

    /// Data of one element or component; `None` for an element that is
    /// absent altogether.
    pub fn element_data(&mut self, data: Option<&[u8]>) -> bool {
        let text = data.map(BStr::new);
        self.dialect.element_data(text, &self.location);

        let active = self.validators.active();
        let derived_composite = self.validate_element(active, data);
        let type_ref = self
            .validators
            .get(active)
            .and_then(V::element_reference)
            .cloned();
        let synthesized = derived_composite && data.is_some_and(|d| !d.is_empty());
        let mut events_ready = true;

        if data.is_some_and(|d| !derived_composite || !d.is_empty()) {
            self.queue.enqueue(
                EventKind::ElementData,
                None,
                data,
                type_ref.as_ref(),
                &self.location,
            );

            if let Some(validator) = self.validators.get_mut(active) {
                if validator.is_pending_discrimination() {
                    events_ready = validator.select_implementation(self.queue.pending_mut());
                    trace!(events_ready, "discrimination attempted");
                }
            }
            self.drain_validation_events(active);
        }

        if synthesized {
            self.composite_end(false);
            self.location.clear_component_position();
        }

        events_ready
    }

    /// Validates the element, queueing its findings around a synthesized
    /// composite start. Returns whether the element is a derived composite.
    fn validate_element(&mut self, active: ActiveValidator, data: Option<&[u8]>) -> bool {
        let explicit_composite = self.location.component_position().is_some();
        let text = data.map(BStr::new);

        let Some(validator) = self.validators.get_mut(active) else {
            return false;
        };

        let valid = validator.validate_element(&*self.dialect, &self.location, text);
        let derived_composite = !explicit_composite && validator.is_composite();

        self.element_errors.clear();
        if !valid {
            self.element_errors.extend_from_slice(validator.element_errors());
        }
        self.drain_validation_events(active);

        // Count findings describe the container, so they precede the
        // synthesized composite.
        for error in self.element_errors.iter().filter(|e| e.error.is_occurrence_count()) {
            self.queue.enqueue(
                error.category(),
                Some(error.error),
                data,
                error.type_ref.as_ref(),
                &self.location,
            );
        }

        if derived_composite && data.is_some_and(|d| !d.is_empty()) {
            self.composite_begin(false);
            self.location.increment_component_position();
        }

        for error in self.element_errors.iter().filter(|e| !e.error.is_occurrence_count()) {
            self.queue.enqueue(
                error.category(),
                Some(error.error),
                data,
                error.type_ref.as_ref(),
                &self.location,
            );
        }

        derived_composite
    }

    /// A binary element's data is available as `binary`.
    pub fn binary_data(&mut self, binary: Box<dyn Read>) -> bool {
        self.queue
            .enqueue(EventKind::ElementDataBinary, None, EMPTY, None, &self.location);
        self.binary = Some(binary);
        true
    }

    /// A segment-level finding.
    pub fn segment_error(
        &mut self,
        token: &[u8],
        type_ref: Option<&TypeRef>,
        error: ValidationError,
    ) {
        self.queue.enqueue(
            EventKind::SegmentError,
            Some(error),
            Some(token),
            type_ref,
            &self.location,
        );
    }

    /// An element-level finding at an explicit position. The event records a
    /// copy of the live location with the given positions.
    #[allow(clippy::too_many_arguments)]
    pub fn element_error(
        &mut self,
        kind: EventKind,
        error: ValidationError,
        type_ref: Option<&TypeRef>,
        data: Option<&[u8]>,
        element: Option<u32>,
        component: Option<u32>,
        repetition: Option<u32>,
    ) {
        let mut copy = self.location;
        copy.set_element_position(element);
        copy.set_element_occurrence(repetition);
        copy.set_component_position(component);

        self.queue.enqueue(kind, Some(error), data, type_ref, &copy);
    }

    // --------------------------------------------------------------------------------------------
    // Validator events
    // --------------------------------------------------------------------------------------------

    /// Applies everything the validator queued during its last call.
    ///
    /// The batch is taken up front: a loop end checks loop syntax, and those
    /// findings must not overtake events already queued behind it.
    fn drain_validation_events(&mut self, which: ActiveValidator) {
        let batch: Vec<ValidationEvent> = match self.validators.get_mut(which) {
            Some(validator) => iter::from_fn(|| validator.next_event()).collect(),
            None => return,
        };

        for event in batch {
            match event {
                ValidationEvent::LoopBegin(type_ref) => self.loop_begin(&type_ref),
                ValidationEvent::LoopEnd(type_ref) => self.loop_end(&type_ref),
                ValidationEvent::SegmentError {
                    token,
                    type_ref,
                    error,
                } => self.segment_error(&token, type_ref.as_ref(), error),
                ValidationEvent::ElementError {
                    kind,
                    error,
                    type_ref,
                    data,
                    element,
                    component,
                    repetition,
                } => self.element_error(
                    kind,
                    error,
                    type_ref.as_ref(),
                    data.as_ref().map(|d| d.as_slice()),
                    element,
                    component,
                    repetition,
                ),
            }
        }
    }
}
