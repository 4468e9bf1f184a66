#![no_main]
use std::{collections::VecDeque, io::Cursor, sync::Arc};

use arbitrary::Arbitrary;
use bstr::BStr;
use edimodem::{
    Dialect, HandlerOptions, Location, NoDialect, ProxyEventHandler, Schema, StreamEvent, TypeKind,
    TypeRef, UsageError, ValidationError, ValidationEvent, Validator,
};
use libfuzzer_sys::fuzz_target;

static TAGS: &[&str] = &["ISA", "GS", "ST", "SE", "GE", "IEA", "BEG", "REF", "N1", "PO1"];

// Keeps a step within the queue capacity below.
const MAX_OPS_PER_STEP: usize = 64;
const MAX_ERRORS_PER_ELEMENT: usize = 4;

fn tag(index: u8) -> &'static str {
    TAGS[index as usize % TAGS.len()]
}

/// Behavior of a scripted validator, chosen by the fuzzer.
#[derive(Debug, Arbitrary)]
struct FuzzSchema {
    segments: Vec<u8>,
    composite_elements: Vec<u8>,
    element_errors: Vec<(u8, ValidationError)>,
    opens_transaction: Option<u8>,
    closes_transaction: Option<u8>,
    discriminated: Option<u8>,
}

impl Schema for FuzzSchema {
    fn contains_segment(&self, name: &str) -> bool {
        self.segments.iter().any(|index| tag(*index) == name)
    }
}

#[derive(Debug)]
struct Scripted {
    schema: Arc<FuzzSchema>,
    events: VecDeque<ValidationEvent>,
    segment: Option<TypeRef>,
    element: Option<TypeRef>,
    composite: bool,
    errors: Vec<UsageError>,
    pending: bool,
}

impl Validator for Scripted {
    type Schema = FuzzSchema;

    fn new(schema: Arc<FuzzSchema>, _: bool, _: Option<Arc<FuzzSchema>>) -> Self {
        Self {
            schema,
            events: VecDeque::new(),
            segment: None,
            element: None,
            composite: false,
            errors: Vec::new(),
            pending: false,
        }
    }

    fn reset(&mut self) {
        self.events.clear();
        self.segment = None;
        self.pending = false;
    }

    fn next_event(&mut self) -> Option<ValidationEvent> {
        self.events.pop_front()
    }

    fn validate_segment(&mut self, name: &str) {
        let transaction = || TypeRef::new(TypeKind::Transaction, "TRANSACTION");

        if self.schema.closes_transaction.is_some_and(|index| tag(index) == name) {
            self.events.push_back(ValidationEvent::LoopEnd(transaction()));
        }
        if self.schema.opens_transaction.is_some_and(|index| tag(index) == name) {
            self.events.push_back(ValidationEvent::LoopBegin(transaction()));
        }

        self.segment = self
            .schema
            .contains_segment(name)
            .then(|| TypeRef::new(TypeKind::Segment, name));
        self.pending = self.schema.discriminated.is_some_and(|index| tag(index) == name);
    }

    fn segment_reference(&self) -> Option<&TypeRef> {
        self.segment.as_ref()
    }

    fn validate_element(&mut self, _: &dyn Dialect, location: &Location, _: Option<&BStr>) -> bool {
        let position = location.element_position().unwrap_or(0);
        let position_byte = u8::try_from(position).unwrap_or(u8::MAX);

        self.composite = location.component_position().is_none()
            && self.schema.composite_elements.contains(&position_byte);
        self.element = Some(TypeRef::new(TypeKind::Element, position.to_string()));
        self.errors = self
            .schema
            .element_errors
            .iter()
            .filter(|(at, _)| *at == position_byte)
            .take(MAX_ERRORS_PER_ELEMENT)
            .map(|(_, error)| UsageError::new(*error, self.element.clone()))
            .collect();
        self.errors.is_empty()
    }

    fn element_errors(&self) -> &[UsageError] {
        &self.errors
    }

    fn element_reference(&self) -> Option<&TypeRef> {
        self.element.as_ref()
    }

    fn composite_reference(&self) -> Option<&TypeRef> {
        self.element.as_ref()
    }

    fn is_composite(&self) -> bool {
        self.composite
    }

    fn valid_composite_occurrences(&mut self, _: &dyn Dialect, _: &Location) -> bool {
        self.errors.clear();
        true
    }

    fn validate_syntax(&mut self, _: &dyn Dialect, _: &Location, _: bool) {}

    fn validate_version_constraints(&mut self, _: &dyn Dialect) {}

    fn validate_loop_syntax(&mut self) {}

    fn is_pending_discrimination(&self) -> bool {
        self.pending
    }

    fn select_implementation(&mut self, _: &mut [StreamEvent]) -> bool {
        self.pending = false;
        true
    }

    fn is_binary_element_length(&self) -> bool {
        false
    }
}

#[derive(Debug, Arbitrary)]
enum Op {
    SegmentBegin(u8),
    SegmentEnd,
    Element(Option<Vec<u8>>),
    Repetition(Option<Vec<u8>>),
    CompositeBegin(bool),
    Component(Option<Vec<u8>>),
    CompositeEnd(bool),
    LoopBegin(bool, u8),
    LoopEnd(bool, u8),
    SegmentError(u8, ValidationError),
    Binary(Vec<u8>),
    InstallTransactionSchema,
}

#[derive(Debug, Arbitrary)]
struct Script {
    control: FuzzSchema,
    transaction: FuzzSchema,
    steps: Vec<Vec<Op>>,
}

fn loop_ref(transaction: bool, index: u8) -> TypeRef {
    if transaction {
        TypeRef::new(TypeKind::Transaction, "TRANSACTION")
    } else {
        TypeRef::new(TypeKind::Loop, tag(index))
    }
}

fn apply(handler: &mut ProxyEventHandler<Scripted>, transaction: &Arc<FuzzSchema>, op: &Op) {
    match op {
        Op::SegmentBegin(index) => {
            handler.location_mut().increment_segment_position();
            handler.segment_begin(tag(*index));
        }
        Op::SegmentEnd => {
            handler.segment_end();
        }
        Op::Element(data) => {
            handler.location_mut().increment_element_position();
            handler.element_data(data.as_deref());
        }
        Op::Repetition(data) => {
            handler.location_mut().increment_element_occurrence();
            handler.element_data(data.as_deref());
        }
        Op::CompositeBegin(is_nil) => {
            handler.location_mut().increment_element_position();
            handler.composite_begin(*is_nil);
        }
        Op::Component(data) => {
            handler.location_mut().increment_component_position();
            handler.element_data(data.as_deref());
        }
        Op::CompositeEnd(is_nil) => {
            handler.composite_end(*is_nil);
        }
        Op::LoopBegin(transaction, index) => handler.loop_begin(&loop_ref(*transaction, *index)),
        Op::LoopEnd(transaction, index) => handler.loop_end(&loop_ref(*transaction, *index)),
        Op::SegmentError(index, error) => {
            handler.segment_error(tag(*index).as_bytes(), None, *error);
        }
        Op::Binary(bytes) => {
            handler.binary_data(Box::new(Cursor::new(bytes.clone())));
        }
        Op::InstallTransactionSchema => {
            if handler.is_transaction_schema_allowed() {
                handler.set_transaction_schema(Some(Arc::clone(transaction)));
            }
        }
    }
}

fn drive(script: Script) {
    let mut handler = ProxyEventHandler::<Scripted>::new(
        Location::new(),
        Some(Arc::new(script.control)),
        HandlerOptions {
            event_capacity: 4096,
            ..HandlerOptions::default()
        },
    );
    let transaction = Arc::new(script.transaction);

    handler.interchange_begin(Box::new(NoDialect));
    for ops in &script.steps {
        handler.reset_events();
        for op in ops.iter().take(MAX_OPS_PER_STEP) {
            apply(&mut handler, &transaction, op);
        }
        handler.queue().assert_invariants();

        while handler.has_events() {
            let _ = handler.characters();
            let _ = handler.location();
            let _ = handler.reference_code();
            handler.next_event();
        }
        handler.queue().assert_invariants();
    }
    handler.interchange_end();
}

fuzz_target!(|script: Script| drive(script));
