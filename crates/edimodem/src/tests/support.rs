//! Table-driven schemas and a validator over them, standing in for the
//! external schema engine.

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt::Write,
    rc::Rc,
    sync::Arc,
};

use bstr::{BStr, BString};

use crate::{
    Dialect, EventKind, HandlerOptions, Location, ProxyEventHandler, Schema, StreamEvent,
    TypeKind, TypeRef, UsageError, ValidationError, ValidationEvent, Validator,
};

#[derive(Debug, Clone)]
pub(crate) struct ElementRule {
    type_ref: TypeRef,
    codes: &'static [&'static str],
    max_use: u32,
    components: Vec<ElementRule>,
    binary_length: bool,
}

impl ElementRule {
    pub(crate) fn simple(code: &str) -> Self {
        Self {
            type_ref: TypeRef::new(TypeKind::Element, code),
            codes: &[],
            max_use: 1,
            components: Vec::new(),
            binary_length: false,
        }
    }

    pub(crate) fn coded(code: &str, codes: &'static [&'static str]) -> Self {
        Self {
            codes,
            ..Self::simple(code)
        }
    }

    pub(crate) fn composite(code: &str, components: Vec<ElementRule>) -> Self {
        Self {
            type_ref: TypeRef::new(TypeKind::Composite, code),
            components,
            ..Self::simple(code)
        }
    }

    pub(crate) fn binary_length(code: &str) -> Self {
        Self {
            binary_length: true,
            ..Self::simple(code)
        }
    }

    fn is_composite(&self) -> bool {
        !self.components.is_empty()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Discriminator {
    element: u32,
    implementations: Vec<(&'static str, TypeRef)>,
}

#[derive(Debug, Clone)]
pub(crate) struct SegmentRule {
    type_ref: TypeRef,
    elements: Vec<ElementRule>,
    opens: Option<TypeRef>,
    closes: Option<TypeRef>,
    discriminator: Option<Discriminator>,
}

impl SegmentRule {
    fn new(tag: &str, elements: Vec<ElementRule>) -> Self {
        Self {
            type_ref: TypeRef::new(TypeKind::Segment, tag),
            elements,
            opens: None,
            closes: None,
            discriminator: None,
        }
    }

    fn opens(mut self, type_ref: TypeRef) -> Self {
        self.opens = Some(type_ref);
        self
    }

    fn closes(mut self, type_ref: TypeRef) -> Self {
        self.closes = Some(type_ref);
        self
    }

    fn element(&self, position: Option<u32>) -> Option<&ElementRule> {
        let index = position?.checked_sub(1)?;
        self.elements.get(index as usize)
    }
}

#[derive(Debug)]
pub(crate) struct TestSchema {
    segments: BTreeMap<String, SegmentRule>,
    required: Vec<&'static str>,
}

impl Schema for TestSchema {
    fn contains_segment(&self, tag: &str) -> bool {
        self.segments.contains_key(tag)
    }
}

pub(crate) fn group() -> TypeRef {
    TypeRef::new(TypeKind::Group, "GROUP")
}

pub(crate) fn transaction() -> TypeRef {
    TypeRef::new(TypeKind::Transaction, "TRANSACTION")
}

impl TestSchema {
    /// X12 envelope: `ISA GS ST ... SE GE IEA`.
    pub(crate) fn x12_control() -> Self {
        let segments = [
            SegmentRule::new(
                "ISA",
                vec![ElementRule::coded("I01", &["00", "03"]), ElementRule::simple("I02")],
            ),
            SegmentRule::new("GS", vec![ElementRule::simple("479")]).opens(group()),
            SegmentRule::new(
                "ST",
                vec![ElementRule::simple("143"), ElementRule::simple("329")],
            )
            .opens(transaction()),
            SegmentRule::new("SE", vec![ElementRule::simple("96"), ElementRule::simple("329")]),
            SegmentRule::new("GE", vec![ElementRule::simple("97")]).closes(transaction()),
            SegmentRule::new("IEA", vec![ElementRule::simple("I16")]).closes(group()),
        ];

        Self {
            segments: keyed(segments),
            required: Vec::new(),
        }
    }

    /// A purchase order body: `BEG REF N1 BIN CTT TST`, `BEG` mandatory. `CTT`
    /// closes the `N1` loop.
    pub(crate) fn purchase_order() -> Self {
        let mut n1 = SegmentRule::new(
            "N1",
            vec![ElementRule::simple("93"), ElementRule::coded("98", &["ST", "BT"])],
        )
        .opens(TypeRef::new(TypeKind::Loop, "N1"));
        n1.discriminator = Some(Discriminator {
            element: 2,
            implementations: vec![
                ("ST", TypeRef::implementation(TypeKind::Segment, "N1", "N1_ShipTo")),
                ("BT", TypeRef::implementation(TypeKind::Segment, "N1", "N1_BillTo")),
            ],
        });

        let segments = [
            SegmentRule::new(
                "BEG",
                vec![
                    ElementRule::coded("353", &["00", "05"]),
                    ElementRule::coded("92", &["SA", "NE"]),
                    ElementRule::simple("324"),
                ],
            ),
            SegmentRule::new(
                "REF",
                vec![
                    ElementRule::simple("128"),
                    ElementRule::simple("127"),
                    ElementRule::composite(
                        "C040",
                        vec![ElementRule::simple("128"), ElementRule::simple("127")],
                    ),
                ],
            ),
            n1,
            SegmentRule::new(
                "BIN",
                vec![ElementRule::binary_length("784"), ElementRule::simple("785")],
            ),
            SegmentRule::new("CTT", vec![ElementRule::simple("354")])
                .closes(TypeRef::new(TypeKind::Loop, "N1")),
            SegmentRule::new(
                "TST",
                vec![ElementRule::composite(
                    "C001",
                    vec![ElementRule::coded("E1", &["A"])],
                )],
            ),
        ];

        Self {
            segments: keyed(segments),
            required: vec!["BEG"],
        }
    }
}

fn keyed(rules: impl IntoIterator<Item = SegmentRule>) -> BTreeMap<String, SegmentRule> {
    rules
        .into_iter()
        .map(|rule| (rule.type_ref.code().to_string(), rule))
        .collect()
}

#[derive(Debug)]
pub(crate) struct TestValidator {
    schema: Arc<TestSchema>,
    container: Option<Arc<TestSchema>>,
    validate_code_values: bool,
    events: VecDeque<ValidationEvent>,
    segment: Option<SegmentRule>,
    seen: BTreeSet<String>,
    element_ref: Option<TypeRef>,
    composite_ref: Option<TypeRef>,
    composite: bool,
    binary_length: bool,
    element_errors: Vec<UsageError>,
    discriminator_value: Option<BString>,
    pending: bool,
    resets: usize,
}

impl TestValidator {
    pub(crate) fn segments_seen(&self) -> usize {
        self.seen.len()
    }

    pub(crate) fn has_container(&self) -> bool {
        self.container.is_some()
    }

    pub(crate) fn resets(&self) -> usize {
        self.resets
    }
}

impl Validator for TestValidator {
    type Schema = TestSchema;

    fn new(
        schema: Arc<TestSchema>,
        validate_code_values: bool,
        container: Option<Arc<TestSchema>>,
    ) -> Self {
        Self {
            schema,
            container,
            validate_code_values,
            events: VecDeque::new(),
            segment: None,
            seen: BTreeSet::new(),
            element_ref: None,
            composite_ref: None,
            composite: false,
            binary_length: false,
            element_errors: Vec::new(),
            discriminator_value: None,
            pending: false,
            resets: 0,
        }
    }

    fn reset(&mut self) {
        self.events.clear();
        self.segment = None;
        self.seen.clear();
        self.discriminator_value = None;
        self.pending = false;
        self.resets += 1;
    }

    fn next_event(&mut self) -> Option<ValidationEvent> {
        self.events.pop_front()
    }

    fn validate_segment(&mut self, tag: &str) {
        self.pending = false;
        self.discriminator_value = None;

        if let Some(rule) = self.schema.segments.get(tag) {
            if let Some(closed) = &rule.closes {
                self.events.push_back(ValidationEvent::LoopEnd(closed.clone()));
            }
            if let Some(opened) = &rule.opens {
                self.events.push_back(ValidationEvent::LoopBegin(opened.clone()));
            }
            self.pending = rule.discriminator.is_some();
            self.seen.insert(tag.to_string());
            self.segment = Some(rule.clone());
        } else {
            self.segment = None;
            let known = self
                .container
                .as_ref()
                .is_some_and(|container| container.contains_segment(tag));
            if !known {
                self.events.push_back(ValidationEvent::SegmentError {
                    token: BString::from(tag.as_bytes().to_vec()),
                    type_ref: None,
                    error: ValidationError::SegmentNotInDefinedTransactionSet,
                });
            }
        }
    }

    fn segment_reference(&self) -> Option<&TypeRef> {
        self.segment.as_ref().map(|segment| &segment.type_ref)
    }

    fn validate_element(
        &mut self,
        _dialect: &dyn Dialect,
        location: &Location,
        data: Option<&BStr>,
    ) -> bool {
        self.element_errors.clear();
        self.element_ref = None;
        self.composite = false;
        self.binary_length = false;

        let Some(segment) = self.segment.as_ref() else {
            return true;
        };
        let Some(rule) = segment.element(location.element_position()) else {
            self.element_errors
                .push(UsageError::new(ValidationError::TooManyDataElements, None));
            return false;
        };

        self.composite = rule.is_composite();
        self.binary_length = rule.binary_length;

        if location.element_occurrence().unwrap_or(1) > rule.max_use {
            self.element_errors.push(UsageError::new(
                ValidationError::TooManyRepetitions,
                Some(rule.type_ref.clone()),
            ));
        }

        let target = match location.component_position() {
            Some(component) => component
                .checked_sub(1)
                .and_then(|index| rule.components.get(index as usize)),
            None => rule.components.first().or(Some(rule)),
        };

        match target {
            Some(target) => {
                self.element_ref = Some(target.type_ref.clone());
                if let Some(value) = data.filter(|value| !value.is_empty()) {
                    let bytes: &[u8] = value;
                    if self.validate_code_values
                        && !target.codes.is_empty()
                        && !target.codes.iter().any(|code| code.as_bytes() == bytes)
                    {
                        self.element_errors.push(UsageError::new(
                            ValidationError::InvalidCodeValue,
                            Some(target.type_ref.clone()),
                        ));
                    }
                }
            }
            None => self.element_errors.push(UsageError::new(
                ValidationError::TooManyComponents,
                Some(rule.type_ref.clone()),
            )),
        }

        if let Some(discriminator) = &segment.discriminator {
            if location.element_position() == Some(discriminator.element) {
                self.discriminator_value = data.map(|value| BString::from(value.to_vec()));
            }
        }

        self.element_errors.is_empty()
    }

    fn element_errors(&self) -> &[UsageError] {
        &self.element_errors
    }

    fn element_reference(&self) -> Option<&TypeRef> {
        self.element_ref.as_ref()
    }

    fn composite_reference(&self) -> Option<&TypeRef> {
        self.composite_ref.as_ref()
    }

    fn is_composite(&self) -> bool {
        self.composite
    }

    fn valid_composite_occurrences(&mut self, _dialect: &dyn Dialect, location: &Location) -> bool {
        self.element_errors.clear();
        self.composite_ref = None;

        let Some(segment) = self.segment.as_ref() else {
            return true;
        };

        if let Some(rule) = segment.element(location.element_position()) {
            self.composite_ref = Some(rule.type_ref.clone());
            true
        } else {
            self.element_ref = None;
            self.element_errors
                .push(UsageError::new(ValidationError::TooManyDataElements, None));
            false
        }
    }

    fn validate_syntax(
        &mut self,
        _dialect: &dyn Dialect,
        _location: &Location,
        _is_composite: bool,
    ) {
    }

    fn validate_version_constraints(&mut self, _dialect: &dyn Dialect) {}

    fn validate_loop_syntax(&mut self) {
        for tag in &self.schema.required {
            if !self.seen.contains(*tag) {
                self.events.push_back(ValidationEvent::SegmentError {
                    token: BString::from(tag.as_bytes().to_vec()),
                    type_ref: None,
                    error: ValidationError::MandatorySegmentMissing,
                });
            }
        }
    }

    fn is_pending_discrimination(&self) -> bool {
        self.pending
    }

    fn select_implementation(&mut self, pending: &mut [StreamEvent]) -> bool {
        let Some(value) = self.discriminator_value.as_ref() else {
            return false;
        };

        if let Some(discriminator) = self
            .segment
            .as_ref()
            .and_then(|segment| segment.discriminator.as_ref())
        {
            let chosen = discriminator
                .implementations
                .iter()
                .find(|(code, _)| code.as_bytes() == value.as_slice());

            if let Some((_, implementation)) = chosen {
                for event in pending
                    .iter_mut()
                    .filter(|event| event.kind() == EventKind::StartSegment)
                {
                    event.set_type_reference(Some(implementation.clone()));
                }
            }
        }

        self.pending = false;
        true
    }

    fn is_binary_element_length(&self) -> bool {
        self.binary_length
    }
}

/// Dialect that records the scope hooks it receives.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingDialect {
    pub(crate) log: Rc<RefCell<Vec<&'static str>>>,
    pub(crate) service_advice: &'static [&'static str],
}

impl Dialect for RecordingDialect {
    fn is_service_advice_segment(&self, tag: &str) -> bool {
        self.service_advice.contains(&tag)
    }

    fn transaction_end(&mut self) {
        self.log.borrow_mut().push("transaction_end");
    }

    fn group_end(&mut self) {
        self.log.borrow_mut().push("group_end");
    }
}

pub(crate) type TestHandler = ProxyEventHandler<TestValidator>;

pub(crate) fn control_handler() -> TestHandler {
    ProxyEventHandler::new(
        Location::new(),
        Some(Arc::new(TestSchema::x12_control())),
        HandlerOptions::default(),
    )
}

/// One line per event: kind, non-empty data, `[reference code]`, `!error`.
pub(crate) fn render(event: &StreamEvent) -> String {
    let mut line = format!("{:?}", event.kind());
    if let Some(data) = event.data().filter(|data| !data.is_empty()) {
        write!(line, " {data}").unwrap();
    }
    if let Some(code) = event.reference_code() {
        write!(line, " [{code}]").unwrap();
    }
    if let Some(error) = event.error() {
        write!(line, " !{error:?}").unwrap();
    }
    line
}

pub(crate) fn trace(handler: &TestHandler) -> Vec<String> {
    handler.queue().events().iter().map(render).collect()
}

/// Runs `f` as one processing step and returns what it queued.
pub(crate) fn step(handler: &mut TestHandler, f: impl FnOnce(&mut TestHandler)) -> Vec<String> {
    handler.reset_events();
    f(handler);
    trace(handler)
}

/// Feeds a whole segment of simple elements as one step, advancing the live
/// location the way the tokenizer does.
pub(crate) fn feed_segment(handler: &mut TestHandler, tag: &str, elements: &[&str]) -> Vec<String> {
    step(handler, |handler| {
        handler.location_mut().increment_segment_position();
        handler.segment_begin(tag);
        for element in elements {
            handler.location_mut().increment_element_position();
            handler.element_data(Some(element.as_bytes()));
        }
        handler.segment_end();
    })
}
