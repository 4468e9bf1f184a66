//! Schema handles consumed by the handler.
//!
//! Schema loading and the schema tree itself live outside this crate. The
//! handler only needs two things from a schema: whether it declares a given
//! segment tag, and a cheap, cloneable reference to a node of the tree that
//! can be attached to queued events.

use std::{fmt::Debug, sync::Arc};

/// Role of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(any(test, feature = "serde"), derive(serde::Serialize))]
#[cfg_attr(feature = "fuzzing", derive(arbitrary::Arbitrary))]
pub enum TypeKind {
    /// The interchange envelope.
    Interchange,
    /// A functional group envelope.
    Group,
    /// The transaction-level loop.
    Transaction,
    /// Any other loop.
    Loop,
    /// A segment.
    Segment,
    /// A composite element.
    Composite,
    /// A simple element.
    Element,
}

#[derive(Debug, PartialEq, Eq)]
struct SchemaType {
    kind: TypeKind,
    code: Box<str>,
    implementation_code: Option<Box<str>>,
}

/// A reference into the schema tree.
///
/// Cloning is cheap; references compare by value.
///
/// # Examples
///
/// ```
/// use edimodem::{TypeKind, TypeRef};
///
/// let standard = TypeRef::new(TypeKind::Loop, "L0001");
/// assert_eq!(standard.reference_code(), "L0001");
///
/// let implementation = TypeRef::implementation(TypeKind::Loop, "L0001", "1000A");
/// assert_eq!(implementation.reference_code(), "1000A");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef(Arc<SchemaType>);

impl TypeRef {
    /// Creates a reference to a standard schema node.
    pub fn new(kind: TypeKind, code: impl Into<Box<str>>) -> Self {
        Self(Arc::new(SchemaType {
            kind,
            code: code.into(),
            implementation_code: None,
        }))
    }

    /// Creates a reference to an implementation of a standard schema node.
    pub fn implementation(
        kind: TypeKind,
        code: impl Into<Box<str>>,
        implementation_code: impl Into<Box<str>>,
    ) -> Self {
        Self(Arc::new(SchemaType {
            kind,
            code: code.into(),
            implementation_code: Some(implementation_code.into()),
        }))
    }

    /// Role of the referenced node.
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.0.kind
    }

    /// Code of the referenced standard node.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.0.code
    }

    /// Code of the implementation, when this references one.
    #[must_use]
    pub fn implementation_code(&self) -> Option<&str> {
        self.0.implementation_code.as_deref()
    }

    /// The implementation code if present, otherwise the standard code.
    #[must_use]
    pub fn reference_code(&self) -> &str {
        self.implementation_code().unwrap_or(self.code())
    }
}

/// The part of a schema the handler consults directly.
pub trait Schema: Debug {
    /// Whether the schema declares a segment with this tag.
    fn contains_segment(&self, tag: &str) -> bool;
}

