//! Event sequencing and dual-schema validation for streaming EDI parsers.
//!
//! A tokenizer pushes structural callbacks into a [`ProxyEventHandler`],
//! which validates them against a control (envelope) schema and a
//! client-selected transaction schema and queues the resulting events. The
//! client then reads the events back one at a time through the handler's
//! cursor methods.
//!
//! The crate owns no lexer and no schema engine: both are supplied through
//! the [`Validator`], [`Dialect`] and [`Schema`] traits.

mod error;
mod event;
mod handler;
mod location;
mod options;
mod queue;
mod schema;
pub mod switch;
mod validator;


pub use error::HandlerError;
pub use event::{EventKind, StreamEvent, ValidationError};
pub use handler::ProxyEventHandler;
pub use location::Location;
pub use options::HandlerOptions;
pub use queue::EventQueue;
pub use schema::{Schema, TypeKind, TypeRef};
pub use switch::{ActiveValidator, SwitchState};
pub use validator::{Dialect, NoDialect, UsageError, ValidationEvent, Validator};
