use thiserror::Error;

/// Misuse of the handler API.
///
/// Malformed input is never reported here; it becomes error events in the
/// queue.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandlerError {
    /// The control validator is created once per session.
    #[error("control validator already created")]
    ControlValidatorBound,
    /// Event data was requested while the cursor is exhausted.
    #[error("no current event")]
    NoCurrentEvent,
}
