/// Configuration of the event handler.
///
/// # Examples
///
/// ```rust
/// use edimodem::HandlerOptions;
///
/// let options = HandlerOptions {
///     event_capacity: 256,
///     ..Default::default()
/// };
/// assert!(options.validate_code_values);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct HandlerOptions {
    /// Number of preallocated event slots.
    ///
    /// Must exceed the largest number of events a single tokenizer callback
    /// burst can produce, which is bounded by the element, component and
    /// repetition counts reachable between two structural events. Exceeding
    /// it panics.
    ///
    /// # Default
    ///
    /// `99`
    pub event_capacity: usize,

    /// Whether the control validator checks code values against the control
    /// schema's code lists. Transaction validators always do.
    ///
    /// # Default
    ///
    /// `true`
    pub validate_code_values: bool,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            event_capacity: 99,
            validate_code_values: true,
        }
    }
}
