//! Selection between the control and transaction validators.
//!
//! ```text
//!              transaction loop begins
//!   Envelope ───────────────────────────▶ TransactionWindowOpen
//!      ▲                                          │
//!      │ transaction loop ends, or a              │ next segment begins
//!      │ control segment appears                  ▼
//!      └────────────────────────────────── TransactionBody
//! ```
//!
//! Only `TransactionBody` routes validation to the transaction validator.
//! While the window is open the client may still install or replace the
//! transaction schema, so the control validator stays authoritative.

use std::sync::Arc;

use tracing::debug;

use crate::{error::HandlerError, schema::Schema, validator::Validator};

/// Where the stream is relative to the transaction body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SwitchState {
    /// Outside any transaction.
    #[default]
    Envelope,
    /// A transaction loop has begun; its schema may still be chosen.
    TransactionWindowOpen,
    /// Inside the transaction body; its schema is committed.
    TransactionBody,
}

impl SwitchState {
    /// Whether the stream is inside the transaction-level loop.
    #[must_use]
    pub fn in_transaction(self) -> bool {
        !matches!(self, Self::Envelope)
    }

    /// Whether the transaction schema may be installed or replaced.
    #[must_use]
    pub fn transaction_schema_allowed(self) -> bool {
        matches!(self, Self::TransactionWindowOpen)
    }
}

/// Which validator is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveValidator {
    /// The envelope validator.
    Control,
    /// The business-document validator.
    Transaction,
}

/// Maps a switch state to the validator that must handle the next callback.
#[must_use]
pub fn select(state: SwitchState) -> ActiveValidator {
    match state {
        SwitchState::TransactionBody => ActiveValidator::Transaction,
        SwitchState::Envelope | SwitchState::TransactionWindowOpen => ActiveValidator::Control,
    }
}

/// The two validators, their schemas and the switch state.
#[derive(Debug)]
pub(crate) struct Validators<V: Validator> {
    state: SwitchState,
    control_schema: Option<Arc<V::Schema>>,
    control: Option<V>,
    transaction_schema: Option<Arc<V::Schema>>,
    transaction: Option<V>,
}

impl<V: Validator> Validators<V> {
    pub(crate) fn new() -> Self {
        Self {
            state: SwitchState::Envelope,
            control_schema: None,
            control: None,
            transaction_schema: None,
            transaction: None,
        }
    }

    pub(crate) fn state(&self) -> SwitchState {
        self.state
    }

    pub(crate) fn active(&self) -> ActiveValidator {
        select(self.state)
    }

    pub(crate) fn get(&self, which: ActiveValidator) -> Option<&V> {
        match which {
            ActiveValidator::Control => self.control.as_ref(),
            ActiveValidator::Transaction => self.transaction.as_ref(),
        }
    }

    pub(crate) fn get_mut(&mut self, which: ActiveValidator) -> Option<&mut V> {
        match which {
            ActiveValidator::Control => self.control.as_mut(),
            ActiveValidator::Transaction => self.transaction.as_mut(),
        }
    }

    /// Binds the control schema. Only possible while no control validator
    /// exists.
    pub(crate) fn bind_control(
        &mut self,
        schema: Option<Arc<V::Schema>>,
        validate_code_values: bool,
    ) -> Result<(), HandlerError> {
        if self.control.is_some() {
            return Err(HandlerError::ControlValidatorBound);
        }

        self.control = schema
            .as_ref()
            .map(|schema| V::new(Arc::clone(schema), validate_code_values, None));
        self.control_schema = schema;
        debug!(bound = self.control.is_some(), "control schema set");
        Ok(())
    }

    pub(crate) fn transaction_schema(&self) -> Option<&Arc<V::Schema>> {
        self.transaction_schema.as_ref()
    }

    /// Replaces the transaction validator unless the same schema is already
    /// bound.
    pub(crate) fn bind_transaction(&mut self, schema: Option<Arc<V::Schema>>) {
        let unchanged = match (&self.transaction_schema, &schema) {
            (Some(current), Some(next)) => Arc::ptr_eq(current, next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        self.transaction = schema.as_ref().map(|schema| {
            V::new(Arc::clone(schema), true, self.control_schema.clone())
        });
        self.transaction_schema = schema;
        debug!(
            bound = self.transaction.is_some(),
            state = ?self.state,
            "transaction schema set"
        );
    }

    /// A transaction loop has begun.
    pub(crate) fn enter_transaction(&mut self) {
        self.state = SwitchState::TransactionWindowOpen;
        if let Some(transaction) = self.transaction.as_mut() {
            transaction.reset();
        }
        debug!("transaction window open");
    }

    /// A segment has begun; a pending window closes before it is validated.
    pub(crate) fn close_window(&mut self) {
        if self.state == SwitchState::TransactionWindowOpen {
            self.state = SwitchState::TransactionBody;
            debug!("transaction window closed");
        }
    }

    /// The transaction loop has ended, explicitly or implicitly.
    pub(crate) fn leave_transaction(&mut self) {
        self.state = SwitchState::Envelope;
        debug!("left transaction");
    }

    /// Whether `tag` ends the transaction implicitly: the body is committed
    /// and the control schema claims the segment.
    pub(crate) fn exits_transaction(&self, tag: &str) -> bool {
        self.state == SwitchState::TransactionBody
            && self
                .control_schema
                .as_ref()
                .is_some_and(|schema| schema.contains_segment(tag))
    }
}
