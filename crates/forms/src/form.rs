//! Form and search orchestrators around one [`ParentWidget`].
//!
//! `submit()` validates, reads the value and hands it to the submit handler.
//! The handler replies right away or with a future; either way the outcome
//! is accepted, ignored, or a set of errors that is routed back to the fields.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use serde_json::Value;
use strum::Display;
use tracing::{debug, info};

use crate::error::FormError;
use crate::error_tree::{ErrorInput, ErrorTree};
use crate::parent::{ParentProps, ParentWidget};
use crate::path::FieldPath;
use crate::schema::ValidationFailure;
use crate::widget::{Key, Mode, Widget};

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Clears all displayed errors.
    Accepted,
    /// Nothing happens.
    Ignored,
    /// Routed to the fields.
    Errors(ErrorInput),
}

impl From<bool> for SubmitOutcome {
    fn from(accepted: bool) -> Self {
        if accepted {
            SubmitOutcome::Accepted
        } else {
            SubmitOutcome::Ignored
        }
    }
}

impl From<ErrorInput> for SubmitOutcome {
    fn from(errors: ErrorInput) -> Self {
        SubmitOutcome::Errors(errors)
    }
}

impl From<Vec<ValidationFailure>> for SubmitOutcome {
    fn from(failures: Vec<ValidationFailure>) -> Self {
        SubmitOutcome::Errors(ErrorInput::Failures(failures))
    }
}

/// Reply of a submit handler.
pub enum SubmitReply {
    Ready(SubmitOutcome),
    /// A rejection is routed like [`SubmitOutcome::Errors`].
    Pending(LocalBoxFuture<'static, Result<SubmitOutcome, ErrorInput>>),
}

impl fmt::Debug for SubmitReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitReply::Ready(outcome) => f.debug_tuple("Ready").field(outcome).finish(),
            SubmitReply::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

impl From<SubmitOutcome> for SubmitReply {
    fn from(outcome: SubmitOutcome) -> Self {
        SubmitReply::Ready(outcome)
    }
}

impl From<bool> for SubmitReply {
    fn from(accepted: bool) -> Self {
        SubmitReply::Ready(accepted.into())
    }
}

pub type SubmitHandler = Box<dyn FnMut(Value) -> SubmitReply>;

/// What `submit()` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SubmitStatus {
    /// Local validation failed; the handler was not called.
    Invalid,
    Accepted,
    Ignored,
    /// The handler returned errors.
    Rejected,
}

pub struct Form {
    parent: ParentWidget,
    on_submit: SubmitHandler,
    on_cancel: Option<Box<dyn FnMut()>>,
    submit_requested: Rc<Cell<bool>>,
}

impl Form {
    pub fn new(
        props: ParentProps,
        on_submit: impl FnMut(Value) -> SubmitReply + 'static,
    ) -> Result<Self, FormError> {
        let mut parent = ParentWidget::new(props)?;
        let submit_requested = Rc::new(Cell::new(false));
        let flag = submit_requested.clone();
        parent.set_on_enter(Some(Rc::new(move || flag.set(true))));
        Ok(Self {
            parent,
            on_submit: Box::new(on_submit),
            on_cancel: None,
            submit_requested,
        })
    }

    pub fn with_cancel(mut self, on_cancel: impl FnMut() + 'static) -> Self {
        self.on_cancel = Some(Box::new(on_cancel));
        self
    }

    pub fn parent(&self) -> &ParentWidget {
        &self.parent
    }

    pub fn parent_mut(&mut self) -> &mut ParentWidget {
        &mut self.parent
    }

    pub fn value(&self) -> Value {
        self.parent.value()
    }

    pub fn set_value(&mut self, value: Value) -> Result<(), FormError> {
        self.parent.set_value(value)
    }

    /// Edit the field at a dotted path (`"address.city"`, `"tags.0"`).
    pub fn set_at(&mut self, path: &str, value: Value) -> Result<(), FormError> {
        self.parent.set_at(FieldPath::parse(path).segments(), value)
    }

    pub fn errors(&self) -> ErrorTree {
        self.parent.displayed_error()
    }

    /// `true` once Enter was pressed in any field since the last submission.
    pub fn submit_requested(&self) -> bool {
        self.submit_requested.get()
    }

    /// Deliver a key to the field at `path`; Enter submits.
    pub async fn handle_key_at(
        &mut self,
        path: &str,
        key: Key,
    ) -> Result<Option<SubmitStatus>, FormError> {
        self.parent.handle_key_at(FieldPath::parse(path).segments(), key)?;
        if self.submit_requested() {
            return self.submit().await.map(Some);
        }
        Ok(None)
    }

    pub async fn submit(&mut self) -> Result<SubmitStatus, FormError> {
        self.submit_requested.set(false);
        if !self.parent.valid() {
            debug!(errors = %self.parent.displayed_error().to_json(), "submission blocked by validation");
            return Ok(SubmitStatus::Invalid);
        }
        let value = self.parent.value();
        let outcome = match (self.on_submit)(value) {
            SubmitReply::Ready(outcome) => outcome,
            SubmitReply::Pending(reply) => match reply.await {
                Ok(outcome) => outcome,
                Err(errors) => SubmitOutcome::Errors(errors),
            },
        };
        let status = match outcome {
            SubmitOutcome::Accepted => {
                self.parent.error(ErrorInput::Clear)?;
                SubmitStatus::Accepted
            }
            SubmitOutcome::Ignored => SubmitStatus::Ignored,
            SubmitOutcome::Errors(errors) => {
                self.parent.error(errors)?;
                SubmitStatus::Rejected
            }
        };
        info!(%status, "form submitted");
        Ok(status)
    }

    pub fn cancel(&mut self) {
        if let Some(on_cancel) = self.on_cancel.as_mut() {
            on_cancel();
        }
    }

    pub fn reset(&mut self) {
        self.parent.reset();
    }
}

/// A form in search mode.
pub struct Search {
    form: Form,
}

impl Search {
    pub fn new(
        props: ParentProps,
        on_submit: impl FnMut(Value) -> SubmitReply + 'static,
    ) -> Result<Self, FormError> {
        Ok(Self {
            form: Form::new(props.mode(Mode::Search), on_submit)?,
        })
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut Form {
        &mut self.form
    }

    /// Current search criteria.
    pub fn criteria(&self) -> Value {
        self.form.value()
    }

    pub async fn submit(&mut self) -> Result<SubmitStatus, FormError> {
        self.form.submit().await
    }

    /// Back to the initial criteria, errors cleared.
    pub fn clear(&mut self) {
        self.form.reset();
    }
}
