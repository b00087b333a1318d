use crate::errors::AutomationError;
use crate::field::{FieldSpec, FieldValue};
use crate::injector::ValueInjector;
use crate::locator::ElementLocator;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Why a field did not converge during one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Miss {
    /// No strategy resolved the control.
    NotFound,
    /// The control exists but refuses input.
    Disabled,
    /// The write was issued, refused, or did not stick.
    WriteRejected,
    /// An error or panic escaped one of the steps.
    Fault(String),
}

impl Miss {
    /// Misses that a retry cannot be expected to fix on its own.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Miss::NotFound | Miss::Disabled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOutcome {
    Converged,
    Unreachable(Miss),
}

impl FieldOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, FieldOutcome::Converged)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Locate, inject and confirm a single field.
pub struct FieldApplier {
    locator: ElementLocator,
    injector: ValueInjector,
}

impl FieldApplier {
    pub fn new(locator: ElementLocator, injector: ValueInjector) -> Self {
        Self { locator, injector }
    }

    /// Apply `desired` to `field`. Never fails: errors and panics raised by
    /// any step are reported as [`Miss::Fault`] for this field only.
    #[instrument(level = "debug", skip_all, fields(key = %field.key))]
    pub async fn apply(
        &self,
        field: &FieldSpec,
        desired: &FieldValue,
        cancel: &CancellationToken,
    ) -> FieldOutcome {
        let attempt = AssertUnwindSafe(self.try_apply(field, desired, cancel)).catch_unwind();
        match attempt.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(key = %field.key, error = %e, "Field application failed");
                FieldOutcome::Unreachable(Miss::Fault(e.to_string()))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(key = %field.key, panic = %message, "Field application panicked");
                FieldOutcome::Unreachable(Miss::Fault(format!("panic: {message}")))
            }
        }
    }

    async fn try_apply(
        &self,
        field: &FieldSpec,
        desired: &FieldValue,
        cancel: &CancellationToken,
    ) -> Result<FieldOutcome, AutomationError> {
        if !field.kind.accepts(desired) {
            warn!(key = %field.key, %desired, "Desired value has the wrong type for this field");
            return Ok(FieldOutcome::Unreachable(Miss::WriteRejected));
        }

        let Some(located) = self.locator.locate(field)? else {
            debug!(key = %field.key, "Control not found");
            return Ok(FieldOutcome::Unreachable(Miss::NotFound));
        };

        // a disabled control never counts, whatever it currently shows
        if !located.control.is_enabled()? {
            debug!(key = %field.key, "Control disabled");
            return Ok(FieldOutcome::Unreachable(Miss::Disabled));
        }
        if let Some(current) = field.read(&located.control)? {
            if field.matches(&current, desired) {
                return Ok(FieldOutcome::Converged);
            }
        }

        if !self
            .injector
            .set_native_value(field, &located, desired, cancel)
            .await?
        {
            return Ok(FieldOutcome::Unreachable(Miss::WriteRejected));
        }

        // the host may have re-rendered the control while we wrote into it
        let Some(fresh) = self.locator.locate(field)? else {
            return Ok(FieldOutcome::Unreachable(Miss::NotFound));
        };
        match field.read(&fresh.control)? {
            Some(current) if field.matches(&current, desired) => {
                debug!(key = %field.key, %current, "Confirmed");
                Ok(FieldOutcome::Converged)
            }
            current => {
                debug!(key = %field.key, ?current, %desired, "Read-back does not match");
                Ok(FieldOutcome::Unreachable(Miss::WriteRejected))
            }
        }
    }
}
