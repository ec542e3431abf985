//! Validity checks for CoT events

use crate::event::CotEvent;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("event type is empty")]
    EmptyType,

    #[error("uid is empty")]
    EmptyUid,

    /// Both coordinates exactly zero is the "no position" sentinel.
    /// A genuine fix at the equator/prime meridian intersection is
    /// rejected too; consumers treat (0,0) as unset, so forwarding it
    /// would collide with that sentinel downstream.
    #[error("position is unset (lat and lon are both 0)")]
    UnsetPosition,

    #[error("hae is not a finite number: {0}")]
    InvalidHae(f64),

    #[error("ce is not a finite number: {0}")]
    InvalidCe(f64),

    #[error("le is not a finite number: {0}")]
    InvalidLe(f64),

    #[error("stale ({stale}) precedes start ({start})")]
    StaleBeforeStart { start: String, stale: String },
}

/// Check that an event is dispatchable, reporting the first failing field.
pub fn validate_event(event: &CotEvent) -> Result<(), ValidationError> {
    if event.event_type.is_empty() {
        return Err(ValidationError::EmptyType);
    }

    if event.uid.is_empty() {
        return Err(ValidationError::EmptyUid);
    }

    if event.lat == 0.0 && event.lon == 0.0 {
        return Err(ValidationError::UnsetPosition);
    }

    if !event.hae.is_finite() {
        return Err(ValidationError::InvalidHae(event.hae));
    }

    if !event.ce.is_finite() {
        return Err(ValidationError::InvalidCe(event.ce));
    }

    if !event.le.is_finite() {
        return Err(ValidationError::InvalidLe(event.le));
    }

    if event.stale < event.start {
        return Err(ValidationError::StaleBeforeStart {
            start: event.start.to_rfc3339(),
            stale: event.stale.to_rfc3339(),
        });
    }

    Ok(())
}

/// Boolean convenience over [`validate_event`].
pub fn is_valid(event: &CotEvent) -> bool {
    validate_event(event).is_ok()
}
