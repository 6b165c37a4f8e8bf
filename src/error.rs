//! Error taxonomy for order negotiation
use crate::access::RoleCode;
use crate::offer::OfferStatus;
use crate::order::{OrderKind, OrderStatus};
use crate::state_machine::OrderEvent;
use std::convert::Infallible;

pub type Result<T> = std::result::Result<T, Error>;

/// Caller input was malformed or missing. Nothing was written.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Order title is required")]
    MissingTitle,
    #[error("Order title exceeds {max} characters")]
    TitleTooLong { max: usize },
    #[error("Money amount is required")]
    MissingAmount,
    #[error("Money amount must be an integer, got {0:?}")]
    InvalidAmount(String),
    #[error("Invalid currency code {0:?}")]
    InvalidCurrency(String),
    #[error("Deposit percent must be within 0..=100, got {0}")]
    InvalidDepositPercent(u32),
    #[error("Active {role} role required to post a {kind} order")]
    RoleRequired { role: RoleCode, kind: OrderKind },
    #[error("Cannot make an offer on your own order")]
    OwnOrder,
    #[error("Invalid id: {0}")]
    InvalidId(String),
}

/// The request collided with the current state of a record.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    #[error("Order is not open. Current status: {0}")]
    OrderNotOpen(OrderStatus),
    #[error("Offer is not pending. Current status: {0}")]
    OfferNotPending(OfferStatus),
    #[error("Actor already has a pending offer on this order")]
    DuplicatePendingOffer,
    #[error("Transition {event} is not allowed. Current status: {current}")]
    InvalidTransition {
        current: OrderStatus,
        event: OrderEvent,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum IdError {
    #[error("Invalid human readable part: {0}")]
    Hrp(#[from] bech32::primitives::hrp::Error),
    #[error("Failed to encode id: {0}")]
    Encode(#[from] bech32::EncodeError),
    #[error("Failed to decode id: {0}")]
    Decode(#[from] bech32::DecodeError),
    #[error("Expected an id prefixed {expected:?}, found {found:?}")]
    Prefix { expected: String, found: String },
    #[error("Id payload must be 16 bytes, got {0}")]
    Length(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Permission denied: {0}")]
    PermissionDenied(&'static str),
    #[error("Conflict: {0}")]
    Conflict(#[from] Conflict),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Timed out waiting for the {entity} lock on {id}")]
    LockTimeout { entity: &'static str, id: String },
    #[error("The {entity} lock on {id} must be held first")]
    LockOrder { entity: &'static str, id: String },
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("Encoding error: {0}")]
    Encode(#[from] minicbor::encode::Error<Infallible>),
    #[error("Decoding error: {0}")]
    Decode(#[from] minicbor::decode::Error),
}

impl From<IdError> for ValidationError {
    fn from(value: IdError) -> Self {
        ValidationError::InvalidId(value.to_string())
    }
}

impl From<IdError> for Error {
    fn from(value: IdError) -> Self {
        Error::Validation(value.into())
    }
}

impl Error {
    /// Status code for an HTTP request layer.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Unauthenticated => 401,
            Error::PermissionDenied(_) => 403,
            Error::NotFound { .. } => 404,
            Error::Conflict(_) | Error::LockTimeout { .. } => 409,
            Error::LockOrder { .. }
            | Error::Storage(_)
            | Error::Encode(_)
            | Error::Decode(_) => 500,
        }
    }

    /// Conflicts and lock timeouts may succeed if retried with fresh data.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::LockTimeout { .. })
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_is_reported_as_conflict() {
        let err = Error::LockTimeout {
            entity: "order",
            id: "order1xyz".into(),
        };

        assert!(err.is_conflict());
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn invalid_transition_carries_status_and_event() {
        let err: Error = Conflict::InvalidTransition {
            current: OrderStatus::OfferSelected,
            event: OrderEvent::AcceptOffer,
        }
        .into();

        let msg = err.to_string();
        assert!(msg.contains("accept_offer"));
        assert!(msg.contains("OFFER_SELECTED"));
        assert_eq!(err.http_status(), 409);
    }

    #[test]
    fn own_order_is_a_bad_request() {
        let err: Error = ValidationError::OwnOrder.into();
        assert_eq!(err.http_status(), 400);
        assert!(!err.is_conflict());
    }
}
