//! Precondition check for exchanging a refresh token.
//!
//! [`validate_exchange`] is pure. The only way to obtain a [`ValidatedExchange`]
//! is through it, and [`RefreshTokenService::rotate_validated`] only accepts that
//! type, so a rotation cannot run on an unchecked record.
//!
//! [`RefreshTokenService::rotate_validated`]: super::RefreshTokenService::rotate_validated

use super::{errors::RefreshError, models::RefreshToken};
use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Why an exchange was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRejection {
    /// Presented payload does not match the record
    PayloadMismatch,
    OwnerMismatch,
    DeviceMismatch,
    Revoked,
    Expired,
}

impl From<RefreshRejection> for RefreshError {
    fn from(rejection: RefreshRejection) -> Self {
        match rejection {
            RefreshRejection::PayloadMismatch => RefreshError::NotFound,
            RefreshRejection::OwnerMismatch => RefreshError::OwnerMismatch,
            RefreshRejection::DeviceMismatch => RefreshError::DeviceMismatch,
            RefreshRejection::Revoked => RefreshError::Revoked,
            RefreshRejection::Expired => RefreshError::Expired,
        }
    }
}

/// Proof that a record passed [`validate_exchange`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedExchange {
    record: RefreshToken,
    checked_at: DateTime<Utc>,
}

impl ValidatedExchange {
    pub fn record(&self) -> &RefreshToken {
        &self.record
    }

    pub fn checked_at(&self) -> DateTime<Utc> {
        self.checked_at
    }

    pub(crate) fn into_record(self) -> RefreshToken {
        self.record
    }
}

/// Outcome of [`validate_exchange`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeCheck {
    Validated(ValidatedExchange),
    Rejected(RefreshRejection),
}

impl ExchangeCheck {
    /// Convert into a result for `?` propagation
    pub fn into_result(self) -> Result<ValidatedExchange, RefreshRejection> {
        match self {
            ExchangeCheck::Validated(validated) => Ok(validated),
            ExchangeCheck::Rejected(rejection) => Err(rejection),
        }
    }
}

/// Check that `record` may be exchanged by `user_id` on `device_id`.
///
/// A device is only compared when both the record and the request name one.
pub fn validate_exchange(
    record: &RefreshToken,
    presented_hash: &str,
    user_id: Uuid,
    device_id: Option<&str>,
    now: DateTime<Utc>,
) -> ExchangeCheck {
    let matches = record
        .payload_hash
        .as_bytes()
        .ct_eq(presented_hash.as_bytes());
    if !bool::from(matches) {
        return ExchangeCheck::Rejected(RefreshRejection::PayloadMismatch);
    }

    if record.user_id != user_id {
        return ExchangeCheck::Rejected(RefreshRejection::OwnerMismatch);
    }

    if let (Some(bound), Some(presented)) = (record.device_id.as_deref(), device_id) {
        if bound != presented {
            return ExchangeCheck::Rejected(RefreshRejection::DeviceMismatch);
        }
    }

    if record.revoked {
        return ExchangeCheck::Rejected(RefreshRejection::Revoked);
    }

    if record.is_expired_at(now) {
        return ExchangeCheck::Rejected(RefreshRejection::Expired);
    }

    ExchangeCheck::Validated(ValidatedExchange {
        record: record.clone(),
        checked_at: now,
    })
}
