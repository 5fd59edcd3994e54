// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Retry policy class for sync failures. The reconciler itself never
/// retries; callers use this to decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Errors that can end a sync attempt. Every variant maps to a distinct
/// user-facing message.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),

    #[error("remote error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("malformed remote payload: {0}")]
    Parse(String),

    #[error("local storage error: {0}")]
    Storage(String),

    #[error("sync already in progress")]
    InProgress,

    #[error("not signed in; sync needs an authenticated account")]
    NotAuthenticated,
}

impl SyncError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn retry_class(&self) -> ApiRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                401 | 403 => ApiRetryClass::ReauthRequired,
                408 | 409 | 423 | 425 | 429 => ApiRetryClass::Retryable,
                500..=599 => ApiRetryClass::Retryable,
                _ => ApiRetryClass::Permanent,
            },
            Self::Network(_) | Self::Quota(_) => ApiRetryClass::Retryable,
            Self::Parse(_) | Self::Storage(_) | Self::InProgress => ApiRetryClass::Permanent,
            Self::Auth(_) | Self::NotAuthenticated => ApiRetryClass::ReauthRequired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiRetryClass, SyncError};

    #[test]
    fn retry_class_for_auth_error_is_reauth() {
        assert_eq!(
            SyncError::api(401, "unauthorized").retry_class(),
            ApiRetryClass::ReauthRequired
        );
        assert_eq!(
            SyncError::Auth("expired session".to_owned()).retry_class(),
            ApiRetryClass::ReauthRequired
        );
    }

    #[test]
    fn retry_class_for_server_trouble_is_retryable() {
        assert_eq!(
            SyncError::api(503, "maintenance").retry_class(),
            ApiRetryClass::Retryable
        );
        assert_eq!(
            SyncError::Network("connection refused".to_owned()).retry_class(),
            ApiRetryClass::Retryable
        );
    }

    #[test]
    fn retry_class_for_client_bugs_is_permanent() {
        assert_eq!(
            SyncError::api(400, "bad payload").retry_class(),
            ApiRetryClass::Permanent
        );
        assert_eq!(SyncError::InProgress.retry_class(), ApiRetryClass::Permanent);
    }

    #[test]
    fn messages_are_distinguishable_per_kind() {
        let kinds = [
            SyncError::Network("x".to_owned()).to_string(),
            SyncError::Auth("x".to_owned()).to_string(),
            SyncError::Quota("x".to_owned()).to_string(),
            SyncError::Parse("x".to_owned()).to_string(),
            SyncError::InProgress.to_string(),
            SyncError::NotAuthenticated.to_string(),
        ];
        for (i, left) in kinds.iter().enumerate() {
            for right in kinds.iter().skip(i + 1) {
                assert_ne!(left, right);
            }
        }
    }
}
