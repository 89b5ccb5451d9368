//! Authentication error types.

use clinic_core::error::ClinicError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is inactive")]
    AccountInactive,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    /// Issued before the principal's last credential change.
    #[error("token has been revoked")]
    TokenRevoked,

    #[error("password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for ClinicError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::AccountInactive
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_)
            | AuthError::TokenRevoked => ClinicError::unauthenticated(err.to_string()),
            AuthError::PasswordTooShort(_) => ClinicError::invalid("password", err.to_string()),
            AuthError::Crypto(msg) => ClinicError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_surfaces_as_unauthenticated_mentioning_expiry() {
        let err: ClinicError = AuthError::TokenExpired.into();
        match err {
            ClinicError::Unauthenticated { reason } => assert!(reason.contains("expired")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_password_is_a_field_error() {
        let err: ClinicError = AuthError::PasswordTooShort(6).into();
        assert!(matches!(err, ClinicError::Validation { ref errors } if errors[0].field == "password"));
    }
}
