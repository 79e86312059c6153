//! Error kinds surfaced by the token cache and silent acquisition

use std::io;

use thiserror::Error;

use crate::authority::TokenRequestError;

/// A failure reading or writing the persisted token cache
#[derive(Debug, Error)]
pub enum StoreError {
    /// No cache has been persisted yet
    ///
    /// This is the first-run condition and is not a failure from the user's point of view.
    #[error("token cache not found")]
    NotFound,
    /// The underlying storage failed
    #[error("token cache storage error")]
    Io(#[source] io::Error),
}

impl StoreError {
    /// Whether this error is the first-run "no cache yet" condition
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(err)
        }
    }
}

/// An error while obtaining or persisting tokens
#[derive(Debug, Error)]
pub enum AuthError {
    /// There is no usable cached session; the user must run the interactive login
    #[error("not authenticated, please login first")]
    AuthenticationRequired,
    /// The authority rejected or could not process the authorization code
    #[error("authorization code exchange failed")]
    CodeExchangeFailed(#[source] TokenRequestError),
    /// The refresh token could not be redeemed
    ///
    /// Silent acquisition downgrades this to [`AuthError::AuthenticationRequired`].
    #[error("silent token refresh failed")]
    SilentRefreshFailed(#[source] TokenRequestError),
    /// No refresh token is cached for the account
    #[error("no refresh token cached for account")]
    NoRefreshToken,
    /// The authority returned tokens without a usable ID token
    #[error("ID token missing or malformed: {0}")]
    InvalidIdToken(&'static str),
    /// The persisted cache could not be read or written
    #[error(transparent)]
    Storage(#[from] StoreError),
    /// The persisted cache exists but does not hold a readable token cache
    #[error("persisted token cache is corrupt")]
    CorruptCache(#[source] serde_json::Error),
}

impl AuthError {
    /// Whether re-running the interactive login is the only recovery
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRequired | Self::SilentRefreshFailed(_) | Self::NoRefreshToken
        )
    }
}
