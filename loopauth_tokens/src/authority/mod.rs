//! The identity provider's authorization and token endpoints

use thiserror::Error;
use url::Url;

use crate::ClientIdRef;

pub mod dto;

pub use dto::{AuthorizationCodeGrant, OAuthErrorBody, RefreshTokenGrant, TokenResponse};

/// The default authority, accepting both work/school and personal accounts
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/common";

/// The endpoints of an OAuth2 authority
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authority {
    authorize_url: Url,
    token_url: Url,
}

impl Authority {
    /// Derives the v2.0 endpoints from an authority base such as
    /// `https://login.microsoftonline.com/<tenant>`
    pub fn from_base(base: &str) -> Result<Self, url::ParseError> {
        let base = base.trim_end_matches('/');
        Ok(Self {
            authorize_url: Url::parse(&format!("{base}/oauth2/v2.0/authorize"))?,
            token_url: Url::parse(&format!("{base}/oauth2/v2.0/token"))?,
        })
    }

    /// The authorization endpoint the browser is sent to
    pub fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }

    /// The token endpoint codes and refresh tokens are redeemed at
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }
}

/// A grant that can be redeemed at the token endpoint
pub trait Grant: serde::Serialize {
    /// The client ID of the client making the request
    fn client_id(&self) -> &ClientIdRef;
    /// The grant type or flow to be performed
    fn grant_type() -> &'static str;
}

/// An error while attempting to request a new token from the authority
#[derive(Debug, Error)]
pub enum TokenRequestError {
    /// An error from the authority with an error body
    #[error("error requesting token from authority: {body}")]
    ErrorWithBody {
        /// The underlying request error
        source: reqwest::Error,
        /// The body of the error
        body: String,
    },
    /// Unable to deserialize the token body
    #[error("error deserializing token body from authority")]
    TokenBodyError(#[from] serde_json::Error),
    /// Unable to read the response
    #[error("error reading response body")]
    BodyReadError(#[source] reqwest::Error),
    /// Unable to send a token request to the authority
    #[error("error sending request to authority")]
    RequestSend(#[source] reqwest::Error),
}

impl TokenRequestError {
    /// The OAuth2 error body returned by the authority, if there was one
    pub fn oauth_error(&self) -> Option<OAuthErrorBody> {
        match self {
            Self::ErrorWithBody { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }
}

/// Redeems grants at an authority's token endpoint
#[derive(Clone, Debug)]
pub struct AuthorityClient {
    client: reqwest::Client,
    authority: Authority,
}

impl AuthorityClient {
    /// Constructs a new authority client
    pub fn new(client: reqwest::Client, authority: Authority) -> Self {
        Self { client, authority }
    }

    /// The authority's endpoints
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Redeems a grant for tokens
    #[tracing::instrument(
        err,
        skip(self, grant),
        fields(
            token_url = %self.authority.token_url,
            grant.grant_type = G::grant_type(),
            grant.client_id = %grant.client_id(),
        ),
    )]
    pub async fn request_token<G: Grant + Sync>(
        &self,
        grant: &G,
    ) -> Result<TokenResponse, TokenRequestError> {
        tracing::trace!("requesting token from authority");

        let resp = self
            .client
            .post(self.authority.token_url.clone())
            .form(grant)
            .send()
            .await
            .map_err(TokenRequestError::RequestSend)?;

        tracing::debug!(
            response.status = resp.status().as_u16(),
            "received token response from issuing authority"
        );

        if let Err(error) = resp.error_for_status_ref() {
            let body = resp
                .text()
                .await
                .map_err(TokenRequestError::BodyReadError)?;
            return Err(TokenRequestError::ErrorWithBody {
                source: error,
                body,
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(TokenRequestError::BodyReadError)?;
        let resp: TokenResponse = serde_json::from_slice(&body)?;

        tracing::info!(
            has_id_token = resp.id_token.is_some(),
            has_refresh_token = resp.refresh_token.is_some(),
            lifetime = resp.expires_in.0,
            "received new tokens"
        );

        Ok(resp)
    }
}
