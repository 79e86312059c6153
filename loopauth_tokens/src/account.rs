//! Signed-in accounts and the policy for choosing among them

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::clock::UnixTime;
use crate::error::AuthError;
use crate::{HomeAccountId, IdTokenRef};

/// An identity that has signed in through this client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// `<object id>.<tenant id>`
    pub home_account_id: HomeAccountId,
    /// The tenant the account signed in to
    pub tenant_id: String,
    /// The sign-in name, usually an email address
    pub username: String,
    /// Display name, if the ID token carried one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// When a token was last issued or served for this account
    #[serde(default)]
    pub last_used: UnixTime,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    oid: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    tid: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl Account {
    /// Builds an account from the claims of an ID token
    ///
    /// The token was received directly from the token endpoint over TLS, so its
    /// signature is not checked here.
    pub fn from_id_token(id_token: &IdTokenRef, last_used: UnixTime) -> Result<Self, AuthError> {
        let payload = id_token
            .as_str()
            .split('.')
            .nth(1)
            .ok_or(AuthError::InvalidIdToken("not a compact JWT"))?;
        let decoded = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|_| AuthError::InvalidIdToken("payload is not base64url"))?;
        let claims: IdTokenClaims = serde_json::from_slice(&decoded)
            .map_err(|_| AuthError::InvalidIdToken("payload is not a JSON claim set"))?;

        let object_id = claims
            .oid
            .or(claims.sub)
            .ok_or(AuthError::InvalidIdToken("no subject"))?;
        let tenant_id = claims.tid.unwrap_or_else(|| "common".to_owned());
        let username = claims
            .preferred_username
            .or(claims.email)
            .unwrap_or_default();

        Ok(Self {
            home_account_id: HomeAccountId::new(format!("{object_id}.{tenant_id}")),
            tenant_id,
            username,
            name: claims.name,
            last_used,
        })
    }
}

/// How silent acquisition chooses an account when the cache holds several
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AccountSelection {
    /// The account most recently served a token
    #[default]
    MostRecentlyUsed,
    /// The first account in cache order
    First,
    /// Only succeed when exactly one account is cached
    SingleAccountOnly,
    /// The account with this username, compared case-insensitively
    Username(String),
}

impl AccountSelection {
    /// Picks an account from `accounts`
    pub fn select<'a>(&self, accounts: &'a [Account]) -> Option<&'a Account> {
        match self {
            Self::MostRecentlyUsed => accounts.iter().max_by_key(|a| a.last_used),
            Self::First => accounts.first(),
            Self::SingleAccountOnly => match accounts {
                [only] => Some(only),
                [] => None,
                _ => {
                    tracing::warn!(
                        accounts = accounts.len(),
                        "multiple accounts cached but single-account policy in effect"
                    );
                    None
                }
            },
            Self::Username(username) => accounts
                .iter()
                .find(|a| a.username.eq_ignore_ascii_case(username)),
        }
    }
}
