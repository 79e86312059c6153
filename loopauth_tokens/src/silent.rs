//! Silent token acquisition for every CLI invocation

use std::sync::Arc;

use crate::account::AccountSelection;
use crate::client::{PublicClientApplication, SilentRequest};
use crate::error::AuthError;
use crate::scopes::Scopes;
use crate::TokenWithLifetime;

/// Obtains access tokens from the persisted cache without ever prompting the user
///
/// Each call re-reads the persisted cache, picks an account per the configured
/// [`AccountSelection`], and acquires a token silently. Any rotated tokens are
/// written back before the token is returned.
#[derive(Debug, Clone)]
pub struct SilentTokenProvider {
    client: Arc<PublicClientApplication>,
    scopes: Scopes,
    selection: AccountSelection,
}

impl SilentTokenProvider {
    /// Constructs a provider requesting `scopes`, choosing the most recently used account
    pub fn new(client: Arc<PublicClientApplication>, scopes: Scopes) -> Self {
        Self {
            client,
            scopes,
            selection: AccountSelection::default(),
        }
    }

    /// Sets the account selection policy
    pub fn with_account_selection(mut self, selection: AccountSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Gets a usable access token
    ///
    /// Returns [`AuthError::AuthenticationRequired`] when there is no cached
    /// account or the cached session can no longer be renewed. Storage failures
    /// and corrupt caches are returned as their own errors.
    #[tracing::instrument(skip(self), fields(selection = ?self.selection))]
    pub async fn get_token(&self) -> Result<TokenWithLifetime, AuthError> {
        let cache = self.client.token_cache();
        cache.read_from_persistence().await?;

        let accounts = cache.all_accounts().await;
        if accounts.is_empty() {
            tracing::debug!("no cached accounts");
            return Err(AuthError::AuthenticationRequired);
        }

        let account = self.selection.select(&accounts).ok_or_else(|| {
            tracing::debug!(accounts = accounts.len(), "no cached account matches selection policy");
            AuthError::AuthenticationRequired
        })?;

        let request = SilentRequest {
            account,
            scopes: &self.scopes,
        };

        let result = match self.client.acquire_token_silent(request).await {
            Ok(result) => result,
            Err(error) if error.requires_login() => {
                let oauth_error = match &error {
                    AuthError::SilentRefreshFailed(source) => source.oauth_error(),
                    _ => None,
                };
                tracing::info!(
                    error = (&error as &dyn std::error::Error),
                    oauth.error = oauth_error.as_ref().map(|e| e.error.as_str()),
                    "silent acquisition failed, interactive login required"
                );
                return Err(AuthError::AuthenticationRequired);
            }
            Err(error) => return Err(error),
        };

        cache.write_to_persistence().await?;

        tracing::debug!(
            account = %result.account.home_account_id,
            from_cache = result.from_cache,
            expiry = result.token.expiry().0,
            "acquired access token silently"
        );

        Ok(result.token)
    }
}
