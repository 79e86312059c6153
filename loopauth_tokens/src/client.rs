//! A public (secretless) OAuth2 client with a persistent token cache

use std::{fmt, sync::Arc};

use url::Url;

use crate::account::Account;
use crate::authority::{AuthorityClient, AuthorizationCodeGrant, RefreshTokenGrant, TokenResponse};
use crate::cache::{TokenCache, TokenSet};
use crate::clock::{Clock, System};
use crate::error::AuthError;
use crate::pkce::PkceCodes;
use crate::plugin::CachePlugin;
use crate::scopes::Scopes;
use crate::{AuthorizationCode, ClientId, ClientIdRef, TokenLifetimeConfig, TokenStatus, TokenWithLifetime};

/// The `prompt` hint sent on the authorization request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prompt {
    /// Let the user pick among signed-in accounts
    SelectAccount,
    /// Force credentials to be entered
    Login,
    /// Force the consent screen
    Consent,
}

impl Prompt {
    /// The wire value
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelectAccount => "select_account",
            Self::Login => "login",
            Self::Consent => "consent",
        }
    }
}

/// Parameters for building the authorization URL
#[derive(Debug)]
pub struct AuthCodeUrlParameters<'a> {
    /// Scopes to request
    pub scopes: &'a Scopes,
    /// Where the authority sends the browser back to
    pub redirect_uri: &'a str,
    /// Optional prompt hint
    pub prompt: Option<Prompt>,
    /// Anti-forgery value echoed back on the redirect
    pub state: &'a str,
    /// PKCE codes; only the challenge is sent
    pub pkce: &'a PkceCodes,
}

/// A request to redeem an authorization code
#[derive(Debug)]
pub struct AuthorizationCodeRequest<'a> {
    /// The code from the redirect
    pub code: AuthorizationCode,
    /// The redirect URI used on the authorization request
    pub redirect_uri: &'a str,
    /// Scopes to request
    pub scopes: &'a Scopes,
    /// The PKCE codes used on the authorization request
    pub pkce: &'a PkceCodes,
}

/// A request for a token without user interaction
#[derive(Debug)]
pub struct SilentRequest<'a> {
    /// The account to acquire a token for
    pub account: &'a Account,
    /// Scopes to request
    pub scopes: &'a Scopes,
}

/// Tokens issued for an account
#[derive(Clone, Debug)]
pub struct AuthenticationResult {
    /// The access token and its lifetime
    pub token: TokenWithLifetime,
    /// The account the token was issued to
    pub account: Account,
    /// Whether the access token was served from the cache without contacting the authority
    pub from_cache: bool,
}

/// A public client application
///
/// Redeems authorization codes and refresh tokens at the authority, records
/// the results in its [`TokenCache`], and serves cached access tokens while
/// they are fresh. Persistence is explicit: callers flush the cache with
/// [`TokenCache::write_to_persistence`] after an acquisition.
pub struct PublicClientApplication {
    client_id: ClientId,
    authority: AuthorityClient,
    cache: TokenCache,
    lifetime_config: TokenLifetimeConfig,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl fmt::Debug for PublicClientApplication {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PublicClientApplication")
            .field("client_id", &self.client_id)
            .field("authority", self.authority.authority())
            .field("cache", &self.cache)
            .field("lifetime_config", &self.lifetime_config)
            .finish_non_exhaustive()
    }
}

impl PublicClientApplication {
    /// Constructs a new client whose cache is persisted through `plugin`
    pub fn new(client_id: ClientId, authority: AuthorityClient, plugin: Arc<dyn CachePlugin>) -> Self {
        Self {
            client_id,
            authority,
            cache: TokenCache::new(plugin),
            lifetime_config: TokenLifetimeConfig::default(),
            clock: Arc::new(System),
        }
    }

    /// Sets how long issued access tokens are served from the cache
    pub fn with_lifetime_config(mut self, lifetime_config: TokenLifetimeConfig) -> Self {
        self.lifetime_config = lifetime_config;
        self
    }

    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The client ID
    pub fn client_id(&self) -> &ClientIdRef {
        &self.client_id
    }

    /// The token cache
    pub fn token_cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Builds the URL of the authority's consent page
    pub fn auth_code_url(&self, params: &AuthCodeUrlParameters<'_>) -> Url {
        let mut url = self.authority.authority().authorize_url().clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", self.client_id.as_str())
                .append_pair("response_type", "code")
                .append_pair("response_mode", "query")
                .append_pair("redirect_uri", params.redirect_uri)
                .append_pair("scope", &params.scopes.to_request_string())
                .append_pair("state", params.state)
                .append_pair("code_challenge", params.pkce.code_challenge())
                .append_pair("code_challenge_method", params.pkce.code_challenge_method());
            if let Some(prompt) = params.prompt {
                query.append_pair("prompt", prompt.as_str());
            }
        }
        url
    }

    /// Redeems an authorization code and records the issued tokens in the cache
    pub async fn acquire_token_by_code(
        &self,
        request: AuthorizationCodeRequest<'_>,
    ) -> Result<AuthenticationResult, AuthError> {
        let grant = AuthorizationCodeGrant {
            client_id: self.client_id.clone(),
            code: request.code,
            redirect_uri: request.redirect_uri.to_owned(),
            code_verifier: request.pkce.code_verifier().to_owned(),
            scope: request.scopes.to_request_string(),
        };

        let resp = self
            .authority
            .request_token(&grant)
            .await
            .map_err(AuthError::CodeExchangeFailed)?;

        let now = self.clock.now();
        let id_token = resp
            .id_token
            .as_ref()
            .ok_or(AuthError::InvalidIdToken("no ID token in response"))?;
        let account = Account::from_id_token(id_token, now)?;

        tracing::info!(
            account = %account.home_account_id,
            username = %account.username,
            "signed in"
        );

        Ok(self.record(account, request.scopes, resp).await)
    }

    /// Acquires an access token for a cached account without user interaction
    ///
    /// A fresh cached access token is returned as is. Otherwise the cached
    /// refresh token is redeemed and the results recorded in the cache.
    pub async fn acquire_token_silent(
        &self,
        request: SilentRequest<'_>,
    ) -> Result<AuthenticationResult, AuthError> {
        let home = &request.account.home_account_id;
        let scopes_key = request.scopes.cache_key();
        let now = self.clock.now();

        if let Some(token) = self.cache.access_token(home, &scopes_key).await {
            let status = token.token_status_with_clock(&*self.clock);
            if status == TokenStatus::Fresh {
                tracing::debug!(
                    account = %home,
                    expiry = token.expiry().0,
                    "serving cached access token"
                );
                self.cache.touch(home, now).await;
                let mut account = request.account.clone();
                account.last_used = now;
                return Ok(AuthenticationResult {
                    token,
                    account,
                    from_cache: true,
                });
            }
            tracing::debug!(account = %home, ?status, "cached access token needs renewal");
        }

        let refresh_token = self
            .cache
            .refresh_token(home)
            .await
            .ok_or(AuthError::NoRefreshToken)?;

        let grant = RefreshTokenGrant {
            client_id: self.client_id.clone(),
            refresh_token,
            scope: request.scopes.to_request_string(),
        };

        let resp = self
            .authority
            .request_token(&grant)
            .await
            .map_err(AuthError::SilentRefreshFailed)?;

        let mut account = match resp.id_token.as_ref() {
            Some(id_token) => match Account::from_id_token(id_token, now) {
                Ok(fresh) if fresh.home_account_id == *home => fresh,
                _ => request.account.clone(),
            },
            None => request.account.clone(),
        };
        account.last_used = now;

        Ok(self.record(account, request.scopes, resp).await)
    }

    async fn record(&self, account: Account, scopes: &Scopes, resp: TokenResponse) -> AuthenticationResult {
        let token = self
            .lifetime_config
            .create_token(resp.access_token, self.clock.now(), resp.expires_in);

        self.cache
            .record(TokenSet {
                account: account.clone(),
                scopes_key: scopes.cache_key(),
                access_token: token.clone(),
                refresh_token: resp.refresh_token,
                id_token: resp.id_token,
            })
            .await;

        AuthenticationResult {
            token,
            account,
            from_cache: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::Authority;
    use crate::plugin::StorePlugin;
    use crate::store::InMemoryCacheStore;

    fn client() -> PublicClientApplication {
        let authority = Authority::from_base("https://login.example.com/common").unwrap();
        PublicClientApplication::new(
            ClientId::from_static("client-id"),
            AuthorityClient::new(reqwest::Client::new(), authority),
            Arc::new(StorePlugin::new(InMemoryCacheStore::new())),
        )
    }

    #[test]
    fn auth_code_url_carries_required_parameters() {
        let pkce = PkceCodes::from_verifier("verifier".to_owned());
        let scopes: Scopes = "User.Read Files.Read".parse().unwrap();
        let url = client().auth_code_url(&AuthCodeUrlParameters {
            scopes: &scopes,
            redirect_uri: "http://localhost:3000/redirect/",
            prompt: Some(Prompt::SelectAccount),
            state: "xyz",
            pkce: &pkce,
        });

        assert_eq!(
            url.as_str().split('?').next().unwrap(),
            "https://login.example.com/common/oauth2/v2.0/authorize"
        );
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client-id");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["redirect_uri"], "http://localhost:3000/redirect/");
        assert_eq!(
            params["scope"],
            "User.Read Files.Read openid profile offline_access"
        );
        assert_eq!(params["prompt"], "select_account");
        assert_eq!(params["state"], "xyz");
        assert_eq!(params["code_challenge"], pkce.code_challenge());
        assert_eq!(params["code_challenge_method"], "S256");
        assert!(!params.contains_key("code_verifier"));
    }
}
