//! The in-memory token cache and its serialized form
//!
//! The cache owns its schema. It is loaded from and flushed to storage only
//! through a [`CachePlugin`], which sees nothing but opaque bytes.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::account::Account;
use crate::error::AuthError;
use crate::plugin::CachePlugin;
use crate::store::CacheContents;
use crate::{HomeAccountId, HomeAccountIdRef, IdToken, RefreshToken, TokenWithLifetime};

/// Version written into every serialized cache
pub const CACHE_SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct AccessTokenEntry {
    home_account_id: HomeAccountId,
    scopes: String,
    token: TokenWithLifetime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct RefreshTokenEntry {
    home_account_id: HomeAccountId,
    refresh_token: RefreshToken,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct IdTokenEntry {
    home_account_id: HomeAccountId,
    id_token: IdToken,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    accounts: BTreeMap<String, Account>,
    #[serde(default)]
    access_tokens: BTreeMap<String, AccessTokenEntry>,
    #[serde(default)]
    refresh_tokens: BTreeMap<String, RefreshTokenEntry>,
    #[serde(default)]
    id_tokens: BTreeMap<String, IdTokenEntry>,
}

fn access_token_key(account: &HomeAccountIdRef, scopes_key: &str) -> String {
    format!("{}|{}", account.as_str(), scopes_key)
}

impl CacheDocument {
    fn decode(contents: &CacheContents) -> Result<Self, serde_json::Error> {
        if contents.is_empty() {
            Ok(Self::default())
        } else {
            serde_json::from_slice(contents.as_bytes())
        }
    }

    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Entries held in `self` replace entries with the same key in `persisted`
    fn merged_over(&self, mut persisted: CacheDocument) -> CacheDocument {
        persisted.version = CACHE_SCHEMA_VERSION;
        persisted.accounts.extend(self.accounts.clone());
        persisted.access_tokens.extend(self.access_tokens.clone());
        persisted.refresh_tokens.extend(self.refresh_tokens.clone());
        persisted.id_tokens.extend(self.id_tokens.clone());
        persisted
    }
}

/// A set of tokens to record for an account
#[derive(Debug)]
pub(crate) struct TokenSet {
    pub account: Account,
    pub scopes_key: String,
    pub access_token: TokenWithLifetime,
    pub refresh_token: Option<RefreshToken>,
    pub id_token: Option<IdToken>,
}

/// The token cache of a public client application
pub struct TokenCache {
    plugin: Arc<dyn CachePlugin>,
    state: Mutex<CacheDocument>,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("TokenCache").finish_non_exhaustive()
    }
}

impl TokenCache {
    /// Constructs an empty cache persisted through `plugin`
    pub fn new(plugin: Arc<dyn CachePlugin>) -> Self {
        Self {
            plugin,
            state: Mutex::new(CacheDocument::default()),
        }
    }

    /// Replaces the in-memory cache with the persisted one
    ///
    /// An absent cache loads as empty. A persisted cache that cannot be decoded
    /// is reported as [`AuthError::CorruptCache`] rather than silently discarded.
    pub async fn read_from_persistence(&self) -> Result<(), AuthError> {
        let contents = self.plugin.read_from_storage().await?;
        let document = CacheDocument::decode(&contents).map_err(AuthError::CorruptCache)?;

        tracing::debug!(
            accounts = document.accounts.len(),
            "loaded token cache from persistence"
        );

        *self.state.lock().await = document;
        Ok(())
    }

    /// Flushes the in-memory cache to storage, merging with what is persisted
    ///
    /// Entries in memory win over persisted entries with the same key; entries
    /// only present in storage (for example, written by another process) are kept.
    pub async fn write_to_persistence(&self) -> Result<(), AuthError> {
        let snapshot = self.state.lock().await.clone();
        let mut current = snapshot.clone();
        current.version = CACHE_SCHEMA_VERSION;
        let fallback = current.encode().map_err(AuthError::CorruptCache)?;

        self.plugin
            .write_to_storage(Box::new(move |old| {
                let persisted = match old.as_ref().map(CacheDocument::decode) {
                    None => CacheDocument::default(),
                    Some(Ok(doc)) => doc,
                    Some(Err(error)) => {
                        tracing::warn!(
                            error = (&error as &dyn std::error::Error),
                            "persisted token cache unreadable, overwriting"
                        );
                        CacheDocument::default()
                    }
                };

                match snapshot.merged_over(persisted).encode() {
                    Ok(bytes) => CacheContents::new(bytes),
                    Err(error) => {
                        tracing::error!(
                            error = (&error as &dyn std::error::Error),
                            "unable to encode merged token cache, writing in-memory state"
                        );
                        CacheContents::new(fallback)
                    }
                }
            }))
            .await?;

        tracing::debug!("flushed token cache to persistence");
        Ok(())
    }

    /// All accounts currently in the in-memory cache, in cache order
    pub async fn all_accounts(&self) -> Vec<Account> {
        self.state.lock().await.accounts.values().cloned().collect()
    }

    pub(crate) async fn record(&self, set: TokenSet) {
        let mut state = self.state.lock().await;
        let home = set.account.home_account_id.clone();

        state.access_tokens.insert(
            access_token_key(&home, &set.scopes_key),
            AccessTokenEntry {
                home_account_id: home.clone(),
                scopes: set.scopes_key,
                token: set.access_token,
            },
        );

        if let Some(refresh_token) = set.refresh_token {
            state.refresh_tokens.insert(
                home.as_str().to_owned(),
                RefreshTokenEntry {
                    home_account_id: home.clone(),
                    refresh_token,
                },
            );
        }

        if let Some(id_token) = set.id_token {
            state.id_tokens.insert(
                home.as_str().to_owned(),
                IdTokenEntry {
                    home_account_id: home.clone(),
                    id_token,
                },
            );
        }

        state
            .accounts
            .insert(home.as_str().to_owned(), set.account);
    }

    pub(crate) async fn access_token(
        &self,
        account: &HomeAccountIdRef,
        scopes_key: &str,
    ) -> Option<TokenWithLifetime> {
        self.state
            .lock()
            .await
            .access_tokens
            .get(&access_token_key(account, scopes_key))
            .map(|e| e.token.clone())
    }

    pub(crate) async fn refresh_token(&self, account: &HomeAccountIdRef) -> Option<RefreshToken> {
        self.state
            .lock()
            .await
            .refresh_tokens
            .get(account.as_str())
            .map(|e| e.refresh_token.clone())
    }

    pub(crate) async fn touch(&self, account: &HomeAccountIdRef, now: crate::clock::UnixTime) {
        if let Some(a) = self.state.lock().await.accounts.get_mut(account.as_str()) {
            a.last_used = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{DurationSecs, UnixTime};
    use crate::plugin::StorePlugin;
    use crate::store::{CacheStore, InMemoryCacheStore};
    use crate::{AccessToken, TokenLifetimeConfig};

    fn account(id: &str) -> Account {
        Account {
            home_account_id: HomeAccountId::new(format!("{id}.tenant")),
            tenant_id: "tenant".to_owned(),
            username: format!("{id}@example.com"),
            name: None,
            last_used: UnixTime(1),
        }
    }

    fn token_set(id: &str, access: &str, refresh: &str) -> TokenSet {
        TokenSet {
            account: account(id),
            scopes_key: "files.read user.read".to_owned(),
            access_token: TokenLifetimeConfig::default().create_token(
                AccessToken::new(access.to_owned()),
                UnixTime(1_000),
                DurationSecs(3_600),
            ),
            refresh_token: Some(RefreshToken::new(refresh.to_owned())),
            id_token: None,
        }
    }

    fn cache_over(store: Arc<InMemoryCacheStore>) -> TokenCache {
        TokenCache::new(Arc::new(StorePlugin::new(store)))
    }

    #[tokio::test]
    async fn absent_persistence_loads_empty() {
        let cache = cache_over(Arc::new(InMemoryCacheStore::new()));
        cache.read_from_persistence().await.unwrap();
        assert!(cache.all_accounts().await.is_empty());
    }

    #[tokio::test]
    async fn written_cache_reloads_in_new_instance() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = cache_over(store.clone());
        cache.record(token_set("alice", "at-1", "rt-1")).await;
        cache.write_to_persistence().await.unwrap();

        let reloaded = cache_over(store);
        reloaded.read_from_persistence().await.unwrap();
        let accounts = reloaded.all_accounts().await;
        assert_eq!(accounts, vec![account("alice")]);

        let home = &accounts[0].home_account_id;
        assert_eq!(
            reloaded.refresh_token(home).await.unwrap().as_str(),
            "rt-1"
        );
        assert_eq!(
            reloaded
                .access_token(home, "files.read user.read")
                .await
                .unwrap()
                .access_token()
                .as_str(),
            "at-1"
        );
    }

    #[tokio::test]
    async fn write_keeps_accounts_persisted_by_others() {
        let store = Arc::new(InMemoryCacheStore::new());

        let other = cache_over(store.clone());
        other.record(token_set("bob", "at-b", "rt-b")).await;
        other.write_to_persistence().await.unwrap();

        let cache = cache_over(store.clone());
        cache.record(token_set("alice", "at-a", "rt-a")).await;
        cache.write_to_persistence().await.unwrap();

        let reloaded = cache_over(store);
        reloaded.read_from_persistence().await.unwrap();
        let names: Vec<_> = reloaded
            .all_accounts()
            .await
            .into_iter()
            .map(|a| a.username)
            .collect();
        assert_eq!(names, vec!["alice@example.com", "bob@example.com"]);
    }

    #[tokio::test]
    async fn rotated_refresh_token_replaces_persisted_one() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = cache_over(store.clone());
        cache.record(token_set("alice", "at-1", "rt-1")).await;
        cache.write_to_persistence().await.unwrap();
        cache.record(token_set("alice", "at-2", "rt-2")).await;
        cache.write_to_persistence().await.unwrap();

        let reloaded = cache_over(store);
        reloaded.read_from_persistence().await.unwrap();
        let home = HomeAccountId::new("alice.tenant".to_owned());
        assert_eq!(reloaded.refresh_token(&home).await.unwrap().as_str(), "rt-2");
    }

    #[tokio::test]
    async fn corrupt_persistence_is_an_error() {
        let store = Arc::new(InMemoryCacheStore::with_contents(CacheContents::from(
            b"{ not json".to_vec(),
        )));
        let cache = cache_over(store);
        assert!(matches!(
            cache.read_from_persistence().await,
            Err(AuthError::CorruptCache(_))
        ));
    }

    #[tokio::test]
    async fn write_overwrites_corrupt_persistence() {
        let store = Arc::new(InMemoryCacheStore::with_contents(CacheContents::from(
            b"{ not json".to_vec(),
        )));
        let cache = cache_over(store.clone());
        cache.record(token_set("alice", "at", "rt")).await;
        cache.write_to_persistence().await.unwrap();

        let persisted = store.load().await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(persisted.as_bytes()).unwrap();
        assert_eq!(value["version"], CACHE_SCHEMA_VERSION);
        assert!(value["accounts"]["alice.tenant"].is_object());
    }
}
