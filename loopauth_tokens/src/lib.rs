//! Token lifecycle and cache persistence for loopback OAuth2 logins
//!
//! This library holds the credentials side of a command-line login helper: the
//! tokens obtained by an interactive Authorization Code + PKCE login are kept in
//! a token cache that is persisted to a local file, so that later invocations
//! can obtain a valid access token silently, redeeming the refresh token when
//! the cached access token is no longer fresh.
//!
//! The pieces, from storage upward:
//!
//! * [`store::CacheStore`] persists the serialized cache as an opaque byte
//!   sequence. [`store::FileCacheStore`] replaces the cache file atomically.
//! * [`plugin::CachePlugin`] is the narrow read/write interface the token cache
//!   calls into. [`plugin::StorePlugin`] bridges it onto a store, turning a
//!   missing cache into an empty one.
//! * [`PublicClientApplication`] owns a [`TokenCache`], builds authorization
//!   URLs, and redeems authorization codes and refresh tokens at the
//!   [`authority`].
//! * [`SilentTokenProvider`] serves access tokens on every invocation without
//!   ever prompting, reporting [`AuthError::AuthenticationRequired`] when the
//!   user has to log in again.
//!
//! ```no_run
//! use std::sync::Arc;
//! use loopauth_tokens::{
//!     authority::{Authority, AuthorityClient, DEFAULT_AUTHORITY},
//!     plugin::StorePlugin,
//!     store::FileCacheStore,
//!     AuthError, ClientId, PublicClientApplication, SilentTokenProvider,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let plugin = StorePlugin::new(FileCacheStore::new("/home/me/.onedrive-cli.json"));
//! let authority = AuthorityClient::new(reqwest::Client::new(), Authority::from_base(DEFAULT_AUTHORITY)?);
//! let client = PublicClientApplication::new(
//!     ClientId::from_static("592d78a9-a99b-4188-bfe0-8a0331f7ec2d"),
//!     authority,
//!     Arc::new(plugin),
//! );
//!
//! let provider = SilentTokenProvider::new(Arc::new(client), "User.Read Files.Read".parse()?);
//! match provider.get_token().await {
//!     Ok(token) => println!("{:#}", token.access_token()),
//!     Err(AuthError::AuthenticationRequired) => eprintln!("Not authenticated, please login first."),
//!     Err(other) => return Err(other.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! * `file` (default): the [`store::FileCacheStore`] backed by the local filesystem.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod account;
pub mod authority;
mod braids;
mod cache;
mod client;
pub mod clock;
mod error;
pub mod pkce;
pub mod plugin;
mod scopes;
mod silent;
pub mod store;
mod tokens;

pub use account::{Account, AccountSelection};
pub use braids::*;
pub use cache::{TokenCache, CACHE_SCHEMA_VERSION};
pub use client::{
    AuthCodeUrlParameters, AuthenticationResult, AuthorizationCodeRequest, Prompt,
    PublicClientApplication, SilentRequest,
};
pub use error::{AuthError, StoreError};
pub use scopes::{Scopes, RESERVED_SCOPES};
pub use silent::SilentTokenProvider;
pub use tokens::{TokenLifetimeConfig, TokenStatus, TokenWithLifetime};
