//! Command-line login through a loopback redirect
//!
//! [`login`] runs the interactive Authorization Code + PKCE flow once: it
//! starts a listener on a loopback port, sends the user's browser to the
//! authority and persists the issued tokens when the browser comes back.
//! [`get_auth_token`] is used on every other invocation and never prompts;
//! it returns `None` when the user has to log in (again).
//!
//! ```no_run
//! # async fn run(settings: loopauth::Settings) -> Result<(), Box<dyn std::error::Error>> {
//! match loopauth::get_auth_token(&settings).await? {
//!     Some(token) => println!("{}", token.as_str()),
//!     None => loopauth::login(&settings).await?,
//! }
//! # Ok(())
//! # }
//! ```

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

use loopauth_tokens::{AccessToken, AuthError, SilentTokenProvider};

pub mod browser;
mod config;
pub mod login;

pub use config::{
    ConfigError, Opts, Settings, DEFAULT_CLIENT_ID, DEFAULT_LOGIN_TIMEOUT, DEFAULT_PORT,
    DEFAULT_SCOPES,
};
pub use login::{LoginError, LoginFlowController, LoginState};

/// Logs the user in interactively through their browser
///
/// Fails with [`LoginError::PortInUse`] when another login is already running.
pub async fn login(settings: &Settings) -> Result<(), LoginError> {
    LoginFlowController::from_settings(settings).run().await?;
    println!("You have logged in. You can now call other commands.");
    Ok(())
}

/// Gets an access token from the persisted cache without any user interaction
///
/// Returns `Ok(None)` when the user is not logged in or the session can no
/// longer be renewed. Storage failures and corrupt caches are errors.
pub async fn get_auth_token(settings: &Settings) -> Result<Option<AccessToken>, AuthError> {
    let provider = SilentTokenProvider::new(settings.client(), settings.scopes.clone())
        .with_account_selection(settings.account_selection.clone());

    match provider.get_token().await {
        Ok(token) => Ok(Some(token.into_access_token())),
        Err(AuthError::AuthenticationRequired) => Ok(None),
        Err(error) => Err(error),
    }
}
