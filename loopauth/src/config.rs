//! Runtime settings, from the command line and the environment

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Args;
use loopauth_tokens::{
    authority::{Authority, AuthorityClient, DEFAULT_AUTHORITY},
    plugin::StorePlugin,
    store::FileCacheStore,
    AccountSelection, ClientId, PublicClientApplication, Scopes,
};
use thiserror::Error;

/// The client ID registered for this application
pub const DEFAULT_CLIENT_ID: &str = "592d78a9-a99b-4188-bfe0-8a0331f7ec2d";

/// The scopes requested on login and on every silent acquisition
pub const DEFAULT_SCOPES: &str = "User.Read Files.Read";

/// The loopback port the login listener binds to
pub const DEFAULT_PORT: u16 = 3000;

/// How long a login waits for the browser to come back
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything a login or a token acquisition needs to know
#[derive(Clone, Debug)]
pub struct Settings {
    /// The public client ID
    pub client_id: ClientId,
    /// The authority's endpoints
    pub authority: Authority,
    /// Scopes requested for the access token
    pub scopes: Scopes,
    /// Loopback port for the login listener; `0` picks any free port
    pub port: u16,
    /// Where the token cache is persisted
    pub cache_file: PathBuf,
    /// How long to wait for a login to complete; `None` waits forever
    pub login_timeout: Option<Duration>,
    /// Which cached account silent acquisition uses
    pub account_selection: AccountSelection,
}

impl Settings {
    /// Default settings, persisting the cache at `cache_file`
    pub fn new(cache_file: impl Into<PathBuf>, authority: Authority) -> Self {
        Self {
            client_id: ClientId::from_static(DEFAULT_CLIENT_ID),
            authority,
            scopes: DEFAULT_SCOPES.parse().unwrap_or_default(),
            port: DEFAULT_PORT,
            cache_file: cache_file.into(),
            login_timeout: Some(DEFAULT_LOGIN_TIMEOUT),
            account_selection: AccountSelection::default(),
        }
    }

    /// Builds a client whose token cache lives in [`Settings::cache_file`]
    pub fn client(&self) -> Arc<PublicClientApplication> {
        let plugin = StorePlugin::new(FileCacheStore::new(&self.cache_file));
        let authority = AuthorityClient::new(reqwest::Client::new(), self.authority.clone());
        Arc::new(PublicClientApplication::new(
            self.client_id.clone(),
            authority,
            Arc::new(plugin),
        ))
    }
}

/// Settings could not be assembled
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No cache file was given and there is no home directory to default to
    #[error("unable to locate the home directory; set LOOPAUTH_CACHE_FILE")]
    NoHomeDirectory,
    /// The authority is not a valid URL
    #[error("invalid authority URL")]
    InvalidAuthority(#[from] url::ParseError),
}

/// Command-line options shared by every subcommand
#[derive(Debug, Args)]
pub struct Opts {
    /// The client ID registered with the authority
    #[arg(long, env = "LOOPAUTH_CLIENT_ID", default_value = DEFAULT_CLIENT_ID, global = true)]
    client_id: String,

    /// The authority base URL, including the tenant
    #[arg(long, env = "LOOPAUTH_AUTHORITY", default_value = DEFAULT_AUTHORITY, global = true)]
    authority: String,

    /// Space-separated scopes to request
    #[arg(long, env = "LOOPAUTH_SCOPES", default_value = DEFAULT_SCOPES, global = true)]
    scopes: Scopes,

    /// The loopback port the login listener binds to
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT, global = true)]
    port: u16,

    /// The file the token cache is persisted to [default: ~/.onedrive-cli.json]
    #[arg(long, env = "LOOPAUTH_CACHE_FILE", global = true)]
    cache_file: Option<PathBuf>,

    /// Seconds to wait for a login to complete; 0 waits forever
    #[arg(
        long,
        env = "LOOPAUTH_LOGIN_TIMEOUT_SECS",
        default_value_t = DEFAULT_LOGIN_TIMEOUT.as_secs(),
        global = true
    )]
    login_timeout_secs: u64,

    /// Use the cached account with this username instead of the most recently used one
    #[arg(long, env = "LOOPAUTH_ACCOUNT", global = true)]
    account: Option<String>,
}

impl Opts {
    /// Resolves the options into settings
    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        let cache_file = match self.cache_file {
            Some(path) => path,
            None => FileCacheStore::default_path().ok_or(ConfigError::NoHomeDirectory)?,
        };

        let mut settings = Settings::new(cache_file, Authority::from_base(&self.authority)?);
        settings.client_id = ClientId::new(self.client_id);
        settings.scopes = self.scopes;
        settings.port = self.port;
        settings.login_timeout = match self.login_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        if let Some(username) = self.account {
            settings.account_selection = AccountSelection::Username(username);
        }

        Ok(settings)
    }
}
