//! The interactive login: a short-lived loopback listener that completes an
//! Authorization Code + PKCE flow in the user's browser

use std::{
    fmt, io,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use loopauth_tokens::{
    pkce::{self, PkceCodes},
    Account, AuthError, PublicClientApplication, Scopes,
};
use thiserror::Error;
use tokio::{
    net::TcpListener,
    sync::{oneshot, watch, Mutex},
};

use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::config::Settings;

mod routes;

/// Where a login is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginState {
    /// Nothing has happened yet
    Idle,
    /// The loopback listener is bound and serving
    ListenerStarted,
    /// The browser has been sent to the listener
    AwaitingRedirect,
    /// The authority redirected the browser back
    CodeReceived,
    /// The authorization code is being redeemed
    Exchanging,
    /// Tokens were issued and the cache was written
    Persisted,
    /// The login did not succeed
    Failed,
    /// The listener has shut down
    Closed,
}

/// An error completing an interactive login
#[derive(Debug, Error)]
pub enum LoginError {
    /// The listener port is taken, usually by another login in progress
    #[error("port {port} is already in use; is another login in progress?")]
    PortInUse {
        /// The port that could not be bound
        port: u16,
        /// The bind error
        #[source]
        source: io::Error,
    },
    /// The loopback listener failed
    #[error("loopback listener failed")]
    Listener(#[source] io::Error),
    /// The authority redirected back with an error instead of a code
    #[error("authorization denied: {error}")]
    AuthorizationDenied {
        /// The OAuth2 error code, such as `access_denied`
        error: String,
        /// The authority's description of the error
        description: Option<String>,
    },
    /// The redirect's `state` does not belong to this login
    ///
    /// The listener answers such a redirect with this error and keeps waiting
    /// for the real one.
    #[error("redirect state does not match the login request")]
    StateMismatch,
    /// The redirect carried neither a code nor an error
    #[error("redirect did not include an authorization code")]
    MissingCode,
    /// The code could not be redeemed or the cache could not be written
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The browser never came back
    #[error("timed out waiting for the login to complete")]
    AuthenticationTimedOut,
}

type Outcome = Result<Account, LoginError>;

/// Everything the listener's handlers share for one login
struct Flow {
    client: Arc<PublicClientApplication>,
    scopes: Scopes,
    redirect_uri: String,
    pkce: PkceCodes,
    csrf_state: String,
    state: Arc<watch::Sender<LoginState>>,
    outcome: Mutex<Option<oneshot::Sender<Outcome>>>,
}

/// Runs one interactive login
///
/// Binding the listener port is what keeps two logins on the same machine
/// from running at once. The listener is always shut down before [`run`]
/// returns, whatever the outcome.
///
/// [`run`]: LoginFlowController::run
pub struct LoginFlowController {
    client: Arc<PublicClientApplication>,
    scopes: Scopes,
    port: u16,
    timeout: Option<Duration>,
    browser: Arc<dyn BrowserLauncher>,
    state: Arc<watch::Sender<LoginState>>,
}

impl fmt::Debug for LoginFlowController {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LoginFlowController")
            .field("client", &self.client)
            .field("scopes", &self.scopes)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl LoginFlowController {
    /// Constructs a login that listens on `port` and opens the system browser
    pub fn new(client: Arc<PublicClientApplication>, scopes: Scopes, port: u16) -> Self {
        let (state, _) = watch::channel(LoginState::Idle);
        Self {
            client,
            scopes,
            port,
            timeout: None,
            browser: Arc::new(SystemBrowser),
            state: Arc::new(state),
        }
    }

    /// Constructs a login from settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.client(), settings.scopes.clone(), settings.port)
            .with_timeout(settings.login_timeout)
    }

    /// Gives up waiting for the browser after `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Uses a custom browser launcher
    pub fn with_browser(mut self, browser: impl BrowserLauncher + 'static) -> Self {
        self.browser = Arc::new(browser);
        self
    }

    /// The current state
    pub fn state(&self) -> LoginState {
        *self.state.borrow()
    }

    /// Observes state transitions, including after the login has finished
    pub fn subscribe(&self) -> watch::Receiver<LoginState> {
        self.state.subscribe()
    }

    /// Runs the login to completion, returning the signed-in account
    pub async fn run(self) -> Result<Account, LoginError> {
        let result = self.serve().await;
        if let Err(error) = &result {
            tracing::error!(
                error = (error as &dyn std::error::Error),
                "login failed"
            );
            self.transition(LoginState::Failed);
        }
        self.transition(LoginState::Closed);
        result
    }

    async fn serve(&self) -> Result<Account, LoginError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, self.port))
            .await
            .map_err(|source| match source.kind() {
                io::ErrorKind::AddrInUse => LoginError::PortInUse {
                    port: self.port,
                    source,
                },
                _ => LoginError::Listener(source),
            })?;
        let addr = listener.local_addr().map_err(LoginError::Listener)?;
        self.transition(LoginState::ListenerStarted);

        let (outcome_tx, mut outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let flow = Arc::new(Flow {
            client: self.client.clone(),
            scopes: self.scopes.clone(),
            redirect_uri: format!("http://localhost:{}/redirect/", addr.port()),
            pkce: PkceCodes::generate(),
            csrf_state: pkce::generate_state(),
            state: self.state.clone(),
            outcome: Mutex::new(Some(outcome_tx)),
        });

        let app = routes::router(flow);
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        tracing::info!(%addr, "login listener started");

        self.transition(LoginState::AwaitingRedirect);
        self.open_browser(addr).await;

        let waited = self.wait_for(&mut outcome_rx).await;

        let _ = shutdown_tx.send(());
        match server.await {
            Ok(Ok(())) => tracing::debug!(%addr, "login listener closed"),
            Ok(Err(error)) => tracing::warn!(
                error = (&error as &dyn std::error::Error),
                "login listener exited with an error"
            ),
            Err(error) => tracing::warn!(
                error = (&error as &dyn std::error::Error),
                "login listener task failed"
            ),
        }

        // A redirect that was in flight when the wait gave up has finished by
        // now, and its outcome is what the browser was shown.
        match waited {
            Err(LoginError::AuthenticationTimedOut) => outcome_rx
                .try_recv()
                .unwrap_or(Err(LoginError::AuthenticationTimedOut)),
            outcome => outcome,
        }
    }

    async fn open_browser(&self, addr: SocketAddr) {
        let url = format!("http://localhost:{}/", addr.port());
        let browser = self.browser.clone();
        let target = url.clone();
        let error = match tokio::task::spawn_blocking(move || browser.open(&target)).await {
            Ok(Ok(())) => return,
            Ok(Err(error)) => error,
            Err(error) => io::Error::new(io::ErrorKind::Other, error),
        };

        tracing::warn!(
            error = (&error as &dyn std::error::Error),
            "unable to open browser"
        );
        println!("Open {url} in your browser to log in.");
    }

    async fn wait_for(&self, outcome: &mut oneshot::Receiver<Outcome>) -> Outcome {
        let received = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut *outcome).await {
                Ok(received) => received,
                Err(_) if self.redirect_in_progress() => {
                    tracing::debug!(
                        timeout_secs = limit.as_secs(),
                        "login timeout reached while the redirect is being handled"
                    );
                    outcome.await
                }
                Err(_) => {
                    tracing::warn!(timeout_secs = limit.as_secs(), "login timed out");
                    return Err(LoginError::AuthenticationTimedOut);
                }
            },
            None => outcome.await,
        };

        received.unwrap_or_else(|_| {
            Err(LoginError::Listener(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "listener stopped before the login completed",
            )))
        })
    }

    fn redirect_in_progress(&self) -> bool {
        matches!(
            *self.state.borrow(),
            LoginState::CodeReceived | LoginState::Exchanging | LoginState::Persisted
        )
    }

    fn transition(&self, next: LoginState) {
        let previous = self.state.send_replace(next);
        tracing::trace!(?previous, ?next, "login state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopauth_tokens::{
        authority::{Authority, AuthorityClient},
        plugin::StorePlugin,
        store::InMemoryCacheStore,
        ClientId,
    };

    fn controller(port: u16) -> LoginFlowController {
        let authority = Authority::from_base("https://login.example.com/common").unwrap();
        let client = PublicClientApplication::new(
            ClientId::from_static("client-id"),
            AuthorityClient::new(reqwest::Client::new(), authority),
            Arc::new(StorePlugin::new(InMemoryCacheStore::new())),
        );
        LoginFlowController::new(Arc::new(client), "User.Read".parse().unwrap(), port)
            .with_browser(|_: &str| -> io::Result<()> { Ok(()) })
    }

    #[tokio::test]
    async fn port_in_use_is_reported_and_ends_closed() {
        let taken = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let controller = controller(port);
        let states = controller.subscribe();
        let result = controller.run().await;

        assert!(matches!(result, Err(LoginError::PortInUse { port: p, .. }) if p == port));
        assert_eq!(*states.borrow(), LoginState::Closed);
    }

    #[tokio::test]
    async fn timeout_releases_the_port() {
        let port = {
            let free = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            free.local_addr().unwrap().port()
        };

        let controller = controller(port).with_timeout(Some(Duration::from_millis(100)));
        let states = controller.subscribe();
        let result = controller.run().await;

        assert!(matches!(result, Err(LoginError::AuthenticationTimedOut)));
        assert_eq!(*states.borrow(), LoginState::Closed);
        std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, port)).unwrap();
    }

    #[tokio::test]
    async fn slow_browser_launch_does_not_stall_the_runtime() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let ticked = Arc::new(AtomicBool::new(false));
        let saw_tick = Arc::new(AtomicBool::new(false));
        tokio::spawn({
            let ticked = ticked.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticked.store(true, Ordering::SeqCst);
            }
        });

        let controller = controller(0)
            .with_browser({
                let saw_tick = saw_tick.clone();
                move |_: &str| -> io::Result<()> {
                    std::thread::sleep(Duration::from_millis(300));
                    saw_tick.store(ticked.load(Ordering::SeqCst), Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_timeout(Some(Duration::from_millis(50)));

        assert!(matches!(
            controller.run().await,
            Err(LoginError::AuthenticationTimedOut)
        ));
        assert!(saw_tick.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn browser_failure_is_not_fatal() {
        let controller = controller(0)
            .with_browser(|_: &str| -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::NotFound, "no browser"))
            })
            .with_timeout(Some(Duration::from_millis(50)));

        assert!(matches!(
            controller.run().await,
            Err(LoginError::AuthenticationTimedOut)
        ));
    }
}
