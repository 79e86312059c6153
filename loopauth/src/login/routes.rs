use std::{error::Error as _, sync::Arc};

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use loopauth_tokens::{
    Account, AuthCodeUrlParameters, AuthorizationCode, AuthorizationCodeRequest, Prompt,
};
use serde::Deserialize;

use super::{Flow, LoginError, LoginState};

const SUCCESS_BODY: &str = "Login successful. You can close this window now.";

pub(super) fn router(flow: Arc<Flow>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/login", get(login))
        .route("/redirect", get(redirect))
        .route("/redirect/", get(redirect))
        .fallback(not_found)
        .with_state(flow)
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

async fn root() -> Response {
    found("/login")
}

async fn login(State(flow): State<Arc<Flow>>) -> Response {
    let url = flow.client.auth_code_url(&AuthCodeUrlParameters {
        scopes: &flow.scopes,
        redirect_uri: &flow.redirect_uri,
        prompt: Some(Prompt::SelectAccount),
        state: &flow.csrf_state,
        pkce: &flow.pkce,
    });

    tracing::debug!(
        authority = %url.origin().ascii_serialization(),
        redirect_uri = %flow.redirect_uri,
        "sending browser to authority"
    );

    found(url.as_str())
}

#[derive(Debug, Deserialize)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn redirect(State(flow): State<Arc<Flow>>, Query(params): Query<RedirectParams>) -> Response {
    // A redirect that does not belong to this login must not end it.
    if params.state.as_deref() != Some(flow.csrf_state.as_str()) {
        tracing::warn!("ignoring redirect with an unexpected state");
        return (StatusCode::BAD_REQUEST, LoginError::StateMismatch.to_string()).into_response();
    }

    let Some(outcome) = flow.outcome.lock().await.take() else {
        return (StatusCode::CONFLICT, "This login has already completed.").into_response();
    };

    flow.state.send_replace(LoginState::CodeReceived);
    let result = flow.complete(params).await;

    let response = match &result {
        Ok(account) => {
            tracing::info!(username = %account.username, "login completed");
            (StatusCode::OK, SUCCESS_BODY).into_response()
        }
        Err(error) => (StatusCode::INTERNAL_SERVER_ERROR, describe(error)).into_response(),
    };

    // The controller shuts the listener down on receipt; the response is
    // still delivered since shutdown is graceful.
    let _ = outcome.send(result);
    response
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found.").into_response()
}

impl Flow {
    async fn complete(&self, params: RedirectParams) -> Result<Account, LoginError> {
        if let Some(error) = params.error {
            return Err(LoginError::AuthorizationDenied {
                error,
                description: params.error_description,
            });
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or(LoginError::MissingCode)?;

        self.state.send_replace(LoginState::Exchanging);
        let result = self
            .client
            .acquire_token_by_code(AuthorizationCodeRequest {
                code: AuthorizationCode::new(code),
                redirect_uri: &self.redirect_uri,
                scopes: &self.scopes,
                pkce: &self.pkce,
            })
            .await?;

        self.client.token_cache().write_to_persistence().await?;
        self.state.send_replace(LoginState::Persisted);

        Ok(result.account)
    }
}

fn describe(error: &LoginError) -> String {
    let mut text = match error {
        LoginError::AuthorizationDenied {
            error,
            description: Some(description),
        } => format!("authorization denied: {error}: {description}"),
        _ => error.to_string(),
    };

    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_includes_provider_description() {
        let error = LoginError::AuthorizationDenied {
            error: "access_denied".to_owned(),
            description: Some("the user declined".to_owned()),
        };
        assert_eq!(
            describe(&error),
            "authorization denied: access_denied: the user declined"
        );
    }

    #[test]
    fn describe_walks_the_source_chain() {
        let error = LoginError::Listener(std::io::Error::new(
            std::io::ErrorKind::Other,
            "socket closed",
        ));
        assert_eq!(describe(&error), "loopback listener failed: socket closed");
    }
}
