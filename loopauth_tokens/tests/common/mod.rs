#![allow(dead_code)]

use std::{path::Path, sync::Arc};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use loopauth_tokens::{
    authority::{Authority, AuthorityClient},
    clock::{ManualClock, UnixTime},
    plugin::StorePlugin,
    store::FileCacheStore,
    ClientId, PublicClientApplication, Scopes,
};
use serde_json::json;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const TOKEN_PATH: &str = "/common/oauth2/v2.0/token";
pub const START: UnixTime = UnixTime(1_700_000_000);

pub fn id_token(oid: &str, username: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "oid": oid,
            "tid": "tenant",
            "preferred_username": username,
        })
        .to_string(),
    );
    format!("{header}.{payload}.")
}

pub fn token_body(access_token: &str, refresh_token: &str, oid: &str) -> serde_json::Value {
    json!({
        "token_type": "Bearer",
        "access_token": access_token,
        "refresh_token": refresh_token,
        "id_token": id_token(oid, &format!("{oid}@example.com")),
        "expires_in": 3600,
        "scope": "User.Read Files.Read openid profile offline_access",
    })
}

pub fn scopes() -> Scopes {
    "User.Read Files.Read".parse().unwrap()
}

pub fn client(server: &MockServer, cache_file: &Path, clock: &ManualClock) -> Arc<PublicClientApplication> {
    let authority = Authority::from_base(&format!("{}/common", server.uri())).unwrap();
    let client = PublicClientApplication::new(
        ClientId::from_static("test-client"),
        AuthorityClient::new(reqwest::Client::new(), authority),
        Arc::new(StorePlugin::new(FileCacheStore::new(cache_file))),
    )
    .with_clock(clock.clone());
    Arc::new(client)
}

pub async fn mock_grant(server: &MockServer, grant_type: &str, status: u16, body: serde_json::Value, times: u64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains(format!("grant_type={grant_type}")))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}
