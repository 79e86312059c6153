//! DTOs for interacting with the authority's token endpoint

use serde::{Deserialize, Serialize, Serializer};

use crate::clock::DurationSecs;
use crate::{AccessToken, AuthorizationCode, ClientId, ClientIdRef, IdToken, RefreshToken};

/// Parameters of the authorization code grant (second leg of the interactive login)
#[derive(Debug)]
pub struct AuthorizationCodeGrant {
    /// The client ID
    pub client_id: ClientId,

    /// The code delivered on the loopback redirect
    pub code: AuthorizationCode,

    /// The redirect URI used on the authorization request
    pub redirect_uri: String,

    /// The PKCE verifier matching the challenge sent on the authorization request
    pub code_verifier: String,

    /// Space-separated scopes
    pub scope: String,
}

impl Serialize for AuthorizationCodeGrant {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("AuthorizationCodeGrant", 6)?;
        ser.serialize_field("grant_type", "authorization_code")?;
        ser.serialize_field("client_id", &self.client_id)?;
        ser.serialize_field("code", self.code.as_str())?;
        ser.serialize_field("redirect_uri", &self.redirect_uri)?;
        ser.serialize_field("code_verifier", &self.code_verifier)?;
        ser.serialize_field("scope", &self.scope)?;
        ser.end()
    }
}

impl super::Grant for AuthorizationCodeGrant {
    fn client_id(&self) -> &ClientIdRef {
        &self.client_id
    }
    fn grant_type() -> &'static str {
        "authorization_code"
    }
}

/// Parameters of the refresh token grant (silent acquisition)
#[derive(Debug)]
pub struct RefreshTokenGrant {
    /// The client ID
    pub client_id: ClientId,

    /// The refresh token to redeem
    pub refresh_token: RefreshToken,

    /// Space-separated scopes
    pub scope: String,
}

impl Serialize for RefreshTokenGrant {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("RefreshTokenGrant", 4)?;
        ser.serialize_field("grant_type", "refresh_token")?;
        ser.serialize_field("client_id", &self.client_id)?;
        ser.serialize_field("refresh_token", self.refresh_token.as_str())?;
        ser.serialize_field("scope", &self.scope)?;
        ser.end()
    }
}

impl super::Grant for RefreshTokenGrant {
    fn client_id(&self) -> &ClientIdRef {
        &self.client_id
    }
    fn grant_type() -> &'static str {
        "refresh_token"
    }
}

/// A successful token endpoint response
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    /// The issued access token
    pub access_token: AccessToken,
    /// A new refresh token, if the authority rotated or issued one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,
    /// The OpenID Connect ID token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<IdToken>,
    /// Access token lifetime
    pub expires_in: DurationSecs,
    /// Scopes actually granted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// An OAuth2 error body (RFC 6749 §5.2)
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct OAuthErrorBody {
    /// The error code, such as `invalid_grant`
    pub error: String,
    /// Human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_grant_carries_pkce_verifier() {
        let grant = AuthorizationCodeGrant {
            client_id: ClientId::from_static("client"),
            code: AuthorizationCode::from_static("ABC"),
            redirect_uri: "http://localhost:3000/redirect/".to_owned(),
            code_verifier: "verifier".to_owned(),
            scope: "User.Read offline_access".to_owned(),
        };

        let form = as_json_map(&grant);
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["code"], "ABC");
        assert_eq!(form["code_verifier"], "verifier");
        assert_eq!(form["redirect_uri"], "http://localhost:3000/redirect/");
    }

    #[test]
    fn refresh_grant_carries_refresh_token() {
        let grant = RefreshTokenGrant {
            client_id: ClientId::from_static("client"),
            refresh_token: RefreshToken::from_static("rt"),
            scope: "User.Read".to_owned(),
        };

        let form = as_json_map(&grant);
        assert_eq!(form["grant_type"], "refresh_token");
        assert_eq!(form["refresh_token"], "rt");
    }

    #[test]
    fn token_response_tolerates_missing_optionals() {
        let resp: TokenResponse =
            serde_json::from_str(r#"{"access_token":"at","expires_in":3599,"token_type":"Bearer"}"#)
                .unwrap();
        assert_eq!(resp.access_token.as_str(), "at");
        assert_eq!(resp.expires_in, DurationSecs(3599));
        assert!(resp.refresh_token.is_none());
    }

    fn as_json_map<T: Serialize>(value: &T) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(value).unwrap() {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }
}
