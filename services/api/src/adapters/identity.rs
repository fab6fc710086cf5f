//! services/api/src/adapters/identity.rs
//!
//! Implements the `IdentityProvider` port over the Identity Toolkit REST API:
//! email/password sign-in, token refresh through the secure token service,
//! and the `admin` custom claim read from the ID token payload.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use memoria_core::domain::{ProviderUser, TokenClaims};
use memoria_core::ports::{IdentityProvider, PortError, PortResult};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::http::{check, transport_error, ApiFailure};

pub struct IdentityToolkit {
    client: Client,
    api_key: String,
    sign_in_url: String,
    refresh_url: String,
}

impl IdentityToolkit {
    pub fn new(client: Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            sign_in_url: "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword".into(),
            refresh_url: "https://securetoken.googleapis.com/v1/token".into(),
        }
    }

    /// The auth emulator serves both APIs under its own host.
    pub fn with_emulator(client: Client, api_key: &str, emulator_url: &str) -> Self {
        let base = emulator_url.trim_end_matches('/');
        Self {
            client,
            api_key: api_key.to_string(),
            sign_in_url: format!("{}/identitytoolkit.googleapis.com/v1/accounts:signInWithPassword", base),
            refresh_url: format!("{}/securetoken.googleapis.com/v1/token", base),
        }
    }

    async fn refresh(&self, user: &ProviderUser) -> PortResult<ProviderUser> {
        let refresh_token = user
            .refresh_token
            .as_deref()
            .ok_or_else(|| PortError::platform("auth/user-token-expired", "no refresh token"))?;

        let response = self
            .client
            .post(&self.refresh_url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await
            .map_err(transport_error)?;
        let refreshed: RefreshResponse = check(response)
            .await
            .map_err(auth_error)?
            .json()
            .await
            .map_err(transport_error)?;

        Ok(ProviderUser {
            uid: refreshed.user_id,
            id_token: refreshed.id_token,
            refresh_token: Some(refreshed.refresh_token),
            ..user.clone()
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    id_token: String,
    refresh_token: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
struct JwtPayload {
    #[serde(default)]
    admin: bool,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

/// Reads the payload of an ID token.
///
/// The signature is not checked: tokens only ever come from the provider's
/// own responses over TLS, never from a client.
fn decode_payload(id_token: &str) -> PortResult<JwtPayload> {
    let invalid = |detail: String| PortError::platform("auth/invalid-id-token", detail);
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| invalid("token has no payload segment".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| invalid(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))
}

/// Maps Identity Toolkit error keys onto the `auth/*` codes.
fn auth_error(failure: ApiFailure) -> PortError {
    // Keys may carry a detail suffix: "TOO_MANY_ATTEMPTS_TRY_LATER : ...".
    let key = failure.message.split(':').next().unwrap_or_default().trim();
    let code = match key {
        "EMAIL_NOT_FOUND" => "auth/user-not-found",
        "INVALID_PASSWORD" => "auth/wrong-password",
        "INVALID_EMAIL" => "auth/invalid-email",
        "INVALID_LOGIN_CREDENTIALS" => "auth/invalid-credential",
        "USER_DISABLED" => "auth/user-disabled",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "auth/too-many-requests",
        "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND" => "auth/user-token-expired",
        _ if failure.status == StatusCode::SERVICE_UNAVAILABLE => "unavailable",
        _ => "auth/internal-error",
    };
    PortError::platform(code, failure.message)
}

#[async_trait]
impl IdentityProvider for IdentityToolkit {
    #[instrument(skip(self, password))]
    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<ProviderUser> {
        let response = self
            .client
            .post(&self.sign_in_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({ "email": email, "password": password, "returnSecureToken": true }))
            .send()
            .await
            .map_err(transport_error)?;
        let signed_in: SignInResponse = check(response)
            .await
            .map_err(auth_error)?
            .json()
            .await
            .map_err(transport_error)?;

        Ok(ProviderUser {
            uid: signed_in.local_id,
            email: signed_in.email,
            display_name: signed_in.display_name,
            id_token: signed_in.id_token,
            refresh_token: Some(signed_in.refresh_token),
        })
    }

    #[instrument(skip(self, user), fields(uid = %user.uid))]
    async fn id_token_claims(&self, user: &ProviderUser, force_refresh: bool) -> PortResult<TokenClaims> {
        let user = if force_refresh {
            self.refresh(user).await?
        } else {
            user.clone()
        };
        let payload = decode_payload(&user.id_token)?;
        let subject = payload.user_id.as_deref().or(payload.sub.as_deref());
        if subject.is_some_and(|s| s != user.uid) {
            return Err(PortError::platform("auth/invalid-id-token", "token subject mismatch"));
        }
        debug!(admin = payload.admin, "Token claims read");
        Ok(TokenClaims {
            admin: payload.admin,
            user,
        })
    }

    async fn sign_out(&self, user: &ProviderUser) -> PortResult<()> {
        // Password sessions have no server-side handle; dropping the tokens ends them.
        debug!(uid = %user.uid, "Provider session discarded");
        Ok(())
    }
}
