//! crates/memoria_core/src/auth.rs
//!
//! The authentication gate in front of the moderation panel. It follows the
//! identity provider's session events and only settles on `Authenticated`
//! for users whose ID token carries the `admin` claim. Anyone else is signed
//! out again.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{info, instrument, warn};

use crate::domain::{AuthUser, ProviderUser};
use crate::errors::{message_template, PlatformError};
use crate::ports::{IdentityProvider, PortError};

/// Provider codes that keep their own message on a failed sign-in.
const KNOWN_SIGN_IN_CODES: [&str; 6] = [
    "auth/user-not-found",
    "auth/wrong-password",
    "auth/invalid-email",
    "auth/too-many-requests",
    "auth/invalid-credential",
    "network-error",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    Loading,
    Unauthenticated { error: Option<String> },
    Authenticated { user: AuthUser },
}

impl AuthState {
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            AuthState::Authenticated { user } => Some(user),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(|u| u.is_admin)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AuthState::Unauthenticated { error } => error.as_deref(),
            _ => None,
        }
    }
}

/// What the identity provider reports about the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(ProviderUser),
    TokenRefreshed(ProviderUser),
    SignedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("user lacks the admin claim")]
    NotAdmin,
    #[error("no active session")]
    SignedOut,
    #[error(transparent)]
    Provider(#[from] PlatformError),
}

impl AuthError {
    pub fn code(&self) -> &str {
        match self {
            AuthError::NotAdmin => "not-admin",
            AuthError::SignedOut => "unauthenticated",
            AuthError::Provider(err) => &err.code,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AuthError::NotAdmin => message_template("not-admin").to_string(),
            AuthError::SignedOut => message_template("unauthenticated").to_string(),
            AuthError::Provider(err) => err.user_message.clone(),
        }
    }
}

/// Maps a provider sign-in failure onto the fixed sign-in messages.
pub fn sign_in_error(err: PortError) -> PlatformError {
    let code = err.code();
    if KNOWN_SIGN_IN_CODES.contains(&code) {
        PlatformError::new(code.to_string(), err.to_string())
    } else {
        PlatformError::new("auth/sign-in-failed", err.to_string())
    }
}

pub struct AuthGate {
    identity: Arc<dyn IdentityProvider>,
    session: Mutex<Option<ProviderUser>>,
    state: watch::Sender<AuthState>,
}

impl AuthGate {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        let (state, _) = watch::channel(AuthState::Loading);
        Self {
            identity,
            session: Mutex::new(None),
            state,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Email/password sign-in, accepted only for administrators.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let user = match self.identity.sign_in_with_password(email, password).await {
            Ok(user) => user,
            Err(err) => {
                let err = sign_in_error(err);
                warn!(code = %err.code, "Sign-in refused by provider");
                self.settle_unauthenticated(Some(err.user_message.clone())).await;
                return Err(err.into());
            }
        };
        self.admit(user).await
    }

    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let user = self.session.lock().await.take();
        self.state
            .send_replace(AuthState::Unauthenticated { error: None });
        if let Some(user) = user {
            info!(uid = %user.uid, "Signing out");
            self.identity.sign_out(&user).await.map_err(PlatformError::from)?;
        }
        Ok(())
    }

    /// Re-checks the current session with a refreshed token.
    pub async fn refresh(&self) -> AuthState {
        // The outcome is already published on the state channel.
        let _ = self.verify().await;
        self.state()
    }

    /// Re-checks the current session and returns the admin, or why it was refused.
    pub async fn verify(&self) -> Result<AuthUser, AuthError> {
        let user = self.session.lock().await.clone();
        match user {
            Some(user) => self.admit(user).await,
            None => {
                if matches!(self.state(), AuthState::Loading) {
                    self.state
                        .send_replace(AuthState::Unauthenticated { error: None });
                }
                Err(AuthError::SignedOut)
            }
        }
    }

    /// Folds one session event into the gate's state.
    pub async fn handle_event(&self, event: SessionEvent) -> AuthState {
        match event {
            SessionEvent::SignedIn(user) | SessionEvent::TokenRefreshed(user) => {
                // The outcome is already published on the state channel.
                let _ = self.admit(user).await;
            }
            SessionEvent::SignedOut => self.settle_unauthenticated(None).await,
        }
        self.state()
    }

    /// Consumes session events until the stream ends.
    pub async fn run<S>(&self, events: S)
    where
        S: Stream<Item = SessionEvent>,
    {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            self.handle_event(event).await;
        }
    }

    async fn admit(&self, user: ProviderUser) -> Result<AuthUser, AuthError> {
        let claims = match self.identity.id_token_claims(&user, true).await {
            Ok(claims) => claims,
            Err(err) => {
                warn!(uid = %user.uid, error = %err, "Claims lookup failed");
                let err = PlatformError::new("auth/session-check-failed", err.to_string());
                self.settle_unauthenticated(Some(err.user_message.clone())).await;
                return Err(err.into());
            }
        };

        if !claims.admin {
            warn!(uid = %user.uid, "Non-admin user signed out");
            if let Err(err) = self.identity.sign_out(&claims.user).await {
                warn!(error = %err, "Provider sign-out failed");
            }
            self.settle_unauthenticated(Some(AuthError::NotAdmin.user_message()))
                .await;
            return Err(AuthError::NotAdmin);
        }

        let auth_user = AuthUser::from_provider(&claims.user, true);
        *self.session.lock().await = Some(claims.user);
        self.state.send_replace(AuthState::Authenticated {
            user: auth_user.clone(),
        });
        Ok(auth_user)
    }

    async fn settle_unauthenticated(&self, error: Option<String>) {
        self.session.lock().await.take();
        self.state
            .send_replace(AuthState::Unauthenticated { error });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeIdentity;

    fn gate(identity: Arc<FakeIdentity>) -> AuthGate {
        AuthGate::new(identity)
    }

    fn accounts() -> Arc<FakeIdentity> {
        Arc::new(
            FakeIdentity::default()
                .with_account("admin@portal.ar", "secreta", "u-admin", true)
                .with_account("vecino@portal.ar", "secreta", "u-user", false),
        )
    }

    #[tokio::test]
    async fn starts_loading_and_admits_admins() {
        let gate = gate(accounts());
        assert_eq!(gate.state(), AuthState::Loading);

        let user = gate.sign_in("admin@portal.ar", "secreta").await.unwrap();
        assert!(user.is_admin);
        assert!(gate.state().is_admin());
    }

    #[tokio::test]
    async fn non_admin_is_signed_out_with_permission_message() {
        let identity = accounts();
        let gate = gate(identity.clone());

        let err = gate.sign_in("vecino@portal.ar", "secreta").await.unwrap_err();
        assert_eq!(err, AuthError::NotAdmin);
        assert_eq!(gate.state().error(), Some("No tienes permisos de administrador."));
        assert_eq!(*identity.signed_out.lock().unwrap(), vec!["u-user".to_string()]);
    }

    #[tokio::test]
    async fn provider_errors_map_to_fixed_messages() {
        let gate = gate(accounts());
        let err = gate.sign_in("admin@portal.ar", "mala").await.unwrap_err();
        assert_eq!(err.user_message(), "Contraseña incorrecta.");

        let err = sign_in_error(PortError::platform("auth/operation-not-allowed", "nope"));
        assert_eq!(err.user_message, "Error al iniciar sesión.");
        let err = sign_in_error(PortError::Network("offline".into()));
        assert_eq!(
            err.user_message,
            "Error de conexión. Verifica tu internet e intenta nuevamente."
        );
    }

    #[tokio::test]
    async fn revoked_claim_drops_the_session_on_refresh() {
        let identity = accounts();
        let gate = gate(identity.clone());
        gate.sign_in("admin@portal.ar", "secreta").await.unwrap();

        identity.set_admin("u-admin", false);
        let state = gate.refresh().await;
        assert_eq!(state.error(), Some("No tienes permisos de administrador."));
        assert!(matches!(gate.refresh().await, AuthState::Unauthenticated { error: Some(_) }));
    }

    #[tokio::test]
    async fn verify_reports_why_a_session_was_refused() {
        let identity = accounts();
        let gate = gate(identity.clone());
        assert_eq!(gate.verify().await.unwrap_err(), AuthError::SignedOut);
        assert_eq!(gate.state(), AuthState::Unauthenticated { error: None });

        gate.sign_in("admin@portal.ar", "secreta").await.unwrap();
        assert_eq!(gate.verify().await.unwrap().uid, "u-admin");

        identity.set_admin("u-admin", false);
        assert_eq!(gate.verify().await.unwrap_err(), AuthError::NotAdmin);
        // The refused session is gone for good.
        assert_eq!(gate.verify().await.unwrap_err(), AuthError::SignedOut);
    }

    #[tokio::test]
    async fn event_stream_drives_the_state() {
        let identity = accounts();
        identity
            .claims_failures
            .lock()
            .unwrap()
            .push_back(PortError::Network("down".into()));
        let gate = gate(identity);
        let mut rx = gate.subscribe();

        let admin = FakeIdentity::user("u-admin", "admin@portal.ar");
        gate.run(futures::stream::iter(vec![SessionEvent::SignedIn(admin.clone())]))
            .await;
        assert_eq!(gate.state().error(), Some("Error al verificar autenticación."));

        gate.run(futures::stream::iter(vec![
            SessionEvent::TokenRefreshed(admin),
        ]))
        .await;
        assert!(rx.borrow_and_update().is_admin());

        gate.run(futures::stream::iter(vec![SessionEvent::SignedOut]))
            .await;
        assert_eq!(gate.state(), AuthState::Unauthenticated { error: None });
    }
}
