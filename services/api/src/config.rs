//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// The six platform settings every deployment must provide.
pub const REQUIRED_FIREBASE_VARS: [&str; 6] = [
    "PUBLIC_FIREBASE_API_KEY",
    "PUBLIC_FIREBASE_AUTH_DOMAIN",
    "PUBLIC_FIREBASE_PROJECT_ID",
    "PUBLIC_FIREBASE_STORAGE_BUCKET",
    "PUBLIC_FIREBASE_MESSAGING_SENDER_ID",
    "PUBLIC_FIREBASE_APP_ID",
];

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Missing Firebase environment variables: {}", .0.join(", "))]
    MissingVars(Vec<String>),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which adapters back the ports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Firebase,
    /// In-process adapters, for local development and tests.
    Memory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulatorHost {
    pub host: String,
    pub port: u16,
}

impl EmulatorHost {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Local emulator endpoints, used instead of the hosted services when enabled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmulatorConfig {
    pub firestore: EmulatorHost,
    pub storage: EmulatorHost,
    pub auth: EmulatorHost,
}

/// Seed administrator of the memory backend.
#[derive(Clone, PartialEq, Eq)]
pub struct DevAdmin {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for DevAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevAdmin")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub cors_origin: String,
    pub session_ttl: Duration,
    pub backend: Backend,
    /// Present whenever the Firebase backend is selected.
    pub firebase: Option<FirebaseConfig>,
    pub service_token: Option<String>,
    pub emulators: Option<EmulatorConfig>,
    pub dev_admin: Option<DevAdmin>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // --- Server Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:4321".to_string());

        let session_ttl_hours = match var("SESSION_TTL_HOURS") {
            Some(raw) => raw.parse::<u64>().ok().filter(|h| *h > 0).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SESSION_TTL_HOURS".to_string(),
                    format!("'{}' is not a positive number of hours", raw),
                )
            })?,
            None => 12,
        };

        // --- Backend Selection ---
        let backend = match var("PORTAL_BACKEND").as_deref() {
            None | Some("firebase") => Backend::Firebase,
            Some("memory") => Backend::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "PORTAL_BACKEND".to_string(),
                    format!("'{}' is not one of firebase, memory", other),
                ))
            }
        };

        let firebase = match backend {
            Backend::Firebase => Some(load_firebase(&var)?),
            Backend::Memory => None,
        };

        let emulators = match var("PUBLIC_USE_FIREBASE_EMULATORS").as_deref() {
            Some("true") => Some(EmulatorConfig {
                firestore: emulator_host(&var, "FIRESTORE", 8080)?,
                storage: emulator_host(&var, "STORAGE", 9199)?,
                auth: emulator_host(&var, "AUTH", 9099)?,
            }),
            _ => None,
        };

        let dev_admin = match (var("PORTAL_DEV_ADMIN_EMAIL"), var("PORTAL_DEV_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(DevAdmin { email, password }),
            (Some(_), None) => {
                return Err(ConfigError::MissingVar("PORTAL_DEV_ADMIN_PASSWORD".to_string()))
            }
            _ => None,
        };

        Ok(Self {
            bind_address,
            log_level,
            cors_origin,
            session_ttl: Duration::from_secs(session_ttl_hours * 3600),
            backend,
            firebase,
            service_token: var("FIREBASE_SERVICE_TOKEN"),
            emulators,
            dev_admin,
        })
    }
}

fn load_firebase<F>(var: &F) -> Result<FirebaseConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let missing: Vec<String> = REQUIRED_FIREBASE_VARS
        .into_iter()
        .filter(|key| var(*key).is_none())
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::MissingVars(missing));
    }

    let get = |key: &str| var(key).unwrap_or_default();
    Ok(FirebaseConfig {
        api_key: get("PUBLIC_FIREBASE_API_KEY"),
        auth_domain: get("PUBLIC_FIREBASE_AUTH_DOMAIN"),
        project_id: get("PUBLIC_FIREBASE_PROJECT_ID"),
        storage_bucket: get("PUBLIC_FIREBASE_STORAGE_BUCKET"),
        messaging_sender_id: get("PUBLIC_FIREBASE_MESSAGING_SENDER_ID"),
        app_id: get("PUBLIC_FIREBASE_APP_ID"),
    })
}

fn emulator_host<F>(var: &F, service: &str, default_port: u16) -> Result<EmulatorHost, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let host_key = format!("FIREBASE_EMULATOR_{}_HOST", service);
    let port_key = format!("FIREBASE_EMULATOR_{}_PORT", service);
    let port = match var(&port_key) {
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidValue(port_key, e.to_string()))?,
        None => default_port,
    };
    Ok(EmulatorHost {
        host: var(&host_key).unwrap_or_else(|| "localhost".to_string()),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn firebase_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            ("PUBLIC_FIREBASE_API_KEY", "key"),
            ("PUBLIC_FIREBASE_AUTH_DOMAIN", "portal.firebaseapp.com"),
            ("PUBLIC_FIREBASE_PROJECT_ID", "portal"),
            ("PUBLIC_FIREBASE_STORAGE_BUCKET", "portal.appspot.com"),
            ("PUBLIC_FIREBASE_MESSAGING_SENDER_ID", "123"),
            ("PUBLIC_FIREBASE_APP_ID", "1:123:web:abc"),
        ]
    }

    #[test]
    fn reports_every_missing_firebase_variable_at_once() {
        let err = Config::from_lookup(lookup(&[("PUBLIC_FIREBASE_API_KEY", "key")])).unwrap_err();
        match err {
            ConfigError::MissingVars(missing) => {
                assert_eq!(missing.len(), 5);
                assert!(!missing.contains(&"PUBLIC_FIREBASE_API_KEY".to_string()));
                assert!(missing.contains(&"PUBLIC_FIREBASE_APP_ID".to_string()));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn defaults_apply_when_only_firebase_is_set() {
        let config = Config::from_lookup(lookup(&firebase_vars())).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.cors_origin, "http://localhost:4321");
        assert_eq!(config.session_ttl, Duration::from_secs(12 * 3600));
        assert_eq!(config.backend, Backend::Firebase);
        assert_eq!(config.firebase.unwrap().project_id, "portal");
        assert!(config.emulators.is_none());
    }

    #[test]
    fn memory_backend_needs_no_platform_settings() {
        let config = Config::from_lookup(lookup(&[
            ("PORTAL_BACKEND", "memory"),
            ("PORTAL_DEV_ADMIN_EMAIL", "admin@portal.ar"),
            ("PORTAL_DEV_ADMIN_PASSWORD", "secreta"),
        ]))
        .unwrap();
        assert!(config.firebase.is_none());
        assert_eq!(config.dev_admin.unwrap().email, "admin@portal.ar");
    }

    #[test]
    fn emulator_endpoints_default_to_localhost() {
        let mut vars = firebase_vars();
        vars.push(("PUBLIC_USE_FIREBASE_EMULATORS", "true"));
        vars.push(("FIREBASE_EMULATOR_AUTH_PORT", "9100"));
        let emulators = Config::from_lookup(lookup(&vars)).unwrap().emulators.unwrap();
        assert_eq!(emulators.firestore.base_url(), "http://localhost:8080");
        assert_eq!(emulators.storage.port, 9199);
        assert_eq!(emulators.auth.port, 9100);
    }

    #[test]
    fn rejects_malformed_values() {
        let mut vars = firebase_vars();
        vars.push(("SESSION_TTL_HOURS", "0"));
        assert!(matches!(
            Config::from_lookup(lookup(&vars)),
            Err(ConfigError::InvalidValue(key, _)) if key == "SESSION_TTL_HOURS"
        ));

        let err = Config::from_lookup(lookup(&[("PORTAL_BACKEND", "sqlite")])).unwrap_err();
        assert!(err.to_string().contains("PORTAL_BACKEND"));
    }
}
