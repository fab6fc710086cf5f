//! crates/memoria_core/src/errors.rs
//!
//! The fixed Spanish vocabulary every platform failure is translated into
//! before it reaches a visitor or an administrator.

use std::collections::HashMap;

use crate::ports::PortError;

/// Error codes whose failures are transient and worth retrying.
pub const RETRYABLE_CODES: [&str; 6] = [
    "unavailable",
    "timeout",
    "network-error",
    "storage/retry-limit-exceeded",
    "firestore/unavailable",
    "firestore/deadline-exceeded",
];

pub const UNKNOWN_ERROR: &str = "unknown-error";

/// Looks up the Spanish message template for an error code.
///
/// Unknown codes fall back to the generic "unexpected error" message.
pub fn message_template(code: &str) -> &'static str {
    match code {
        // Network and connection
        "network-error" => "Error de conexión. Verifica tu internet e intenta nuevamente.",
        "unavailable" => "Servicio temporalmente no disponible. Intenta más tarde.",
        "timeout" => "La operación tardó demasiado. Intenta nuevamente.",

        // Authentication
        "unauthenticated" => "Debes iniciar sesión para continuar.",
        "permission-denied" => "No tienes permisos para realizar esta acción.",
        "not-admin" => "No tienes permisos de administrador.",
        "user-not-found" | "auth/user-not-found" => "Usuario no encontrado.",
        "wrong-password" | "auth/wrong-password" => "Contraseña incorrecta.",
        "invalid-email" => "Dirección de email inválida.",
        "auth/invalid-email" => "Email inválido.",
        "auth/too-many-requests" => "Demasiados intentos. Intenta más tarde.",
        "auth/invalid-credential" => "Email o contraseña incorrectos.",
        "auth/user-disabled" => "Esta cuenta ha sido deshabilitada.",
        "auth/sign-in-failed" => "Error al iniciar sesión.",
        "auth/session-check-failed" => "Error al verificar autenticación.",

        // Storage
        "storage/quota-exceeded" => "Se ha excedido la cuota de almacenamiento.",
        "storage/unauthenticated" => "Debes iniciar sesión para subir archivos.",
        "storage/unauthorized" => "No tienes permisos para subir archivos.",
        "storage/retry-limit-exceeded" => "Demasiados intentos. Intenta más tarde.",
        "storage/invalid-format" => "Formato de archivo no válido.",
        "storage/object-not-found" => "Archivo no encontrado.",

        // Document database
        "firestore/permission-denied" => "No tienes permisos para acceder a estos datos.",
        "firestore/unavailable" => "Base de datos temporalmente no disponible.",
        "firestore/deadline-exceeded" => "La operación tardó demasiado tiempo.",
        "firestore/resource-exhausted" => "Se han agotado los recursos disponibles.",

        // Moderation
        "not-found" => "El registro solicitado no existe.",
        "invalid-transition" => "Esta entrada ya fue moderada y no puede cambiar de estado.",

        // Files
        "file-too-large" => "El archivo es demasiado grande. Máximo {maxSize}MB.",
        "invalid-file-type" => "Tipo de archivo no válido. Solo se permiten imágenes JPG, PNG y WebP.",
        "file-required" => "Este archivo es obligatorio.",
        "file-corrupted" => "El archivo está dañado o corrupto.",
        "file-empty" => "El archivo está vacío.",

        // Forms
        "validation-error" => "Revisa los campos marcados e intenta nuevamente.",
        "required-field" => "Este campo es obligatorio.",
        "invalid-phone" => "Número de teléfono inválido. Debe tener entre 10 y 15 dígitos.",

        // Generic
        "maintenance" => "El sistema está en mantenimiento. Intenta más tarde.",
        "quota-exceeded" => "Se ha excedido la cuota diaria. Intenta mañana.",
        _ => "Ha ocurrido un error inesperado. Intenta nuevamente.",
    }
}

/// Replaces every `{key}` placeholder in `template` with its value.
pub fn format_message(template: &str, params: &HashMap<&str, String>) -> String {
    params.iter().fold(template.to_string(), |message, (key, value)| {
        message.replace(&format!("{{{}}}", key), value)
    })
}

/// Whether failures with this code are transient.
pub fn is_retryable(code: &str) -> bool {
    RETRYABLE_CODES.contains(&code)
}

/// A platform failure translated for display: the machine code, the technical
/// message, and the fixed Spanish message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct PlatformError {
    pub code: String,
    pub message: String,
    pub user_message: String,
}

impl PlatformError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let user_message = message_template(&code).to_string();
        Self {
            code,
            message: message.into(),
            user_message,
        }
    }

    /// Builds an error whose template carries `{param}` placeholders.
    pub fn with_params(code: impl Into<String>, message: impl Into<String>, params: &HashMap<&str, String>) -> Self {
        let code = code.into();
        let user_message = format_message(message_template(&code), params);
        Self {
            code,
            message: message.into(),
            user_message,
        }
    }

    /// An error whose technical message is its user message.
    pub fn from_code(code: impl Into<String>) -> Self {
        let code = code.into();
        let user_message = message_template(&code).to_string();
        Self {
            message: user_message.clone(),
            code,
            user_message,
        }
    }

    pub fn is_retryable(&self) -> bool {
        is_retryable(&self.code)
    }
}

impl From<PortError> for PlatformError {
    fn from(err: PortError) -> Self {
        PlatformError::new(err.code().to_string(), err.to_string())
    }
}
