//! # AppError
//!
//! Centralized error handling for PerdidosYa!.
//! Maps catalog failures to actionable error types.

use std::fmt;

use thiserror::Error;

/// Which cap a `QuotaExceeded` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    /// Items created by one author in one calendar day.
    DailyPosts,
    /// Comments held by one author on one item.
    CommentsPerItem,
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quota::DailyPosts => f.write_str("daily post limit"),
            Quota::CommentsPerItem => f.write_str("comments per item limit"),
        }
    }
}

/// The primary error type for all catalog operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// No signed-in viewer
    #[error("authentication required")]
    Unauthenticated,

    /// Signed in, but the e-mail address is not verified yet
    #[error("email verification required")]
    EmailNotVerified,

    /// Daily post cap or per-item comment cap reached
    #[error("quota exceeded: {0}")]
    QuotaExceeded(Quota),

    /// The moderation service refused the text or image
    #[error("rejected by moderation: {0}")]
    ModerationRejected(String),

    /// Empty required field, oversized image, unsupported format...
    #[error("validation error: {0}")]
    ValidationFailed(String),

    /// Signed in, but not allowed to touch this resource
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A conflicting operation is still in flight
    #[error("conflict: {0}")]
    Conflict(String),

    /// Resource not found (e.g., Item, Comment)
    #[error("{0} not found with ID {1}")]
    NotFound(&'static str, String),

    /// Page fetch or item fetch failed or timed out
    #[error("remote read failed: {0}")]
    RemoteReadFailed(String),

    /// Document write, upload or deletion failed or timed out
    #[error("remote write failed: {0}")]
    RemoteWriteFailed(String),
}

impl AppError {
    /// Plain-language text for the transient notification shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthenticated => "Debes iniciar sesión para continuar".to_string(),
            AppError::EmailNotVerified => {
                "Debes verificar tu correo electrónico para acceder a esta funcionalidad"
                    .to_string()
            }
            AppError::QuotaExceeded(Quota::DailyPosts) => {
                "Has alcanzado el límite de 3 publicaciones por día".to_string()
            }
            AppError::QuotaExceeded(Quota::CommentsPerItem) => {
                "Has alcanzado el límite de 3 comentarios por publicación".to_string()
            }
            AppError::ModerationRejected(message) => message.clone(),
            AppError::ValidationFailed(message) => message.clone(),
            AppError::Unauthorized(_) => "No tienes permiso para realizar esta acción".to_string(),
            AppError::Conflict(_) => {
                "Espera a que termine la acción anterior e inténtalo de nuevo".to_string()
            }
            AppError::NotFound(_, _) => "No se encontró el objeto".to_string(),
            AppError::RemoteReadFailed(_) => "Ocurrió un error al cargar los objetos".to_string(),
            AppError::RemoteWriteFailed(_) => {
                "No se pudo guardar el cambio. Inténtalo de nuevo".to_string()
            }
        }
    }

    /// Failures detected before any state change; nothing to roll back.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            AppError::Unauthenticated
                | AppError::EmailNotVerified
                | AppError::QuotaExceeded(_)
                | AppError::ModerationRejected(_)
                | AppError::ValidationFailed(_)
                | AppError::Unauthorized(_)
                | AppError::Conflict(_)
        )
    }
}

/// A specialized Result type for catalog logic.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes reported by the authentication provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorCode {
    PopupClosed,
    PopupBlocked,
    InvalidCredential,
    InvalidEmail,
    UserNotFound,
    WrongPassword,
    WeakPassword,
    EmailAlreadyInUse,
    OperationNotAllowed,
    Other(String),
}

impl AuthErrorCode {
    /// Provider wire code, e.g. `auth/wrong-password`.
    pub fn code(&self) -> &str {
        match self {
            AuthErrorCode::PopupClosed => "auth/popup-closed-by-user",
            AuthErrorCode::PopupBlocked => "auth/popup-blocked",
            AuthErrorCode::InvalidCredential => "auth/invalid-credential",
            AuthErrorCode::InvalidEmail => "auth/invalid-email",
            AuthErrorCode::UserNotFound => "auth/user-not-found",
            AuthErrorCode::WrongPassword => "auth/wrong-password",
            AuthErrorCode::WeakPassword => "auth/weak-password",
            AuthErrorCode::EmailAlreadyInUse => "auth/email-already-in-use",
            AuthErrorCode::OperationNotAllowed => "auth/operation-not-allowed",
            AuthErrorCode::Other(code) => code,
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "auth/popup-closed-by-user" => AuthErrorCode::PopupClosed,
            "auth/popup-blocked" => AuthErrorCode::PopupBlocked,
            "auth/invalid-credential" => AuthErrorCode::InvalidCredential,
            "auth/invalid-email" => AuthErrorCode::InvalidEmail,
            "auth/user-not-found" => AuthErrorCode::UserNotFound,
            "auth/wrong-password" => AuthErrorCode::WrongPassword,
            "auth/weak-password" => AuthErrorCode::WeakPassword,
            "auth/email-already-in-use" => AuthErrorCode::EmailAlreadyInUse,
            "auth/operation-not-allowed" => AuthErrorCode::OperationNotAllowed,
            other => AuthErrorCode::Other(other.to_string()),
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            AuthErrorCode::PopupClosed => "Se cerró la ventana de inicio de sesión",
            AuthErrorCode::PopupBlocked => {
                "El navegador bloqueó la ventana emergente. Habilítala e inténtalo de nuevo"
            }
            AuthErrorCode::InvalidCredential => "Credenciales inválidas",
            AuthErrorCode::InvalidEmail => "El correo electrónico no es válido",
            AuthErrorCode::UserNotFound => "No existe una cuenta con ese correo",
            AuthErrorCode::WrongPassword => "Contraseña incorrecta",
            AuthErrorCode::WeakPassword => "La contraseña debe tener al menos 6 caracteres",
            AuthErrorCode::EmailAlreadyInUse => "Ya existe una cuenta con ese correo",
            AuthErrorCode::OperationNotAllowed => "Este método de inicio de sesión no está habilitado",
            AuthErrorCode::Other(_) => "No se pudo iniciar sesión. Inténtalo de nuevo",
        }
    }
}

/// Failure reported by the authentication provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("authentication failed ({})", .code.code())]
pub struct AuthError {
    pub code: AuthErrorCode,
}

impl AuthError {
    pub fn new(code: AuthErrorCode) -> Self {
        Self { code }
    }
}
