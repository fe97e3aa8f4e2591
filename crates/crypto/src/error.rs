//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Der sichere Zufallsgenerator konnte nicht verifiziert werden.
    /// Schluessel-Generierung wird abgebrochen, es gibt keinen schwaecheren Fallback.
    #[error("Sicherer Zufallsgenerator nicht verfuegbar: {0}")]
    CryptoUnavailable(String),

    #[error("Kein lokaler Gruppen-Schluessel fuer Gruppe {group_id}")]
    NoGroupKeyLocally { group_id: String },

    #[error("Authentifizierung fehlgeschlagen: {0}")]
    AuthenticationFailed(String),

    #[error("Ungueltiger Umschlag: {0}")]
    MalformedEnvelope(String),

    #[error("Keine Identitaet fuer Benutzer {user_id}")]
    IdentityNotFound { user_id: String },

    #[error("Lokaler Speicher-Fehler: {0}")]
    Storage(String),

    #[error("Key Derivation fehlgeschlagen: {0}")]
    KeyDerivation(String),

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl CryptoError {
    /// Laengenfehler als `MalformedEnvelope`
    pub fn falsche_laenge(was: &str, erwartet: usize, erhalten: usize) -> Self {
        Self::MalformedEnvelope(format!(
            "{was}: erwartet {erwartet} Bytes, erhalten {erhalten}"
        ))
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;
