//! Fehlertypen fuer das Chat-Crate

use thiserror::Error;

use groop_crypto::CryptoError;

/// Chat-/Koordinations-Fehlertypen
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Krypto-Fehler: {0}")]
    Crypto(#[from] CryptoError),

    /// Remote-Store nicht erreichbar. Lokaler Schluessel-Zustand bleibt
    /// unveraendert, der Aufruf kann wiederholt werden.
    #[error("Remote-Store nicht erreichbar: {0}")]
    StoreUnavailable(String),

    #[error("Kein oeffentlicher Schluessel fuer Benutzer {user_id}")]
    PublicKeyNotFound { user_id: String },

    #[error("Verschluesselung fuer Gruppe {group_id} noch nicht bereit")]
    EncryptionNotReady { group_id: String },

    #[error("Hintergrund-Task abgebrochen: {0}")]
    Hintergrund(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Gibt `true` zurueck wenn ein spaeterer Versuch Erfolg haben kann
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::EncryptionNotReady { .. } | Self::Hintergrund(_)
        )
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
