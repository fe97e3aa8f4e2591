//! Langzeit-Identitaetsschluessel (X25519)
//!
//! Jeder lokale Benutzer erhaelt beim ersten Bedarf ein X25519-Schluessel-Paar.
//! Der oeffentliche Schluessel wird im Remote-Store veroeffentlicht, der
//! private Schluessel verlaesst das Geraet nie.
//!
//! Persistenz: `keys_{userId}` -> `{"publicKey": base64, "secretKey": base64}`

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::{CryptoError, CryptoResult};
use crate::rng;
use crate::storage::SecureStorage;
use crate::types::{PublicKey, SecretBytes, KEY_LEN};

/// Langzeit-Identitaet eines lokalen Benutzers
#[derive(Clone)]
pub struct IdentityKeyPair {
    pub user_id: String,
    pub public_key: PublicKey,
    secret_key: SecretBytes,
}

impl IdentityKeyPair {
    /// Generiert ein neues Schluessel-Paar aus dem verifizierten RNG
    pub fn generate(user_id: &str) -> CryptoResult<Self> {
        let secret_bytes: [u8; KEY_LEN] = rng::generate_key_material()?;
        Ok(Self::from_secret_bytes(user_id, secret_bytes))
    }

    /// Rekonstruiert das Paar aus dem privaten Schluessel (32 Bytes)
    pub fn from_secret_bytes(user_id: &str, secret_bytes: [u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(secret_bytes);
        let public = X25519PublicKey::from(&secret);
        Self {
            user_id: user_id.to_string(),
            public_key: PublicKey(public.to_bytes()),
            secret_key: SecretBytes::new(secret.to_bytes().to_vec()),
        }
    }

    /// Privater Schluessel fuer die Diffie-Hellman-Berechnung
    pub(crate) fn static_secret(&self) -> StaticSecret {
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(self.secret_key.as_bytes());
        StaticSecret::from(bytes)
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("user_id", &self.user_id)
            .field("public_key", &self.public_key.to_base64())
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Persistiertes Format im lokalen Speicher
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredKeyPair {
    public_key: String,
    secret_key: String,
}

/// Speicher-Schluessel fuer die Identitaet eines Benutzers
pub fn identity_storage_key(user_id: &str) -> String {
    format!("keys_{user_id}")
}

/// Verwaltet die Identitaets-Schluessel der lokalen Benutzer
pub struct IdentityKeyStore<S: SecureStorage> {
    storage: Arc<S>,
    /// Serialisiert `ensure_key_pair`, damit nie zwei Paare entstehen
    erstellen_lock: Mutex<()>,
}

impl<S: SecureStorage> IdentityKeyStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            erstellen_lock: Mutex::new(()),
        }
    }

    /// Gibt das vorhandene Paar zurueck oder erzeugt und persistiert ein neues.
    ///
    /// Ein vorhandenes, aber unlesbares Paar ist ein Fehler; es wird nie
    /// stillschweigend ersetzt, da bereits verteilte Umschlaege sonst verwaisen.
    pub fn ensure_key_pair(&self, user_id: &str) -> CryptoResult<IdentityKeyPair> {
        let _guard = self.erstellen_lock.lock();

        if let Some(existing) = self.key_pair(user_id)? {
            return Ok(existing);
        }

        let pair = IdentityKeyPair::generate(user_id)?;
        let stored = StoredKeyPair {
            public_key: pair.public_key.to_base64(),
            secret_key: STANDARD.encode(pair.secret_key.as_bytes()),
        };
        self.storage
            .set(&identity_storage_key(user_id), &serde_json::to_string(&stored)?)?;

        tracing::info!(user_id = %user_id, "Neues Identitaets-Schluessel-Paar erzeugt");
        Ok(pair)
    }

    /// Laedt das Paar ohne es anzulegen
    pub fn key_pair(&self, user_id: &str) -> CryptoResult<Option<IdentityKeyPair>> {
        let Some(raw) = self.storage.get(&identity_storage_key(user_id))? else {
            return Ok(None);
        };

        let stored: StoredKeyPair = serde_json::from_str(&raw).map_err(|e| {
            CryptoError::MalformedEnvelope(format!("Gespeicherte Identitaet unlesbar: {e}"))
        })?;
        let secret = STANDARD.decode(stored.secret_key.as_bytes())?;
        let secret: [u8; KEY_LEN] = secret.as_slice().try_into().map_err(|_| {
            CryptoError::falsche_laenge("Privater Schluessel", KEY_LEN, secret.len())
        })?;
        let public = PublicKey::from_base64(&stored.public_key)?;

        let pair = IdentityKeyPair::from_secret_bytes(user_id, secret);
        if pair.public_key != public {
            return Err(CryptoError::MalformedEnvelope(
                "Gespeicherter oeffentlicher Schluessel passt nicht zum privaten".into(),
            ));
        }
        Ok(Some(pair))
    }

    /// Oeffentlicher Schluessel eines lokalen Benutzers
    pub fn get_public_key(&self, user_id: &str) -> CryptoResult<PublicKey> {
        self.key_pair(user_id)?
            .map(|pair| pair.public_key)
            .ok_or_else(|| CryptoError::IdentityNotFound {
                user_id: user_id.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
