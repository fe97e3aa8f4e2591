//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};

/// Laenge aller symmetrischen und X25519-Schluessel
pub const KEY_LEN: usize = 32;
/// Laenge der XChaCha20-Nonce
pub const NONCE_LEN: usize = 24;
/// Laenge des Poly1305-Auth-Tags
pub const TAG_LEN: usize = 16;

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone)]
pub struct SecretBytes(Vec<u8>);

impl Zeroize for SecretBytes {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Oeffentlicher X25519-Schluessel (32 Bytes, als Base64 serialisiert)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; KEY_LEN]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Dekodiert einen Base64-Schluessel und prueft die Laenge
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD.decode(encoded.as_bytes())?;
        Self::try_from(bytes.as_slice())
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = CryptoError;

    fn try_from(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::falsche_laenge("Oeffentlicher Schluessel", KEY_LEN, bytes.len()))?;
        Ok(Self(array))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Symmetrischer Gruppen-Schluessel (32 Bytes fuer XChaCha20-Poly1305)
#[derive(Debug, Clone)]
pub struct GroupKey {
    /// Gruppe, zu der der Schluessel gehoert
    pub group_id: String,
    key_bytes: SecretBytes,
}

impl GroupKey {
    /// Erstellt einen Gruppen-Schluessel, die Laenge muss exakt `KEY_LEN` sein
    pub fn from_bytes(group_id: &str, bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::falsche_laenge(
                "Gruppen-Schluessel",
                KEY_LEN,
                bytes.len(),
            ));
        }
        Ok(Self {
            group_id: group_id.to_string(),
            key_bytes: SecretBytes::new(bytes),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.key_bytes.as_bytes()
    }

    /// Vergleicht das Schluesselmaterial zweier Gruppen-Schluessel
    pub fn same_key(&self, other: &GroupKey) -> bool {
        self.as_bytes() == other.as_bytes()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.as_bytes())
    }

    pub fn from_base64(group_id: &str, encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD.decode(encoded.trim().as_bytes())?;
        Self::from_bytes(group_id, bytes)
    }
}

/// Asymmetrischer Schluessel-Umschlag: der Gruppen-Schluessel, versiegelt
/// fuer genau einen Empfaenger.
///
/// Wird im Remote-Store abgelegt und vom Empfaenger genau einmal konsumiert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEnvelope {
    pub id: Uuid,
    pub group_id: String,
    pub sender_id: String,
    pub sender_public_key: PublicKey,
    pub recipient_id: String,
    /// Identitaet des Empfaengers zum Zeitpunkt des Versiegelns
    pub recipient_public_key: PublicKey,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Verschluesselte Nachricht (Nonce + Ciphertext inkl. Auth-Tag)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    /// 24 Bytes Nonce, pro Verschluesselung frisch gezogen
    pub nonce: [u8; NONCE_LEN],
    /// Verschluesselter Inhalt inkl. 16 Bytes Auth-Tag (angehaengt)
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Serialisiert zu Bytes: [nonce(24)] + [ciphertext]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Deserialisiert aus Bytes, prueft die Mindestlaenge vor jeder Entschluesselung
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::MalformedEnvelope(format!(
                "Nachricht zu kurz: {} Bytes (Minimum {})",
                bytes.len(),
                NONCE_LEN + TAG_LEN
            )));
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);
        Ok(Self {
            nonce,
            ciphertext: bytes[NONCE_LEN..].to_vec(),
        })
    }

    /// Transportformat fuer das `text`-Feld: base64(nonce ‖ ciphertext)
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim().as_bytes())
            .map_err(|e| CryptoError::MalformedEnvelope(format!("Base64: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

/// Serde-Helfer fuer Byte-Felder als Base64-String
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
