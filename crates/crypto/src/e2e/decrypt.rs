//! Nachrichten-Entschluesselung
//!
//! Entschluesselt Chat-Text mit dem Gruppen-Schluessel und verifiziert dabei
//! den Auth-Tag. Bei Fehlern wird nie Teil-Klartext zurueckgegeben.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{EncryptedEnvelope, GroupKey, KEY_LEN, NONCE_LEN, TAG_LEN};

/// Entschluesselt eine Nachricht mit dem Gruppen-Schluessel
///
/// Falscher Schluessel, manipulierte oder beschaedigte Daten ergeben
/// `AuthenticationFailed`.
pub fn decrypt_message(envelope: &EncryptedEnvelope, key: &GroupKey) -> CryptoResult<String> {
    if envelope.ciphertext.len() < TAG_LEN {
        return Err(CryptoError::MalformedEnvelope(format!(
            "Ciphertext zu kurz: {} Bytes",
            envelope.ciphertext.len()
        )));
    }

    let plaintext = open(&envelope.ciphertext, key.as_bytes(), &envelope.nonce)?;
    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::MalformedEnvelope("Klartext ist kein UTF-8".to_string()))
}

/// Entschluesselt das Transportformat aus dem `text`-Feld
///
/// Nuetzlich wenn der Text direkt aus dem Remote-Store kommt.
pub fn decrypt_message_text(encoded: &str, key: &GroupKey) -> CryptoResult<String> {
    let envelope = EncryptedEnvelope::from_base64(encoded)?;
    decrypt_message(&envelope, key)
}

pub(crate) fn open(
    ciphertext: &[u8],
    key_bytes: &[u8],
    nonce: &[u8; NONCE_LEN],
) -> CryptoResult<Vec<u8>> {
    if key_bytes.len() != KEY_LEN {
        return Err(CryptoError::falsche_laenge("Schluessel", KEY_LEN, key_bytes.len()));
    }

    let cipher = XChaCha20Poly1305::new_from_slice(key_bytes)
        .map_err(|_| CryptoError::falsche_laenge("Schluessel", KEY_LEN, key_bytes.len()))?;

    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed("Auth-Tag ungueltig".to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
