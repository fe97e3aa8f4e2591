//! Nachrichten-Verschluesselung
//!
//! Verschluesselt Chat-Text mit dem Gruppen-Schluessel (XChaCha20-Poly1305).
//!
//! ## Format
//! ```text
//! base64( [nonce(24)] [ciphertext + auth_tag(16)] )
//! ```
//!
//! Die Nonce ist pro Aufruf frisch aus dem Betriebssystem-RNG gezogen. Bei
//! 24 Bytes ist eine zufaellige Kollision unter demselben Schluessel
//! praktisch ausgeschlossen.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};

use crate::error::{CryptoError, CryptoResult};
use crate::rng;
use crate::types::{EncryptedEnvelope, GroupKey, NONCE_LEN};

/// Verschluesselt einen Nachrichtentext mit dem Gruppen-Schluessel
pub fn encrypt_message(plaintext: &str, key: &GroupKey) -> CryptoResult<EncryptedEnvelope> {
    let nonce: [u8; NONCE_LEN] = rng::random_array()?;
    let ciphertext = seal(plaintext.as_bytes(), key.as_bytes(), &nonce)?;
    Ok(EncryptedEnvelope { nonce, ciphertext })
}

/// Verschluesselt und liefert direkt das Transportformat fuer das `text`-Feld
pub fn encrypt_message_text(plaintext: &str, key: &GroupKey) -> CryptoResult<String> {
    Ok(encrypt_message(plaintext, key)?.to_base64())
}

pub(crate) fn seal(
    plaintext: &[u8],
    key_bytes: &[u8],
    nonce: &[u8; NONCE_LEN],
) -> CryptoResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key_bytes)
        .map_err(|_| CryptoError::falsche_laenge("Schluessel", 32, key_bytes.len()))?;

    cipher
        .encrypt(XNonce::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::AuthenticationFailed(format!("Verschluesselung: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::e2e::group_key::create_group_key;
    use crate::types::TAG_LEN;

    #[test]
    fn ciphertext_hat_tag_overhead() {
        let key = create_group_key("trip").unwrap();
        let plaintext = "Treffpunkt 9 Uhr am Bahnhof";

        let envelope = encrypt_message(plaintext, &key).unwrap();
        assert_eq!(envelope.ciphertext.len(), plaintext.len() + TAG_LEN);
        assert_ne!(&envelope.ciphertext[..plaintext.len()], plaintext.as_bytes());
    }

    #[test]
    fn frische_nonce_pro_aufruf() {
        let key = create_group_key("trip").unwrap();
        let a = encrypt_message("gleicher Text", &key).unwrap();
        let b = encrypt_message("gleicher Text", &key).unwrap();

        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn transportformat_ist_base64_mit_nonce_praefix() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let key = create_group_key("trip").unwrap();
        let envelope = encrypt_message("Hallo", &key).unwrap();
        let text = envelope.to_base64();

        let raw = STANDARD.decode(text).unwrap();
        assert_eq!(&raw[..NONCE_LEN], &envelope.nonce);
        assert_eq!(&raw[NONCE_LEN..], envelope.ciphertext.as_slice());
    }

    #[test]
    fn leerer_text_verschluesselbar() {
        let key = create_group_key("trip").unwrap();
        let envelope = encrypt_message("", &key).unwrap();
        assert_eq!(envelope.ciphertext.len(), TAG_LEN);
    }
}
