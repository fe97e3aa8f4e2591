//! Schluessel-Umschlaege fuer die Verteilung des Gruppen-Schluessels
//!
//! Ein Mitglied, das den Gruppen-Schluessel besitzt, versiegelt ihn fuer einen
//! Empfaenger:
//! 1. X25519 DH: Sender-Private-Key x Empfaenger-Public-Key
//! 2. HKDF-SHA256 -> Umschlag-Schluessel (Salt = Sender-PK ‖ Empfaenger-PK)
//! 3. XChaCha20-Poly1305 mit frischer Nonce, AAD bindet Gruppe + Empfaenger
//!
//! Der Empfaenger rechnet denselben DH mit seinem privaten Schluessel und dem
//! oeffentlichen Schluessel des Senders. Damit ist auch der Sender authentifiziert.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use chrono::Utc;
use hkdf::Hkdf;
use sha2::Sha256;
use uuid::Uuid;
use x25519_dalek::PublicKey as X25519PublicKey;

use crate::e2e::group_key::GroupKeyStore;
use crate::error::{CryptoError, CryptoResult};
use crate::identity::IdentityKeyPair;
use crate::rng;
use crate::storage::SecureStorage;
use crate::types::{GroupKey, KeyEnvelope, PublicKey, KEY_LEN, NONCE_LEN, TAG_LEN};

const UMSCHLAG_INFO: &[u8] = b"groop-key-envelope-v1";

/// Liest den lokalen Gruppen-Schluessel und versiegelt ihn fuer einen Empfaenger.
///
/// Schlaegt mit `NoGroupKeyLocally` fehl, wenn der Sender den Schluessel nicht
/// besitzt. Die Persistenz des Umschlags uebernimmt der Aufrufer.
pub fn share_group_key<S: SecureStorage>(
    group_keys: &GroupKeyStore<S>,
    group_id: &str,
    recipient_id: &str,
    recipient_public_key: &PublicKey,
    sender: &IdentityKeyPair,
) -> CryptoResult<KeyEnvelope> {
    let key = group_keys.get(group_id)?;
    seal_group_key(&key, recipient_id, recipient_public_key, sender)
}

/// Oeffnet einen Umschlag und speichert den Gruppen-Schluessel lokal.
///
/// Bei jedem Fehler bleibt der lokale Schluessel-Speicher unveraendert.
pub fn receive_group_key<S: SecureStorage>(
    group_keys: &GroupKeyStore<S>,
    envelope: &KeyEnvelope,
    recipient: &IdentityKeyPair,
) -> CryptoResult<GroupKey> {
    let key = open_group_key(envelope, recipient)?;
    group_keys.put(&envelope.group_id, &key)?;
    tracing::info!(
        group_id = %envelope.group_id,
        sender_id = %envelope.sender_id,
        "Gruppen-Schluessel aus Umschlag uebernommen"
    );
    Ok(key)
}

/// Versiegelt einen Gruppen-Schluessel fuer einen Empfaenger
pub fn seal_group_key(
    key: &GroupKey,
    recipient_id: &str,
    recipient_public_key: &PublicKey,
    sender: &IdentityKeyPair,
) -> CryptoResult<KeyEnvelope> {
    let wrapping_key = envelope_key(
        sender,
        recipient_public_key,
        &sender.public_key,
        recipient_public_key,
    )?;

    let nonce: [u8; NONCE_LEN] = rng::random_array()?;
    let cipher = XChaCha20Poly1305::new_from_slice(&wrapping_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let aad = associated_data(&key.group_id, recipient_id);

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: key.as_bytes(),
                aad: &aad,
            },
        )
        .map_err(|e| CryptoError::AuthenticationFailed(format!("Versiegeln: {e}")))?;

    Ok(KeyEnvelope {
        id: Uuid::new_v4(),
        group_id: key.group_id.clone(),
        sender_id: sender.user_id.clone(),
        sender_public_key: sender.public_key,
        recipient_id: recipient_id.to_string(),
        recipient_public_key: *recipient_public_key,
        nonce: nonce.to_vec(),
        ciphertext,
        created_at: Utc::now(),
    })
}

/// Oeffnet einen Umschlag mit dem eigenen Schluessel-Paar
pub fn open_group_key(envelope: &KeyEnvelope, recipient: &IdentityKeyPair) -> CryptoResult<GroupKey> {
    if envelope.recipient_id != recipient.user_id {
        return Err(CryptoError::MalformedEnvelope(format!(
            "Umschlag ist an {} adressiert, nicht an {}",
            envelope.recipient_id, recipient.user_id
        )));
    }
    if envelope.recipient_public_key != recipient.public_key {
        return Err(CryptoError::MalformedEnvelope(
            "Umschlag wurde fuer einen frueheren Identitaets-Schluessel versiegelt".to_string(),
        ));
    }
    let nonce: [u8; NONCE_LEN] = envelope
        .nonce
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::falsche_laenge("Umschlag-Nonce", NONCE_LEN, envelope.nonce.len()))?;
    if envelope.ciphertext.len() != KEY_LEN + TAG_LEN {
        return Err(CryptoError::falsche_laenge(
            "Umschlag-Ciphertext",
            KEY_LEN + TAG_LEN,
            envelope.ciphertext.len(),
        ));
    }

    let wrapping_key = envelope_key(
        recipient,
        &envelope.sender_public_key,
        &envelope.sender_public_key,
        &recipient.public_key,
    )?;
    let cipher = XChaCha20Poly1305::new_from_slice(&wrapping_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let aad = associated_data(&envelope.group_id, &envelope.recipient_id);

    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: &envelope.ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| {
            CryptoError::AuthenticationFailed(format!(
                "Umschlag {} fuer Gruppe {} nicht authentisch",
                envelope.id, envelope.group_id
            ))
        })?;

    GroupKey::from_bytes(&envelope.group_id, plaintext)
}

/// DH + HKDF -> Umschlag-Schluessel
///
/// `own` rechnet mit `peer`; Salt ist immer Sender-PK ‖ Empfaenger-PK.
fn envelope_key(
    own: &IdentityKeyPair,
    peer: &PublicKey,
    sender_public: &PublicKey,
    recipient_public: &PublicKey,
) -> CryptoResult<Vec<u8>> {
    let shared = own
        .static_secret()
        .diffie_hellman(&X25519PublicKey::from(*peer.as_bytes()));
    if !shared.was_contributory() {
        return Err(CryptoError::MalformedEnvelope(
            "Oeffentlicher Schluessel niedriger Ordnung".to_string(),
        ));
    }

    let mut salt = [0u8; 2 * KEY_LEN];
    salt[..KEY_LEN].copy_from_slice(sender_public.as_bytes());
    salt[KEY_LEN..].copy_from_slice(recipient_public.as_bytes());

    hkdf_derive(shared.as_bytes(), &salt, UMSCHLAG_INFO, KEY_LEN)
}

/// AAD: [len(group_id) u32 BE] [group_id] [recipient_id]
fn associated_data(group_id: &str, recipient_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(4 + group_id.len() + recipient_id.len());
    aad.extend_from_slice(&(group_id.len() as u32).to_be_bytes());
    aad.extend_from_slice(group_id.as_bytes());
    aad.extend_from_slice(recipient_id.as_bytes());
    aad
}

/// HKDF-basierte Key Derivation (allgemein verwendbar)
pub fn hkdf_derive(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> CryptoResult<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    fn group_store() -> GroupKeyStore<MemoryStorage> {
        GroupKeyStore::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn share_und_receive_roundtrip() {
        let alice = IdentityKeyPair::generate("alice").unwrap();
        let bob = IdentityKeyPair::generate("bob").unwrap();
        let alice_keys = group_store();
        let bob_keys = group_store();

        let original = alice_keys.generate("trip").unwrap();
        let envelope =
            share_group_key(&alice_keys, "trip", "bob", &bob.public_key, &alice).unwrap();
        assert_eq!(envelope.sender_public_key, alice.public_key);
        assert_eq!(envelope.recipient_id, "bob");

        let received = receive_group_key(&bob_keys, &envelope, &bob).unwrap();
        assert_eq!(received.as_bytes(), original.as_bytes());
        assert!(bob_keys.get("trip").unwrap().same_key(&original));
    }

    #[test]
    fn share_ohne_lokalen_schluessel_schlaegt_fehl() {
        let alice = IdentityKeyPair::generate("alice").unwrap();
        let bob = IdentityKeyPair::generate("bob").unwrap();

        let result = share_group_key(&group_store(), "trip", "bob", &bob.public_key, &alice);
        assert!(matches!(result, Err(CryptoError::NoGroupKeyLocally { .. })));
    }

    #[test]
    fn manipulierter_umschlag_aendert_speicher_nicht() {
        let alice = IdentityKeyPair::generate("alice").unwrap();
        let bob = IdentityKeyPair::generate("bob").unwrap();
        let alice_keys = group_store();
        let bob_keys = group_store();

        alice_keys.generate("trip").unwrap();
        let mut envelope =
            share_group_key(&alice_keys, "trip", "bob", &bob.public_key, &alice).unwrap();
        envelope.ciphertext[3] ^= 0x40;

        let result = receive_group_key(&bob_keys, &envelope, &bob);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed(_))));
        assert!(!bob_keys.has_key("trip"));
    }

    #[test]
    fn manipulierter_umschlag_ueberschreibt_vorhandenen_schluessel_nicht() {
        let alice = IdentityKeyPair::generate("alice").unwrap();
        let bob = IdentityKeyPair::generate("bob").unwrap();
        let alice_keys = group_store();
        let bob_keys = group_store();

        alice_keys.generate("trip").unwrap();
        let vorhanden = bob_keys.generate("trip").unwrap();
        let mut envelope =
            share_group_key(&alice_keys, "trip", "bob", &bob.public_key, &alice).unwrap();
        envelope.nonce[0] ^= 0x01;

        assert!(receive_group_key(&bob_keys, &envelope, &bob).is_err());
        assert!(bob_keys.get("trip").unwrap().same_key(&vorhanden));
    }

    #[test]
    fn falscher_empfaenger_abgelehnt() {
        let alice = IdentityKeyPair::generate("alice").unwrap();
        let bob = IdentityKeyPair::generate("bob").unwrap();
        let carol = IdentityKeyPair::generate("carol").unwrap();
        let alice_keys = group_store();

        alice_keys.generate("trip").unwrap();
        let envelope =
            share_group_key(&alice_keys, "trip", "bob", &bob.public_key, &alice).unwrap();

        let result = open_group_key(&envelope, &carol);
        assert!(matches!(result, Err(CryptoError::MalformedEnvelope(_))));
    }

    #[test]
    fn umschlag_fuer_alte_identitaet_abgelehnt() {
        let alice = IdentityKeyPair::generate("alice").unwrap();
        let bob_alt = IdentityKeyPair::generate("bob").unwrap();
        let bob_neu = IdentityKeyPair::generate("bob").unwrap();
        let alice_keys = group_store();

        alice_keys.generate("trip").unwrap();
        let envelope =
            share_group_key(&alice_keys, "trip", "bob", &bob_alt.public_key, &alice).unwrap();

        let result = open_group_key(&envelope, &bob_neu);
        assert!(matches!(result, Err(CryptoError::MalformedEnvelope(_))));
    }

    #[test]
    fn umgeleiteter_umschlag_fuer_andere_gruppe_abgelehnt() {
        let alice = IdentityKeyPair::generate("alice").unwrap();
        let bob = IdentityKeyPair::generate("bob").unwrap();
        let alice_keys = group_store();

        alice_keys.generate("trip").unwrap();
        let mut envelope =
            share_group_key(&alice_keys, "trip", "bob", &bob.public_key, &alice).unwrap();
        envelope.group_id = "andere-gruppe".into();

        let result = open_group_key(&envelope, &bob);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed(_))));
    }

    #[test]
    fn gefaelschter_sender_abgelehnt() {
        let alice = IdentityKeyPair::generate("alice").unwrap();
        let bob = IdentityKeyPair::generate("bob").unwrap();
        let mallory = IdentityKeyPair::generate("mallory").unwrap();
        let alice_keys = group_store();

        alice_keys.generate("trip").unwrap();
        let mut envelope =
            share_group_key(&alice_keys, "trip", "bob", &bob.public_key, &alice).unwrap();
        envelope.sender_public_key = mallory.public_key;

        assert!(matches!(
            open_group_key(&envelope, &bob),
            Err(CryptoError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn falsche_laengen_werden_vorab_abgelehnt() {
        let alice = IdentityKeyPair::generate("alice").unwrap();
        let bob = IdentityKeyPair::generate("bob").unwrap();
        let alice_keys = group_store();

        alice_keys.generate("trip").unwrap();
        let envelope =
            share_group_key(&alice_keys, "trip", "bob", &bob.public_key, &alice).unwrap();

        let mut kurze_nonce = envelope.clone();
        kurze_nonce.nonce.truncate(12);
        assert!(matches!(
            open_group_key(&kurze_nonce, &bob),
            Err(CryptoError::MalformedEnvelope(_))
        ));

        let mut langer_ciphertext = envelope;
        langer_ciphertext.ciphertext.push(0);
        assert!(matches!(
            open_group_key(&langer_ciphertext, &bob),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn schwacher_public_key_abgelehnt() {
        let alice = IdentityKeyPair::generate("alice").unwrap();
        let key = crate::e2e::group_key::create_group_key("trip").unwrap();

        let result = seal_group_key(&key, "bob", &PublicKey([0u8; KEY_LEN]), &alice);
        assert!(matches!(result, Err(CryptoError::MalformedEnvelope(_))));
    }

    #[test]
    fn jeder_umschlag_hat_frische_nonce() {
        let alice = IdentityKeyPair::generate("alice").unwrap();
        let bob = IdentityKeyPair::generate("bob").unwrap();
        let alice_keys = group_store();
        alice_keys.generate("trip").unwrap();

        let a = share_group_key(&alice_keys, "trip", "bob", &bob.public_key, &alice).unwrap();
        let b = share_group_key(&alice_keys, "trip", "bob", &bob.public_key, &alice).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn hkdf_derive_deterministisch() {
        let key1 = hkdf_derive(b"ikm", b"salt", b"info", 32).unwrap();
        let key2 = hkdf_derive(b"ikm", b"salt", b"info", 32).unwrap();
        assert_eq!(key1, key2);
        assert_ne!(key1, hkdf_derive(b"ikm", b"salt", b"info-2", 32).unwrap());
    }
}
