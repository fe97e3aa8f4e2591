//! E2E Verschluesselung (End-to-End)
//!
//! Mitglied <-> Mitglied Verschluesselung. Der Remote-Store speichert nur
//! Ciphertext und versiegelte Umschlaege und kann keine Nachricht lesen.
//!
//! ## Ablauf
//! 1. Jeder Benutzer hat eine `IdentityKeyPair` (X25519 Langzeit-Key)
//! 2. Das erste Mitglied erzeugt den Gruppen-Schluessel
//! 3. Der Gruppen-Schluessel wird per Umschlag an jedes Mitglied versiegelt
//! 4. Nachrichten werden mit dem Gruppen-Schluessel (XChaCha20-Poly1305) verschluesselt

pub mod decrypt;
pub mod encrypt;
pub mod group_key;
pub mod key_exchange;

pub use decrypt::{decrypt_message, decrypt_message_text};
pub use encrypt::{encrypt_message, encrypt_message_text};
pub use group_key::{create_group_key, group_key_storage_key, GroupKeyStore};
pub use key_exchange::{
    hkdf_derive, open_group_key, receive_group_key, seal_group_key, share_group_key,
};
