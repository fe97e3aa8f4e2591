//! # groop-crypto
//!
//! E2E Verschluesselung fuer Gruppen-Chats in Groop.
//!
//! ## Module
//! - `identity` - X25519 Langzeit-Identitaetsschluessel pro lokalem Benutzer
//! - `e2e` - Gruppen-Schluessel, Nachrichten-Cipher, Schluessel-Umschlaege
//! - `storage` - Lokaler sicherer Key-Value-Speicher
//! - `rng` - Gepruefter Betriebssystem-RNG
//! - `types` - Gemeinsame Typen (GroupKey, KeyEnvelope, EncryptedEnvelope, etc.)
//! - `error` - Fehlertypen
//!
//! Alle Operationen sind synchron und CPU-gebunden.

pub mod e2e;
pub mod error;
pub mod identity;
pub mod rng;
pub mod storage;
pub mod types;

// Bequeme Re-Exports
pub use error::{CryptoError, CryptoResult};
pub use identity::{identity_storage_key, IdentityKeyPair, IdentityKeyStore};
pub use storage::{FileStorage, MemoryStorage, SecureStorage};
pub use types::{
    EncryptedEnvelope, GroupKey, KeyEnvelope, PublicKey, SecretBytes, KEY_LEN, NONCE_LEN, TAG_LEN,
};

pub use e2e::{
    create_group_key, decrypt_message, decrypt_message_text, encrypt_message,
    encrypt_message_text, group_key_storage_key, hkdf_derive, open_group_key, receive_group_key,
    seal_group_key, share_group_key, GroupKeyStore,
};
