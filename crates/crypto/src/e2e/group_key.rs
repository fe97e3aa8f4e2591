//! Gruppen-Schluessel pro Gruppe
//!
//! Jede Gruppe hat genau einen symmetrischen Schluessel (XChaCha20-Poly1305).
//! Er wird lokal unter `groop_key_{groupId}` als Base64 abgelegt.

use std::sync::Arc;

use crate::error::{CryptoError, CryptoResult};
use crate::rng;
use crate::storage::SecureStorage;
use crate::types::{GroupKey, KEY_LEN};

/// Speicher-Schluessel fuer den Gruppen-Schluessel einer Gruppe
pub fn group_key_storage_key(group_id: &str) -> String {
    format!("groop_key_{group_id}")
}

fn unbestaetigt_storage_key(group_id: &str) -> String {
    format!("groop_key_unconfirmed_{group_id}")
}

/// Erstellt einen neuen Gruppen-Schluessel aus dem verifizierten RNG (ohne Speichern)
pub fn create_group_key(group_id: &str) -> CryptoResult<GroupKey> {
    let key_bytes: [u8; KEY_LEN] = rng::generate_key_material()?;
    GroupKey::from_bytes(group_id, key_bytes.to_vec())
}

/// Lokaler Speicher der Gruppen-Schluessel eines Geraets
pub struct GroupKeyStore<S: SecureStorage> {
    storage: Arc<S>,
}

impl<S: SecureStorage> GroupKeyStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Prueft ob ein gueltiger Schluessel fuer die Gruppe lokal vorliegt.
    ///
    /// Ein beschaedigter oder falsch langer Eintrag zaehlt als "kein Schluessel".
    pub fn has_key(&self, group_id: &str) -> bool {
        match self.get(group_id) {
            Ok(_) => true,
            Err(CryptoError::NoGroupKeyLocally { .. }) => false,
            Err(e) => {
                tracing::warn!(group_id = %group_id, "Gruppen-Schluessel unbrauchbar: {}", e);
                false
            }
        }
    }

    /// Laedt den Gruppen-Schluessel, prueft dabei die Laenge
    pub fn get(&self, group_id: &str) -> CryptoResult<GroupKey> {
        let raw = self
            .storage
            .get(&group_key_storage_key(group_id))?
            .ok_or_else(|| CryptoError::NoGroupKeyLocally {
                group_id: group_id.to_string(),
            })?;
        GroupKey::from_base64(group_id, &raw)
    }

    /// Speichert den Schluessel (ueberschreibt bedingungslos).
    ///
    /// Das Ueberschreiben eines *anderen* vorhandenen Schluessels wird als
    /// Warnung protokolliert; gleiche Bytes sind ein No-op.
    pub fn put(&self, group_id: &str, key: &GroupKey) -> CryptoResult<()> {
        match self.get(group_id) {
            Ok(existing) if existing.same_key(key) => {
                tracing::debug!(group_id = %group_id, "Gruppen-Schluessel bereits vorhanden");
                return self.confirm(group_id);
            }
            Ok(_) => {
                tracing::warn!(
                    group_id = %group_id,
                    "Vorhandener Gruppen-Schluessel wird ueberschrieben (Rotation)"
                );
            }
            Err(CryptoError::NoGroupKeyLocally { .. }) => {}
            Err(e) => {
                tracing::warn!(
                    group_id = %group_id,
                    "Beschaedigter Gruppen-Schluessel wird ersetzt: {}",
                    e
                );
            }
        }

        self.storage
            .set(&group_key_storage_key(group_id), &key.to_base64())?;
        // Ein empfangener Schluessel ist der gueltige Gruppen-Schluessel
        self.storage.remove(&unbestaetigt_storage_key(group_id))?;
        tracing::info!(group_id = %group_id, "Gruppen-Schluessel gespeichert");
        Ok(())
    }

    /// Erzeugt einen neuen Schluessel, speichert und gibt ihn zurueck.
    pub fn generate(&self, group_id: &str) -> CryptoResult<GroupKey> {
        let key = create_group_key(group_id)?;
        self.put(group_id, &key)?;
        Ok(key)
    }

    /// Wie `generate`, der Schluessel bleibt aber als unbestaetigt markiert,
    /// bis `confirm` aufgerufen wird.
    ///
    /// Fuer das Mitglied, das die Verschluesselung einer Gruppe einrichtet:
    /// erst das gewonnene Remote-Flag macht den Schluessel gueltig.
    pub fn generate_unconfirmed(&self, group_id: &str) -> CryptoResult<GroupKey> {
        let key = self.generate(group_id)?;
        self.storage.set(&unbestaetigt_storage_key(group_id), "1")?;
        Ok(key)
    }

    pub fn confirm(&self, group_id: &str) -> CryptoResult<()> {
        self.storage.remove(&unbestaetigt_storage_key(group_id))
    }

    /// `false` solange ein lokal erzeugter Schluessel das Flag nicht gewonnen hat
    pub fn is_confirmed(&self, group_id: &str) -> CryptoResult<bool> {
        Ok(self
            .storage
            .get(&unbestaetigt_storage_key(group_id))?
            .is_none())
    }

    /// Entfernt den lokalen Schluessel (z.B. beim Verlassen der Gruppe)
    pub fn remove(&self, group_id: &str) -> CryptoResult<()> {
        self.storage.remove(&group_key_storage_key(group_id))?;
        self.storage.remove(&unbestaetigt_storage_key(group_id))?;
        tracing::info!(group_id = %group_id, "Gruppen-Schluessel entfernt");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
