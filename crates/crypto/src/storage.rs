//! Lokaler sicherer Schluessel-Speicher
//!
//! Das `SecureStorage`-Trait abstrahiert den geraeteseitigen Key-Value-Speicher
//! (Keychain, verschluesselte Preferences, Dateien). Es werden nur Strings
//! abgelegt: `keys_{userId}` -> JSON, `groop_key_{groupId}` -> Base64.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{CryptoError, CryptoResult};

/// Abstrakter lokaler Key-Value-Speicher fuer Schluesselmaterial
pub trait SecureStorage: Send + Sync {
    /// Wert laden, `None` wenn nicht vorhanden
    fn get(&self, key: &str) -> CryptoResult<Option<String>>;

    /// Wert schreiben (ueberschreibt)
    fn set(&self, key: &str, value: &str) -> CryptoResult<()>;

    /// Wert entfernen, fehlender Eintrag ist kein Fehler
    fn remove(&self, key: &str) -> CryptoResult<()>;
}

/// In-Memory-Speicher (Tests, fluechtige Sessions)
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SecureStorage for MemoryStorage {
    fn get(&self, key: &str) -> CryptoResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> CryptoResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> CryptoResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Datei-basierter Speicher
///
/// Eine Datei pro Schluessel unter `base_dir`. Schreibvorgaenge gehen ueber
/// eine temporaere Datei + `rename`, damit ein abgebrochener Schreibvorgang
/// nie einen halb geschriebenen Schluessel hinterlaesst.
#[derive(Debug)]
pub struct FileStorage {
    base_dir: PathBuf,
    schreib_lock: Mutex<()>,
}

impl FileStorage {
    /// Neuer FileStorage, das Verzeichnis wird bei Bedarf angelegt
    pub fn new(base_dir: impl Into<PathBuf>) -> CryptoResult<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            schreib_lock: Mutex::new(()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn full_path(&self, key: &str) -> CryptoResult<PathBuf> {
        if key.is_empty() {
            return Err(CryptoError::Storage("Leerer Speicher-Schluessel".into()));
        }
        Ok(self.base_dir.join(dateiname(key)))
    }
}

/// Bildet einen Speicher-Schluessel auf einen sicheren Dateinamen ab
fn dateiname(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

impl SecureStorage for FileStorage {
    fn get(&self, key: &str) -> CryptoResult<Option<String>> {
        let path = self.full_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> CryptoResult<()> {
        let path = self.full_path(key)?;
        let tmp = self
            .base_dir
            .join(format!(".{}.{}.tmp", dateiname(key), Uuid::new_v4().simple()));

        let _guard = self.schreib_lock.lock();
        std::fs::write(&tmp, value)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        tracing::debug!(path = %path.display(), "Schluessel-Datei geschrieben");
        Ok(())
    }

    fn remove(&self, key: &str) -> CryptoResult<()> {
        let path = self.full_path(key)?;
        let _guard = self.schreib_lock.lock();
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            // Bereits entfernt – kein Fehler
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_set_get_remove() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("a").unwrap(), None);
        storage.set("a", "1").unwrap();
        assert_eq!(storage.get("a").unwrap().as_deref(), Some("1"));
        storage.remove("a").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn file_storage_persistiert_ueber_instanzen() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        storage.set("groop_key_trip-1", "abc").unwrap();

        let wieder = FileStorage::new(dir.path()).unwrap();
        assert_eq!(wieder.get("groop_key_trip-1").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn file_storage_remove_fehlend_ist_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        assert!(storage.remove("keys_niemand").is_ok());
    }

    #[test]
    fn file_storage_entschaerft_pfade() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        storage.set("keys_../../etc/passwd", "x").unwrap();

        let eintraege: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(eintraege.len(), 1);
        assert_eq!(storage.get("keys_../../etc/passwd").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn file_storage_ueberschreibt() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        storage.set("k", "alt").unwrap();
        storage.set("k", "neu").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("neu"));
    }

    #[test]
    fn leerer_schluessel_abgelehnt() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        assert!(matches!(storage.set("", "x"), Err(CryptoError::Storage(_))));
    }
}
