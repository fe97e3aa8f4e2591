//! Remote-Store (Dokument-Datenbank) als externer Kollaborateur
//!
//! Das `RemoteStore`-Trait abstrahiert den konkreten Dokument-Store. Der Kern
//! braucht nur: Verschluesselungs-Flag der Gruppe lesen/setzen, Mitglieder
//! und oeffentliche Schluessel aufloesen, Umschlaege anhaengen/auflisten/konsumieren.
//!
//! `InMemoryStore` ist eine vollstaendige In-Memory-Implementierung fuer Tests
//! und lokale Entwicklung. Umschlaege werden dort als JSON-Dokumente abgelegt,
//! wie sie auch im echten Store liegen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use groop_crypto::{KeyEnvelope, PublicKey};

use crate::error::{ChatError, ChatResult};

/// Abstrakter Remote-Store
///
/// Alle Methoden sind async; Netzwerk-Timeouts und Retries liegen beim Store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Liest das `encryptionEnabled`-Flag der Gruppe
    async fn encryption_enabled(&self, group_id: &str) -> ChatResult<bool>;

    /// Setzt das Flag atomar von `false` auf `true`.
    ///
    /// Gibt `true` zurueck wenn dieser Aufruf das Flag gesetzt hat, `false`
    /// wenn es bereits gesetzt war.
    async fn try_enable_encryption(&self, group_id: &str) -> ChatResult<bool>;

    /// Aktuelle Mitglieder der Gruppe
    async fn group_members(&self, group_id: &str) -> ChatResult<Vec<String>>;

    /// Veroeffentlichter oeffentlicher Schluessel eines Benutzers
    async fn public_key(&self, user_id: &str) -> ChatResult<Option<PublicKey>>;

    /// Veroeffentlicht den eigenen oeffentlichen Schluessel
    async fn publish_public_key(&self, user_id: &str, key: &PublicKey) -> ChatResult<()>;

    /// Haengt einen Umschlag an die Warteschlange des Empfaengers an
    async fn append_envelope(&self, envelope: &KeyEnvelope) -> ChatResult<()>;

    /// Noch nicht konsumierte Umschlaege fuer einen Empfaenger
    async fn pending_envelopes(&self, recipient_id: &str) -> ChatResult<Vec<KeyEnvelope>>;

    /// Markiert einen Umschlag als konsumiert.
    ///
    /// Gibt `true` zurueck wenn dieser Aufruf ihn konsumiert hat; ein bereits
    /// konsumierter Umschlag ergibt `false` und ist kein Fehler.
    async fn mark_consumed(&self, envelope_id: Uuid) -> ChatResult<bool>;

    /// Alle Umschlaege einer Gruppe (konsumiert oder nicht)
    async fn group_envelopes(&self, group_id: &str) -> ChatResult<Vec<KeyEnvelope>>;
}

#[derive(Debug, Default)]
struct GruppenDokument {
    members: Vec<String>,
    encryption_enabled: bool,
}

#[derive(Debug)]
struct UmschlagDokument {
    id: Uuid,
    group_id: String,
    recipient_id: String,
    json: String,
    consumed: bool,
}

#[derive(Debug, Default)]
struct Inhalt {
    groups: HashMap<String, GruppenDokument>,
    public_keys: HashMap<String, PublicKey>,
    envelopes: Vec<UmschlagDokument>,
}

/// In-Memory Remote-Store mit Offline-Schalter fuer Fehler-Injektion
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inhalt: Mutex<Inhalt>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Legt eine Gruppe mit Mitgliedern an (Verschluesselung aus)
    pub fn add_group(&self, group_id: &str, members: &[&str]) {
        let mut inhalt = self.inhalt.lock();
        let gruppe = inhalt.groups.entry(group_id.to_string()).or_default();
        gruppe.members = members.iter().map(|m| m.to_string()).collect();
    }

    /// Fuegt ein Mitglied zu einer Gruppe hinzu
    pub fn add_member(&self, group_id: &str, member_id: &str) {
        let mut inhalt = self.inhalt.lock();
        let gruppe = inhalt.groups.entry(group_id.to_string()).or_default();
        if !gruppe.members.iter().any(|m| m == member_id) {
            gruppe.members.push(member_id.to_string());
        }
    }

    /// Simuliert einen nicht erreichbaren Store
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Anzahl aller Umschlaege (fuer Tests)
    pub fn envelope_count(&self) -> usize {
        self.inhalt.lock().envelopes.len()
    }

    /// Alle Umschlaege an einen Empfaenger, inkl. konsumierter
    pub fn envelopes_for(&self, recipient_id: &str) -> Vec<KeyEnvelope> {
        self.inhalt
            .lock()
            .envelopes
            .iter()
            .filter(|e| e.recipient_id == recipient_id)
            .filter_map(|e| serde_json::from_str(&e.json).ok())
            .collect()
    }

    pub fn is_consumed(&self, envelope_id: Uuid) -> bool {
        self.inhalt
            .lock()
            .envelopes
            .iter()
            .any(|e| e.id == envelope_id && e.consumed)
    }

    fn verbindung_pruefen(&self) -> ChatResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChatError::StoreUnavailable("Store offline".into()));
        }
        Ok(())
    }
}

/// Parst ein Umschlag-Dokument, beschaedigte Dokumente werden uebersprungen
fn dokument_parsen(dokument: &UmschlagDokument) -> Option<KeyEnvelope> {
    match serde_json::from_str(&dokument.json) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            tracing::warn!(envelope_id = %dokument.id, "Umschlag-Dokument unlesbar: {}", e);
            None
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn encryption_enabled(&self, group_id: &str) -> ChatResult<bool> {
        self.verbindung_pruefen()?;
        Ok(self
            .inhalt
            .lock()
            .groups
            .get(group_id)
            .map(|g| g.encryption_enabled)
            .unwrap_or(false))
    }

    async fn try_enable_encryption(&self, group_id: &str) -> ChatResult<bool> {
        self.verbindung_pruefen()?;
        let mut inhalt = self.inhalt.lock();
        let gruppe = inhalt.groups.entry(group_id.to_string()).or_default();
        if gruppe.encryption_enabled {
            return Ok(false);
        }
        gruppe.encryption_enabled = true;
        Ok(true)
    }

    async fn group_members(&self, group_id: &str) -> ChatResult<Vec<String>> {
        self.verbindung_pruefen()?;
        Ok(self
            .inhalt
            .lock()
            .groups
            .get(group_id)
            .map(|g| g.members.clone())
            .unwrap_or_default())
    }

    async fn public_key(&self, user_id: &str) -> ChatResult<Option<PublicKey>> {
        self.verbindung_pruefen()?;
        Ok(self.inhalt.lock().public_keys.get(user_id).copied())
    }

    async fn publish_public_key(&self, user_id: &str, key: &PublicKey) -> ChatResult<()> {
        self.verbindung_pruefen()?;
        self.inhalt
            .lock()
            .public_keys
            .insert(user_id.to_string(), *key);
        Ok(())
    }

    async fn append_envelope(&self, envelope: &KeyEnvelope) -> ChatResult<()> {
        self.verbindung_pruefen()?;
        let json = serde_json::to_string(envelope)
            .map_err(|e| ChatError::StoreUnavailable(format!("Serialisierung: {e}")))?;
        self.inhalt.lock().envelopes.push(UmschlagDokument {
            id: envelope.id,
            group_id: envelope.group_id.clone(),
            recipient_id: envelope.recipient_id.clone(),
            json,
            consumed: false,
        });
        Ok(())
    }

    async fn pending_envelopes(&self, recipient_id: &str) -> ChatResult<Vec<KeyEnvelope>> {
        self.verbindung_pruefen()?;
        Ok(self
            .inhalt
            .lock()
            .envelopes
            .iter()
            .filter(|e| e.recipient_id == recipient_id && !e.consumed)
            .filter_map(dokument_parsen)
            .collect())
    }

    async fn mark_consumed(&self, envelope_id: Uuid) -> ChatResult<bool> {
        self.verbindung_pruefen()?;
        let mut inhalt = self.inhalt.lock();
        match inhalt.envelopes.iter_mut().find(|e| e.id == envelope_id) {
            Some(dokument) if !dokument.consumed => {
                dokument.consumed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn group_envelopes(&self, group_id: &str) -> ChatResult<Vec<KeyEnvelope>> {
        self.verbindung_pruefen()?;
        Ok(self
            .inhalt
            .lock()
            .envelopes
            .iter()
            .filter(|e| e.group_id == group_id)
            .filter_map(dokument_parsen)
            .collect())
    }
}
