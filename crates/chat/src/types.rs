//! Oeffentliche Typen fuer Verschluesselungs-Koordination und Chat-Pipeline

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Abgeleiteter Verschluesselungs-Zustand einer Gruppe aus Sicht eines Benutzers
///
/// Wird nie persistiert, sondern bei jedem Ereignis neu aus dem Remote-Flag
/// und dem lokalen Schluessel berechnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Default)]
pub enum GroupEncryptionState {
    #[default]
    Unknown,
    Disabled,
    EnabledNoLocalKey,
    EnabledWithLocalKey,
}

impl GroupEncryptionState {
    /// Zustand aus Remote-Flag und lokalem Schluessel
    pub fn from_facts(encryption_enabled: bool, has_local_key: bool) -> Self {
        match (encryption_enabled, has_local_key) {
            (false, _) => Self::Disabled,
            (true, false) => Self::EnabledNoLocalKey,
            (true, true) => Self::EnabledWithLocalKey,
        }
    }

    /// Gibt `true` zurueck wenn ausgehende Nachrichten verschluesselt werden koennen
    pub fn can_encrypt(&self) -> bool {
        matches!(self, Self::EnabledWithLocalKey)
    }
}

/// Nachrichten-Payload wie im Remote-Store abgelegt
///
/// `{ "text": base64(nonce ‖ ciphertext) | klartext, "isEncrypted": bool }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub text: String,
    pub is_encrypted: bool,
}

impl MessagePayload {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_encrypted: false,
        }
    }

    pub fn encrypted(ciphertext: impl Into<String>) -> Self {
        Self {
            text: ciphertext.into(),
            is_encrypted: true,
        }
    }
}

/// Ergebnis der Entschluesselung einer eingehenden Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptStatus {
    /// Unverschluesselte Nachricht
    Plaintext,
    Decrypted,
    /// Kein lokaler Gruppen-Schluessel
    MissingKey,
    /// Auth-Tag ungueltig, falscher Schluessel oder beschaedigte Daten
    Failed,
}

/// Nachricht wie sie der UI uebergeben wird
///
/// `is_encrypted && !is_decrypted` ist der kanonische "nicht anzeigbar"-Zustand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMessage {
    pub text: String,
    pub is_encrypted: bool,
    pub is_decrypted: bool,
    pub status: DecryptStatus,
}

/// Ergebnis der Schluessel-Verteilung an ein einzelnes Mitglied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared { envelope_id: Uuid },
    /// Das Mitglied hat noch keinen oeffentlichen Schluessel veroeffentlicht
    NoPublicKey,
    /// Hat bereits einen Umschlag fuer seine aktuelle Identitaet
    AlreadyShared,
    Failed { reason: String, retryable: bool },
}

/// Verteilungs-Ergebnis pro Mitglied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientShare {
    pub member_id: String,
    pub outcome: ShareOutcome,
}

impl RecipientShare {
    pub fn is_shared(&self) -> bool {
        matches!(self.outcome, ShareOutcome::Shared { .. })
    }
}

/// Fehlgeschlagener Umschlag beim Abarbeiten der Warteschlange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeFailure {
    pub envelope_id: Uuid,
    pub group_id: String,
    pub reason: String,
}

/// Ergebnis von `process_pending_exchanges`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeReport {
    /// Neu konsumierte Umschlaege
    pub processed: usize,
    /// Umschlaege, die parallel bereits konsumiert wurden
    pub already_consumed: usize,
    pub failures: Vec<EnvelopeFailure>,
    /// Frueher endgueltig abgelehnte Umschlaege, die nicht erneut geoeffnet wurden
    pub skipped: usize,
}

/// Ergebnis von `bootstrap_if_needed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub group_id: String,
    pub state: GroupEncryptionState,
    /// Dieses Geraet hat den Gruppen-Schluessel erzeugt
    pub generated_key: bool,
    pub shares: Vec<RecipientShare>,
    pub exchanges: Option<ExchangeReport>,
}

impl BootstrapReport {
    pub(crate) fn new(group_id: &str, state: GroupEncryptionState) -> Self {
        Self {
            group_id: group_id.to_string(),
            state,
            generated_key: false,
            shares: Vec::new(),
            exchanges: None,
        }
    }

    /// "Noch kein lokaler Schluessel" - fuer die UI, kein Fehler
    pub fn awaiting_key(&self) -> bool {
        self.state == GroupEncryptionState::EnabledNoLocalKey
    }

    /// Mitglieder, an die nicht verteilt werden konnte
    pub fn failed_shares(&self) -> impl Iterator<Item = &RecipientShare> {
        self.shares
            .iter()
            .filter(|s| matches!(s.outcome, ShareOutcome::Failed { .. }))
    }
}
