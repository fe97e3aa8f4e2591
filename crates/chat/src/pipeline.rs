//! Chat-Pipeline: Verschluesselung ausgehender und Entschluesselung
//! eingehender Nachrichten
//!
//! Eingehende Nachrichten werden nie mit einem Fehler abgelehnt: fehlt der
//! Schluessel oder schlaegt die Authentifizierung fehl, erhaelt die UI einen
//! Platzhalter mit `is_encrypted && !is_decrypted`.

use std::sync::Arc;

use groop_crypto::{
    decrypt_message_text, encrypt_message_text, CryptoError, CryptoResult, GroupKey,
    SecureStorage,
};

use crate::config::AnzeigeEinstellungen;
use crate::coordinator::GroupEncryptionCoordinator;
use crate::error::{ChatError, ChatResult};
use crate::store::RemoteStore;
use crate::types::{DecryptStatus, DisplayMessage, GroupEncryptionState, MessagePayload};

pub struct ChatPipeline<R: RemoteStore + 'static, S: SecureStorage + 'static> {
    coordinator: Arc<GroupEncryptionCoordinator<R, S>>,
    anzeige: AnzeigeEinstellungen,
}

impl<R: RemoteStore + 'static, S: SecureStorage + 'static> ChatPipeline<R, S> {
    pub fn new(coordinator: Arc<GroupEncryptionCoordinator<R, S>>) -> Self {
        let anzeige = coordinator.config().anzeige.clone();
        Self {
            coordinator,
            anzeige,
        }
    }

    pub fn coordinator(&self) -> &Arc<GroupEncryptionCoordinator<R, S>> {
        &self.coordinator
    }

    /// Bereitet eine ausgehende Nachricht vor
    ///
    /// Verschluesselt wenn die Gruppe verschluesselt ist und der Schluessel
    /// lokal vorliegt, sonst Klartext mit `isEncrypted = false`.
    pub async fn prepare_outgoing(
        &self,
        group_id: &str,
        user_id: &str,
        text: &str,
    ) -> ChatResult<MessagePayload> {
        let state = match self.coordinator.state(group_id, user_id).await {
            Ok(state) => state,
            // Zustand unbekannt: ein vorhandener Schluessel wird trotzdem verwendet
            Err(e) if self.coordinator.group_keys().has_key(group_id) => {
                tracing::warn!(
                    group_id = %group_id,
                    "Zustand nicht ermittelbar, verschluessele mit lokalem Schluessel: {}",
                    e
                );
                GroupEncryptionState::EnabledWithLocalKey
            }
            Err(e) => return Err(e),
        };

        match state {
            GroupEncryptionState::EnabledWithLocalKey => {
                let key = self.coordinator.group_keys().get(group_id)?;
                let ciphertext = encrypt_message_text(text, &key)?;
                Ok(MessagePayload::encrypted(ciphertext))
            }
            GroupEncryptionState::EnabledNoLocalKey => {
                if !self.anzeige.klartext_ohne_schluessel {
                    return Err(ChatError::EncryptionNotReady {
                        group_id: group_id.to_string(),
                    });
                }
                tracing::warn!(
                    group_id = %group_id,
                    "Gruppe verschluesselt, aber kein lokaler Schluessel - sende Klartext"
                );
                Ok(MessagePayload::plain(text))
            }
            GroupEncryptionState::Disabled | GroupEncryptionState::Unknown => {
                Ok(MessagePayload::plain(text))
            }
        }
    }

    /// Bereitet eine eingehende Nachricht fuer die Anzeige auf
    pub fn process_incoming(&self, group_id: &str, payload: &MessagePayload) -> DisplayMessage {
        let key = self.lokaler_schluessel(group_id, payload.is_encrypted);
        self.aufbereiten(group_id, payload, &key)
    }

    /// Wie `process_incoming`, der Schluessel wird nur einmal geladen
    pub fn process_incoming_batch(
        &self,
        group_id: &str,
        payloads: &[MessagePayload],
    ) -> Vec<DisplayMessage> {
        let verschluesselt = payloads.iter().any(|p| p.is_encrypted);
        let key = self.lokaler_schluessel(group_id, verschluesselt);
        payloads
            .iter()
            .map(|p| self.aufbereiten(group_id, p, &key))
            .collect()
    }

    fn lokaler_schluessel(&self, group_id: &str, benoetigt: bool) -> CryptoResult<GroupKey> {
        if !benoetigt {
            return Err(CryptoError::NoGroupKeyLocally {
                group_id: group_id.to_string(),
            });
        }
        self.coordinator.group_keys().get(group_id)
    }

    fn aufbereiten(
        &self,
        group_id: &str,
        payload: &MessagePayload,
        key: &CryptoResult<GroupKey>,
    ) -> DisplayMessage {
        if !payload.is_encrypted {
            return DisplayMessage {
                text: payload.text.clone(),
                is_encrypted: false,
                is_decrypted: false,
                status: DecryptStatus::Plaintext,
            };
        }

        let result = match key {
            Ok(key) => decrypt_message_text(&payload.text, key),
            Err(CryptoError::NoGroupKeyLocally { .. }) => {
                return self.platzhalter(DecryptStatus::MissingKey);
            }
            Err(e) => {
                tracing::warn!(group_id = %group_id, "Lokaler Gruppen-Schluessel unbrauchbar: {}", e);
                return self.platzhalter(DecryptStatus::Failed);
            }
        };

        match result {
            Ok(text) => DisplayMessage {
                text,
                is_encrypted: true,
                is_decrypted: true,
                status: DecryptStatus::Decrypted,
            },
            Err(e) => {
                tracing::warn!(group_id = %group_id, "Nachricht nicht entschluesselbar: {}", e);
                self.platzhalter(DecryptStatus::Failed)
            }
        }
    }

    fn platzhalter(&self, status: DecryptStatus) -> DisplayMessage {
        let text = match status {
            DecryptStatus::MissingKey => &self.anzeige.platzhalter_kein_schluessel,
            _ => &self.anzeige.platzhalter_fehlgeschlagen,
        };
        DisplayMessage {
            text: text.clone(),
            is_encrypted: true,
            is_decrypted: false,
            status,
        }
    }
}
