//! Schluessel-Austausch ueber den Remote-Store
//!
//! Verteilt den lokalen Gruppen-Schluessel per Umschlag an Mitglieder und
//! arbeitet die Warteschlange der an den lokalen Benutzer adressierten
//! Umschlaege ab. Wird sowohl beim Oeffnen des Chats als auch periodisch
//! aufgerufen; wiederholte oder ueberlappende Aufrufe sind unkritisch.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashSet;
use uuid::Uuid;

use groop_crypto::{
    receive_group_key, share_group_key, CryptoError, GroupKeyStore, IdentityKeyPair,
    IdentityKeyStore, KeyEnvelope, PublicKey, SecureStorage,
};

use crate::error::{ChatError, ChatResult};
use crate::store::RemoteStore;
use crate::types::{EnvelopeFailure, ExchangeReport, RecipientShare, ShareOutcome};

/// Asynchroner Teil des Schluessel-Austauschs
pub struct KeyExchangeProtocol<R: RemoteStore, S: SecureStorage> {
    remote: Arc<R>,
    identities: Arc<IdentityKeyStore<S>>,
    group_keys: Arc<GroupKeyStore<S>>,
    /// Umschlaege, die sich mit der aktuellen Identitaet nie oeffnen lassen
    abgelehnt: DashSet<Uuid>,
}

impl<R: RemoteStore, S: SecureStorage> KeyExchangeProtocol<R, S> {
    pub fn new(
        remote: Arc<R>,
        identities: Arc<IdentityKeyStore<S>>,
        group_keys: Arc<GroupKeyStore<S>>,
    ) -> Self {
        Self {
            remote,
            identities,
            group_keys,
            abgelehnt: DashSet::new(),
        }
    }

    /// Versiegelt den lokalen Gruppen-Schluessel fuer ein Mitglied und legt
    /// den Umschlag im Remote-Store ab.
    pub async fn share_group_key(
        &self,
        group_id: &str,
        sender_id: &str,
        recipient_id: &str,
    ) -> ChatResult<KeyEnvelope> {
        let sender = self.identities.ensure_key_pair(sender_id)?;
        let recipient_key = self.remote.public_key(recipient_id).await?.ok_or_else(|| {
            ChatError::PublicKeyNotFound {
                user_id: recipient_id.to_string(),
            }
        })?;
        self.seal_and_append(group_id, &sender, recipient_id, &recipient_key)
            .await
    }

    /// Verteilt an mehrere Mitglieder; jedes Mitglied bekommt sein eigenes Ergebnis.
    ///
    /// `skip_served`: Mitglieder mit einem Umschlag fuer ihre aktuelle
    /// Identitaet werden uebersprungen (Fortsetzen einer abgebrochenen Verteilung).
    pub async fn share_with_members(
        &self,
        group_id: &str,
        sender: &IdentityKeyPair,
        members: &[String],
        skip_served: bool,
    ) -> ChatResult<Vec<RecipientShare>> {
        if !self.group_keys.has_key(group_id) {
            return Err(CryptoError::NoGroupKeyLocally {
                group_id: group_id.to_string(),
            }
            .into());
        }

        let served: HashSet<(String, PublicKey)> = if skip_served {
            self.remote
                .group_envelopes(group_id)
                .await?
                .into_iter()
                .map(|e| (e.recipient_id, e.recipient_public_key))
                .collect()
        } else {
            HashSet::new()
        };

        let mut shares = Vec::with_capacity(members.len());
        for member_id in members.iter().filter(|m| **m != sender.user_id) {
            let outcome = self
                .share_with_member(group_id, sender, member_id, &served)
                .await;
            match &outcome {
                ShareOutcome::Shared { .. } => {}
                ShareOutcome::NoPublicKey => tracing::info!(
                    group_id = %group_id,
                    member_id = %member_id,
                    "Mitglied hat noch keinen oeffentlichen Schluessel"
                ),
                ShareOutcome::AlreadyShared => {}
                ShareOutcome::Failed { reason, .. } => tracing::warn!(
                    group_id = %group_id,
                    member_id = %member_id,
                    "Schluessel-Verteilung fehlgeschlagen: {}",
                    reason
                ),
            }
            shares.push(RecipientShare {
                member_id: member_id.clone(),
                outcome,
            });
        }

        let verteilt = shares.iter().filter(|s| s.is_shared()).count();
        tracing::info!(
            group_id = %group_id,
            verteilt,
            mitglieder = shares.len(),
            "Gruppen-Schluessel verteilt"
        );
        Ok(shares)
    }

    async fn share_with_member(
        &self,
        group_id: &str,
        sender: &IdentityKeyPair,
        member_id: &str,
        served: &HashSet<(String, PublicKey)>,
    ) -> ShareOutcome {
        let recipient_key = match self.remote.public_key(member_id).await {
            Ok(Some(key)) => key,
            Ok(None) => return ShareOutcome::NoPublicKey,
            Err(e) => return fehlschlag(&e),
        };
        if served.contains(&(member_id.to_string(), recipient_key)) {
            return ShareOutcome::AlreadyShared;
        }

        match self
            .seal_and_append(group_id, sender, member_id, &recipient_key)
            .await
        {
            Ok(envelope) => ShareOutcome::Shared {
                envelope_id: envelope.id,
            },
            Err(e) => fehlschlag(&e),
        }
    }

    async fn seal_and_append(
        &self,
        group_id: &str,
        sender: &IdentityKeyPair,
        recipient_id: &str,
        recipient_key: &PublicKey,
    ) -> ChatResult<KeyEnvelope> {
        let envelope =
            share_group_key(&self.group_keys, group_id, recipient_id, recipient_key, sender)?;
        self.remote.append_envelope(&envelope).await?;
        tracing::debug!(
            group_id = %group_id,
            recipient_id = %recipient_id,
            envelope_id = %envelope.id,
            "Umschlag abgelegt"
        );
        Ok(envelope)
    }

    /// Arbeitet alle offenen Umschlaege fuer `user_id` ab.
    ///
    /// Jeder Umschlag wird unabhaengig behandelt: ein Fehler bricht die
    /// anderen nicht ab. Fehlgeschlagene Umschlaege bleiben unkonsumiert;
    /// endgueltig abgelehnte werden nur einmal gemeldet und danach als
    /// `skipped` gezaehlt.
    pub async fn process_pending_exchanges(&self, user_id: &str) -> ChatResult<ExchangeReport> {
        let mut pending = self.remote.pending_envelopes(user_id).await?;
        let mut report = ExchangeReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        let recipient = self
            .identities
            .key_pair(user_id)?
            .ok_or_else(|| CryptoError::IdentityNotFound {
                user_id: user_id.to_string(),
            })?;

        // Aelteste zuerst, damit nach einer Rotation der neueste Schluessel bleibt
        pending.sort_by_key(|e| e.created_at);

        for envelope in pending {
            if self.abgelehnt.contains(&envelope.id) {
                report.skipped += 1;
                continue;
            }
            if let Err(e) = receive_group_key(&self.group_keys, &envelope, &recipient) {
                if endgueltig_abgelehnt(&e) {
                    self.abgelehnt.insert(envelope.id);
                }
                tracing::warn!(
                    envelope_id = %envelope.id,
                    group_id = %envelope.group_id,
                    sender_id = %envelope.sender_id,
                    "Umschlag konnte nicht geoeffnet werden: {}",
                    e
                );
                report.failures.push(EnvelopeFailure {
                    envelope_id: envelope.id,
                    group_id: envelope.group_id.clone(),
                    reason: e.to_string(),
                });
                continue;
            }

            match self.remote.mark_consumed(envelope.id).await {
                Ok(true) => report.processed += 1,
                Ok(false) => report.already_consumed += 1,
                Err(e) => {
                    // Schluessel ist lokal gespeichert; der naechste Lauf konsumiert erneut
                    tracing::warn!(
                        envelope_id = %envelope.id,
                        "Umschlag konnte nicht als konsumiert markiert werden: {}",
                        e
                    );
                    report.failures.push(EnvelopeFailure {
                        envelope_id: envelope.id,
                        group_id: envelope.group_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if report.processed > 0 || !report.failures.is_empty() {
            tracing::info!(
                user_id = %user_id,
                verarbeitet = report.processed,
                fehlgeschlagen = report.failures.len(),
                "Offene Schluessel-Umschlaege abgearbeitet"
            );
        }
        Ok(report)
    }
}

/// Manipuliert oder fuer eine andere Identitaet versiegelt: ein erneuter
/// Versuch aendert nichts. Speicherfehler werden wiederholt.
fn endgueltig_abgelehnt(e: &CryptoError) -> bool {
    matches!(
        e,
        CryptoError::MalformedEnvelope(_) | CryptoError::AuthenticationFailed(_)
    )
}

fn fehlschlag(e: &ChatError) -> ShareOutcome {
    ShareOutcome::Failed {
        reason: e.to_string(),
        retryable: e.is_retryable(),
    }
}
