//! Gruppen-Verschluesselungs-Koordinator
//!
//! Zustandsmaschine pro (Benutzer, Gruppe), abgeleitet aus dem Remote-Flag
//! `encryptionEnabled` und dem lokalen Gruppen-Schluessel:
//!
//! ```text
//! Disabled ──(Flag-Gewinner)──> EnabledWithLocalKey
//! Disabled ──(Flag verloren)──> EnabledNoLocalKey ──(Umschlag)──> EnabledWithLocalKey
//! ```
//!
//! Parallele Aufrufe fuer dieselbe Gruppe auf demselben Geraet werden ueber
//! eine asynchrone Sperre pro Gruppe serialisiert.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use groop_crypto::{GroupKeyStore, IdentityKeyPair, IdentityKeyStore, SecureStorage};

use crate::config::E2eConfig;
use crate::error::{ChatError, ChatResult};
use crate::exchange::KeyExchangeProtocol;
use crate::store::RemoteStore;
use crate::types::{BootstrapReport, GroupEncryptionState, RecipientShare, ShareOutcome};

pub struct GroupEncryptionCoordinator<R: RemoteStore + 'static, S: SecureStorage + 'static> {
    remote: Arc<R>,
    identities: Arc<IdentityKeyStore<S>>,
    group_keys: Arc<GroupKeyStore<S>>,
    exchange: Arc<KeyExchangeProtocol<R, S>>,
    config: E2eConfig,
    bootstrap_sperren: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl<R: RemoteStore + 'static, S: SecureStorage + 'static> GroupEncryptionCoordinator<R, S> {
    /// Erstellt den Koordinator; Identitaeten und Gruppen-Schluessel teilen
    /// sich den lokalen sicheren Speicher `storage`.
    pub fn new(remote: Arc<R>, storage: Arc<S>, config: E2eConfig) -> Self {
        let identities = Arc::new(IdentityKeyStore::new(Arc::clone(&storage)));
        let group_keys = Arc::new(GroupKeyStore::new(storage));
        let exchange = Arc::new(KeyExchangeProtocol::new(
            Arc::clone(&remote),
            Arc::clone(&identities),
            Arc::clone(&group_keys),
        ));
        Self {
            remote,
            identities,
            group_keys,
            exchange,
            config,
            bootstrap_sperren: DashMap::new(),
        }
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn identities(&self) -> &Arc<IdentityKeyStore<S>> {
        &self.identities
    }

    pub fn group_keys(&self) -> &Arc<GroupKeyStore<S>> {
        &self.group_keys
    }

    /// Austausch-Protokoll (z.B. fuer den Hintergrund-Poller)
    pub fn exchange(&self) -> &Arc<KeyExchangeProtocol<R, S>> {
        &self.exchange
    }

    pub fn config(&self) -> &E2eConfig {
        &self.config
    }

    /// Stellt die Identitaet sicher und veroeffentlicht den oeffentlichen Schluessel
    pub async fn register_identity(&self, user_id: &str) -> ChatResult<IdentityKeyPair> {
        let key_pair = self.identities.ensure_key_pair(user_id)?;
        let veroeffentlicht = self.remote.public_key(user_id).await?;
        if veroeffentlicht != Some(key_pair.public_key) {
            self.remote
                .publish_public_key(user_id, &key_pair.public_key)
                .await?;
            tracing::info!(user_id = %user_id, "Oeffentlicher Schluessel veroeffentlicht");
        }
        Ok(key_pair)
    }

    /// Aktueller Zustand aus Remote-Flag und lokalem Schluessel
    pub async fn state(&self, group_id: &str, user_id: &str) -> ChatResult<GroupEncryptionState> {
        let enabled = self.remote.encryption_enabled(group_id).await?;
        let state = GroupEncryptionState::from_facts(enabled, self.group_keys.has_key(group_id));
        tracing::trace!(group_id = %group_id, user_id = %user_id, ?state, "Zustand ermittelt");
        Ok(state)
    }

    /// Richtet die Verschluesselung der Gruppe ein oder holt den Schluessel nach.
    ///
    /// Wird beim Oeffnen eines Chats aufgerufen und ist idempotent.
    pub async fn bootstrap_if_needed(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> ChatResult<BootstrapReport> {
        let sperre = self.bootstrap_sperre(group_id);
        let _guard = sperre.lock().await;

        let enabled = self.remote.encryption_enabled(group_id).await?;
        if enabled {
            if self.group_keys.has_key(group_id) {
                if !self.group_keys.is_confirmed(group_id)? {
                    return self.unbestaetigten_schluessel_klaeren(group_id, user_id).await;
                }
                return Ok(self.bereits_eingerichtet(group_id, user_id).await);
            }
            return self.schluessel_nachholen(group_id, user_id).await;
        }

        self.einrichten(group_id, user_id).await
    }

    /// Versorgt ein neu beigetretenes Mitglied mit dem lokalen Gruppen-Schluessel
    pub async fn admit_member(
        &self,
        group_id: &str,
        user_id: &str,
        member_id: &str,
    ) -> ChatResult<ShareOutcome> {
        if member_id == user_id {
            return Ok(ShareOutcome::AlreadyShared);
        }
        let sender = self.identities.ensure_key_pair(user_id)?;
        let shares = self
            .exchange
            .share_with_members(group_id, &sender, &[member_id.to_string()], true)
            .await?;
        Ok(shares
            .into_iter()
            .next()
            .map(|s| s.outcome)
            .unwrap_or(ShareOutcome::AlreadyShared))
    }

    /// Teilt den Schluessel mit allen Mitgliedern, die fuer ihre aktuelle
    /// Identitaet noch keinen Umschlag haben.
    pub async fn resume_sharing(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> ChatResult<Vec<RecipientShare>> {
        let sender = self.identities.ensure_key_pair(user_id)?;
        let members = self.remote.group_members(group_id).await?;
        self.exchange
            .share_with_members(group_id, &sender, &members, true)
            .await
    }

    fn bootstrap_sperre(&self, group_id: &str) -> Arc<AsyncMutex<()>> {
        // Arc klonen, DashMap-Referenz vor dem await freigeben
        Arc::clone(
            self.bootstrap_sperren
                .entry(group_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .value(),
        )
    }

    /// Flag gesetzt, Schluessel vorhanden: keine Neuerzeugung
    async fn bereits_eingerichtet(&self, group_id: &str, user_id: &str) -> BootstrapReport {
        let mut report = BootstrapReport::new(group_id, GroupEncryptionState::EnabledWithLocalKey);
        if !self.config.austausch.fehlende_mitglieder_versorgen {
            return report;
        }
        match self.resume_sharing(group_id, user_id).await {
            Ok(shares) => report.shares = shares,
            Err(e) => tracing::warn!(
                group_id = %group_id,
                "Nachversorgung fehlender Mitglieder fehlgeschlagen: {}",
                e
            ),
        }
        report
    }

    /// Flag gesetzt, kein Schluessel: offene Umschlaege abarbeiten
    async fn schluessel_nachholen(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> ChatResult<BootstrapReport> {
        self.register_identity(user_id).await?;
        let exchanges = self.exchange.process_pending_exchanges(user_id).await?;
        let state = GroupEncryptionState::from_facts(true, self.group_keys.has_key(group_id));
        if state == GroupEncryptionState::EnabledNoLocalKey {
            tracing::info!(
                group_id = %group_id,
                user_id = %user_id,
                "Gruppe verschluesselt, Schluessel noch nicht erhalten"
            );
        }
        let mut report = BootstrapReport::new(group_id, state);
        report.exchanges = Some(exchanges);
        Ok(report)
    }

    /// Flag gesetzt, der lokale Schluessel stammt aber aus einem Aktivierungsversuch
    /// ohne bestaetigtes Ergebnis.
    ///
    /// Ein empfangener Schluessel ersetzt ihn. Hat ein anderes Mitglied bereits
    /// verteilt, ist er verwaist und wird verworfen; sonst hat der eigene
    /// Versuch das Flag gesetzt und der Schluessel wird uebernommen.
    async fn unbestaetigten_schluessel_klaeren(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> ChatResult<BootstrapReport> {
        let sender = self.register_identity(user_id).await?;
        let exchanges = self.exchange.process_pending_exchanges(user_id).await?;

        if self.group_keys.is_confirmed(group_id)? {
            let mut report = self.bereits_eingerichtet(group_id, user_id).await;
            report.exchanges = Some(exchanges);
            return Ok(report);
        }

        let fremd_verteilt = self
            .remote
            .group_envelopes(group_id)
            .await?
            .iter()
            .any(|e| e.sender_id != user_id);
        if fremd_verteilt {
            tracing::warn!(
                group_id = %group_id,
                user_id = %user_id,
                "Verwaister Gruppen-Schluessel verworfen, warte auf Umschlag"
            );
            self.group_keys.remove(group_id)?;
            let mut report = BootstrapReport::new(group_id, GroupEncryptionState::EnabledNoLocalKey);
            report.exchanges = Some(exchanges);
            return Ok(report);
        }

        tracing::info!(
            group_id = %group_id,
            user_id = %user_id,
            "Flag stammt vom eigenen Aktivierungsversuch, lokaler Schluessel bestaetigt"
        );
        self.group_keys.confirm(group_id)?;
        let members = self.remote.group_members(group_id).await?;
        let mut report = BootstrapReport::new(group_id, GroupEncryptionState::EnabledWithLocalKey);
        report.shares = self.verteilen_im_hintergrund(group_id, sender, members).await?;
        report.exchanges = Some(exchanges);
        Ok(report)
    }

    /// Flag nicht gesetzt: Schluessel erzeugen und das Flag atomar setzen
    async fn einrichten(&self, group_id: &str, user_id: &str) -> ChatResult<BootstrapReport> {
        let sender = self.register_identity(user_id).await?;

        let generated_key = !self.group_keys.has_key(group_id);
        if generated_key {
            self.group_keys.generate_unconfirmed(group_id)?;
        }

        // Bei Store-Fehler bleibt der lokale Schluessel unbestaetigt erhalten
        let gewonnen = self.remote.try_enable_encryption(group_id).await?;
        if !gewonnen {
            if generated_key {
                tracing::info!(
                    group_id = %group_id,
                    user_id = %user_id,
                    "Verschluesselung wurde parallel eingerichtet, lokaler Schluessel verworfen"
                );
                self.group_keys.remove(group_id)?;
                return self.schluessel_nachholen(group_id, user_id).await;
            }
            if !self.group_keys.is_confirmed(group_id)? {
                return self.unbestaetigten_schluessel_klaeren(group_id, user_id).await;
            }
            // Veraltetes Flag gelesen, der vorhandene Schluessel ist gueltig
            tracing::debug!(group_id = %group_id, "Flag bereits gesetzt, Schluessel bleibt");
            return Ok(self.bereits_eingerichtet(group_id, user_id).await);
        }
        self.group_keys.confirm(group_id)?;

        tracing::info!(
            group_id = %group_id,
            user_id = %user_id,
            generated_key,
            "Verschluesselung fuer Gruppe aktiviert"
        );

        let members = self.remote.group_members(group_id).await?;
        let shares = self.verteilen_im_hintergrund(group_id, sender, members).await?;

        let mut report = BootstrapReport::new(group_id, GroupEncryptionState::EnabledWithLocalKey);
        report.generated_key = generated_key;
        report.shares = shares;
        Ok(report)
    }

    /// Verteilung in eigenem Task: ein abgebrochener Aufrufer bricht die
    /// teilweise erfolgte Verteilung nicht ab.
    async fn verteilen_im_hintergrund(
        &self,
        group_id: &str,
        sender: IdentityKeyPair,
        members: Vec<String>,
    ) -> ChatResult<Vec<RecipientShare>> {
        let exchange = Arc::clone(&self.exchange);
        let group_id = group_id.to_string();
        let handle = tokio::spawn(async move {
            exchange
                .share_with_members(&group_id, &sender, &members, false)
                .await
        });
        handle
            .await
            .map_err(|e| ChatError::Hintergrund(e.to_string()))?
    }
}
