//! Tests fuer Koordinator, Austausch, Pipeline und Poller
//!
//! Jedes simulierte Geraet hat einen eigenen `MemoryStorage`, alle Geraete
//! teilen sich einen `InMemoryStore` als Remote-Store.

mod poller_tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use groop_crypto::{GroupKey, KeyEnvelope, MemoryStorage, PublicKey};

use crate::{
    config::E2eConfig,
    coordinator::GroupEncryptionCoordinator,
    error::{ChatError, ChatResult},
    pipeline::ChatPipeline,
    store::{InMemoryStore, RemoteStore},
};

pub(crate) const GRUPPE: &str = "trip-lissabon";

/// Ein Geraet eines Benutzers
pub(crate) struct Geraet<R: RemoteStore + 'static> {
    pub user_id: String,
    pub coordinator: Arc<GroupEncryptionCoordinator<R, MemoryStorage>>,
    pub pipeline: ChatPipeline<R, MemoryStorage>,
}

impl<R: RemoteStore + 'static> Geraet<R> {
    pub async fn bootstrap(&self) -> crate::types::BootstrapReport {
        self.coordinator
            .bootstrap_if_needed(GRUPPE, &self.user_id)
            .await
            .expect("Bootstrap fehlgeschlagen")
    }

    pub fn schluessel(&self) -> GroupKey {
        self.coordinator
            .group_keys()
            .get(GRUPPE)
            .expect("Kein Gruppen-Schluessel")
    }

    pub fn hat_schluessel(&self) -> bool {
        self.coordinator.group_keys().has_key(GRUPPE)
    }
}

pub(crate) fn geraet<R: RemoteStore + 'static>(remote: &Arc<R>, user_id: &str) -> Geraet<R> {
    geraet_mit_config(remote, user_id, E2eConfig::default())
}

pub(crate) fn geraet_mit_config<R: RemoteStore + 'static>(
    remote: &Arc<R>,
    user_id: &str,
    config: E2eConfig,
) -> Geraet<R> {
    geraet_mit_speicher(remote, user_id, config, Arc::new(MemoryStorage::new()))
}

/// Geraet mit vorgegebenem lokalem Speicher (z.B. fuer beschaedigte Eintraege)
pub(crate) fn geraet_mit_speicher<R: RemoteStore + 'static>(
    remote: &Arc<R>,
    user_id: &str,
    config: E2eConfig,
    speicher: Arc<MemoryStorage>,
) -> Geraet<R> {
    let coordinator = Arc::new(GroupEncryptionCoordinator::new(
        Arc::clone(remote),
        speicher,
        config,
    ));
    Geraet {
        user_id: user_id.to_string(),
        pipeline: ChatPipeline::new(Arc::clone(&coordinator)),
        coordinator,
    }
}

/// Store mit Gruppe `GRUPPE` und den angegebenen Mitgliedern
pub(crate) fn store_mit_gruppe(mitglieder: &[&str]) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.add_group(GRUPPE, mitglieder);
    store
}

/// Wartet bis `bedingung` erfuellt ist (maximal 2 Sekunden)
pub(crate) async fn warten_bis(mut bedingung: impl FnMut() -> bool) -> bool {
    let ergebnis = tokio::time::timeout(Duration::from_secs(2), async {
        while !bedingung() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    ergebnis.is_ok()
}

/// Remote-Store mit Fehler-Injektion fuer Wettlauf- und Ausfall-Szenarien
pub(crate) struct GestoerterStore {
    pub inner: Arc<InMemoryStore>,
    /// `encryption_enabled` liefert immer `false` (veralteter Lesezugriff)
    pub veraltetes_flag: AtomicBool,
    /// `try_enable_encryption` schlaegt mit `StoreUnavailable` fehl
    pub aktivierung_fehlschlagen: AtomicBool,
}

impl GestoerterStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            veraltetes_flag: AtomicBool::new(false),
            aktivierung_fehlschlagen: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl RemoteStore for GestoerterStore {
    async fn encryption_enabled(&self, group_id: &str) -> ChatResult<bool> {
        if self.veraltetes_flag.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.encryption_enabled(group_id).await
    }

    async fn try_enable_encryption(&self, group_id: &str) -> ChatResult<bool> {
        if self.aktivierung_fehlschlagen.load(Ordering::SeqCst) {
            return Err(ChatError::StoreUnavailable("Zeitueberschreitung".into()));
        }
        self.inner.try_enable_encryption(group_id).await
    }

    async fn group_members(&self, group_id: &str) -> ChatResult<Vec<String>> {
        self.inner.group_members(group_id).await
    }

    async fn public_key(&self, user_id: &str) -> ChatResult<Option<PublicKey>> {
        self.inner.public_key(user_id).await
    }

    async fn publish_public_key(&self, user_id: &str, key: &PublicKey) -> ChatResult<()> {
        self.inner.publish_public_key(user_id, key).await
    }

    async fn append_envelope(&self, envelope: &KeyEnvelope) -> ChatResult<()> {
        self.inner.append_envelope(envelope).await
    }

    async fn pending_envelopes(&self, recipient_id: &str) -> ChatResult<Vec<KeyEnvelope>> {
        self.inner.pending_envelopes(recipient_id).await
    }

    async fn mark_consumed(&self, envelope_id: Uuid) -> ChatResult<bool> {
        self.inner.mark_consumed(envelope_id).await
    }

    async fn group_envelopes(&self, group_id: &str) -> ChatResult<Vec<KeyEnvelope>> {
        self.inner.group_envelopes(group_id).await
    }
}
