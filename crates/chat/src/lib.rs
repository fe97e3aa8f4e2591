//! groop-chat – Verschluesselungs-Koordination und Chat-Pipeline
//!
//! Dieses Crate implementiert:
//! - RemoteStore-Trait + InMemoryStore-Implementierung
//! - KeyExchangeProtocol: Schluessel verteilen, offene Umschlaege abarbeiten
//! - GroupEncryptionCoordinator: Einrichtung der Gruppen-Verschluesselung
//! - ChatPipeline: ausgehende Nachrichten verschluesseln, eingehende aufbereiten
//! - Hintergrund-Poller und Konfiguration
//!
//! # Beispiel
//!
//! ```no_run
//! use std::sync::Arc;
//! use groop_chat::{ChatPipeline, E2eConfig, GroupEncryptionCoordinator, InMemoryStore};
//! use groop_crypto::MemoryStorage;
//!
//! #[tokio::main]
//! async fn main() {
//!     let remote = Arc::new(InMemoryStore::new());
//!     remote.add_group("trip-1", &["alice", "bob"]);
//!
//!     let coordinator = Arc::new(GroupEncryptionCoordinator::new(
//!         remote,
//!         Arc::new(MemoryStorage::new()),
//!         E2eConfig::default(),
//!     ));
//!     coordinator.bootstrap_if_needed("trip-1", "alice").await.unwrap();
//!
//!     let pipeline = ChatPipeline::new(coordinator);
//!     let payload = pipeline.prepare_outgoing("trip-1", "alice", "Hallo!").await.unwrap();
//!     assert!(payload.is_encrypted);
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod exchange;
pub mod pipeline;
pub mod poller;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Bequeme Re-Exporte
pub use config::E2eConfig;
pub use coordinator::GroupEncryptionCoordinator;
pub use error::{ChatError, ChatResult};
pub use exchange::KeyExchangeProtocol;
pub use pipeline::ChatPipeline;
pub use poller::spawn_exchange_poller;
pub use store::{InMemoryStore, RemoteStore};
pub use types::{
    BootstrapReport, DecryptStatus, DisplayMessage, EnvelopeFailure, ExchangeReport,
    GroupEncryptionState, MessagePayload, RecipientShare, ShareOutcome,
};
