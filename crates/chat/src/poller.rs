//! Hintergrund-Poller fuer offene Schluessel-Umschlaege

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use groop_crypto::SecureStorage;

use crate::exchange::KeyExchangeProtocol;
use crate::store::RemoteStore;

/// Startet einen Task, der periodisch `process_pending_exchanges` aufruft.
///
/// Der erste Durchlauf erfolgt sofort. Fehler werden protokolliert, der
/// Poller laeuft weiter. Der Host bricht den Task beim Abmelden per
/// `JoinHandle::abort` ab.
pub fn spawn_exchange_poller<R, S>(
    exchange: Arc<KeyExchangeProtocol<R, S>>,
    user_id: String,
    intervall: Duration,
) -> JoinHandle<()>
where
    R: RemoteStore + 'static,
    S: SecureStorage + 'static,
{
    tokio::spawn(async move {
        tracing::debug!(user_id = %user_id, ?intervall, "Umschlag-Poller gestartet");
        loop {
            match exchange.process_pending_exchanges(&user_id).await {
                Ok(report) if report.processed > 0 => {
                    tracing::info!(
                        user_id = %user_id,
                        anzahl = report.processed,
                        "Gruppen-Schluessel empfangen"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(user_id = %user_id, "Umschlag-Abfrage fehlgeschlagen: {}", e);
                }
            }
            tokio::time::sleep(intervall).await;
        }
    })
}
