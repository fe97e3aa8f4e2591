//! Tests fuer den Hintergrund-Poller

use std::sync::Arc;
use std::time::Duration;

use super::{geraet, store_mit_gruppe, warten_bis, GRUPPE};
use crate::poller::spawn_exchange_poller;

#[tokio::test]
async fn test_poller_empfaengt_schluessel() {
    let remote = store_mit_gruppe(&["alice", "bob"]);
    let alice = geraet(&remote, "alice");
    let bob = geraet(&remote, "bob");
    bob.coordinator.register_identity("bob").await.unwrap();

    let handle = spawn_exchange_poller(
        Arc::clone(bob.coordinator.exchange()),
        "bob".to_string(),
        Duration::from_millis(10),
    );

    alice.bootstrap().await;
    assert!(warten_bis(|| bob.hat_schluessel()).await);
    assert!(bob.schluessel().same_key(&alice.schluessel()));

    handle.abort();
}

#[tokio::test]
async fn test_poller_laeuft_nach_store_ausfall_weiter() {
    let remote = store_mit_gruppe(&["alice", "bob"]);
    let alice = geraet(&remote, "alice");
    let bob = geraet(&remote, "bob");
    bob.coordinator.register_identity("bob").await.unwrap();

    remote.set_offline(true);
    let handle = spawn_exchange_poller(
        Arc::clone(bob.coordinator.exchange()),
        "bob".to_string(),
        Duration::from_millis(10),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());

    remote.set_offline(false);
    alice.bootstrap().await;
    assert!(warten_bis(|| bob.hat_schluessel()).await);

    handle.abort();
    let ergebnis = handle.await;
    assert!(ergebnis.unwrap_err().is_cancelled());
}
