//! Sicherer Zufallsgenerator
//!
//! Alle Schluessel und Nonces kommen aus dem Betriebssystem-RNG (`OsRng`).
//! Vor jeder Schluessel-Generierung wird der RNG geprueft; schlaegt die
//! Pruefung fehl, wird mit `CryptoUnavailable` abgebrochen.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// Groesse der Stichproben fuer die RNG-Pruefung
const PRUEF_LAENGE: usize = 32;

/// Prueft, ob der Betriebssystem-RNG verfuegbar ist und plausible Werte liefert.
///
/// Zwei Stichproben muessen fehlerfrei gezogen werden, duerfen nicht komplett
/// aus Nullen bestehen und muessen sich unterscheiden.
pub fn verify_secure_rng() -> CryptoResult<()> {
    let mut a = [0u8; PRUEF_LAENGE];
    let mut b = [0u8; PRUEF_LAENGE];
    fill_secure(&mut a)?;
    fill_secure(&mut b)?;

    if a.iter().all(|&x| x == 0) || b.iter().all(|&x| x == 0) {
        return Err(CryptoError::CryptoUnavailable(
            "RNG liefert nur Nullen".to_string(),
        ));
    }
    if a == b {
        return Err(CryptoError::CryptoUnavailable(
            "RNG liefert identische Stichproben".to_string(),
        ));
    }
    Ok(())
}

/// Fuellt den Puffer aus dem Betriebssystem-RNG
pub fn fill_secure(buf: &mut [u8]) -> CryptoResult<()> {
    OsRng.try_fill_bytes(buf).map_err(|e| {
        tracing::error!("Betriebssystem-RNG nicht verfuegbar: {}", e);
        CryptoError::CryptoUnavailable(e.to_string())
    })
}

/// Zieht `N` zufaellige Bytes
pub fn random_array<const N: usize>() -> CryptoResult<[u8; N]> {
    let mut buf = [0u8; N];
    fill_secure(&mut buf)?;
    Ok(buf)
}

/// Zieht frisches Schluesselmaterial nach bestandener RNG-Pruefung
pub fn generate_key_material<const N: usize>() -> CryptoResult<[u8; N]> {
    verify_secure_rng()?;
    random_array()
}
