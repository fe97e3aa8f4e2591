//! E2E-Konfiguration
//!
//! Wird vom Host aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, ohne Konfigurationsdatei gilt das dokumentierte Verhalten.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use groop_crypto::FileStorage;

use crate::error::{ChatError, ChatResult};

/// Vollstaendige E2E-Konfiguration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    /// Lokaler sicherer Speicher
    pub speicher: SpeicherEinstellungen,
    /// Schluessel-Austausch
    pub austausch: AustauschEinstellungen,
    /// Darstellung nicht entschluesselbarer Nachrichten
    pub anzeige: AnzeigeEinstellungen,
    /// Logging (wird vom Host an `groop-observability` uebergeben)
    pub logging: LoggingEinstellungen,
}

/// Lokaler sicherer Speicher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeicherEinstellungen {
    /// Verzeichnis fuer `FileStorage` (eine Datei pro Schluessel)
    pub verzeichnis: PathBuf,
}

impl Default for SpeicherEinstellungen {
    fn default() -> Self {
        Self {
            verzeichnis: PathBuf::from("./data/keys"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AustauschEinstellungen {
    /// Intervall des Hintergrund-Pollers fuer offene Umschlaege
    pub poll_intervall_sekunden: u64,
    /// Beim Oeffnen einer verschluesselten Gruppe Mitglieder ohne Umschlag
    /// fuer ihre aktuelle Identitaet nachversorgen
    pub fehlende_mitglieder_versorgen: bool,
}

impl Default for AustauschEinstellungen {
    fn default() -> Self {
        Self {
            poll_intervall_sekunden: 30,
            fehlende_mitglieder_versorgen: true,
        }
    }
}

/// Darstellung nicht entschluesselbarer Nachrichten
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnzeigeEinstellungen {
    /// Platzhalter wenn der Gruppen-Schluessel lokal fehlt
    pub platzhalter_kein_schluessel: String,
    /// Platzhalter wenn die Authentifizierung fehlschlaegt
    pub platzhalter_fehlgeschlagen: String,
    /// Klartext senden wenn die Gruppe verschluesselt ist, der lokale
    /// Schluessel aber noch fehlt. `false` lehnt das Senden ab.
    pub klartext_ohne_schluessel: bool,
}

impl Default for AnzeigeEinstellungen {
    fn default() -> Self {
        Self {
            platzhalter_kein_schluessel:
                "[Verschluesselte Nachricht - Schluessel noch nicht verfuegbar]".into(),
            platzhalter_fehlgeschlagen: "[Nachricht konnte nicht entschluesselt werden]".into(),
            klartext_ohne_schluessel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level (trace, debug, info, warn, error)
    pub level: String,
    /// Format (text, json)
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl E2eConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei
    ///
    /// Fehlt die Datei, werden Standardwerte verwendet.
    pub fn laden(pfad: impl AsRef<Path>) -> anyhow::Result<Self> {
        let pfad = pfad.as_ref();
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config = Self::aus_toml(&inhalt).map_err(|e| {
                    anyhow::anyhow!("Konfigurationsfehler in '{}': {e}", pfad.display())
                })?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = %pfad.display(),
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{}' nicht lesbar: {e}",
                pfad.display()
            )),
        }
    }

    /// Parst und validiert eine Konfiguration aus einem TOML-String
    pub fn aus_toml(inhalt: &str) -> ChatResult<Self> {
        let config: Self =
            toml::from_str(inhalt).map_err(|e| ChatError::Konfiguration(e.to_string()))?;
        config.validieren()?;
        Ok(config)
    }

    pub fn validieren(&self) -> ChatResult<()> {
        if self.austausch.poll_intervall_sekunden == 0 {
            return Err(ChatError::Konfiguration(
                "austausch.poll_intervall_sekunden muss groesser als 0 sein".into(),
            ));
        }
        let anzeige = &self.anzeige;
        if anzeige.platzhalter_kein_schluessel.trim().is_empty()
            || anzeige.platzhalter_fehlgeschlagen.trim().is_empty()
        {
            return Err(ChatError::Konfiguration(
                "Platzhalter duerfen nicht leer sein".into(),
            ));
        }
        // Beide Faelle muessen in der UI unterscheidbar bleiben
        if anzeige.platzhalter_kein_schluessel == anzeige.platzhalter_fehlgeschlagen {
            return Err(ChatError::Konfiguration(
                "Platzhalter fuer fehlenden Schluessel und Fehlschlag muessen verschieden sein"
                    .into(),
            ));
        }
        Ok(())
    }

    pub fn poll_intervall(&self) -> Duration {
        Duration::from_secs(self.austausch.poll_intervall_sekunden)
    }

    /// Oeffnet den dateibasierten sicheren Speicher im konfigurierten Verzeichnis
    pub fn speicher_oeffnen(&self) -> ChatResult<FileStorage> {
        Ok(FileStorage::new(&self.speicher.verzeichnis)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = E2eConfig::default();
        assert!(cfg.validieren().is_ok());
        assert_eq!(cfg.austausch.poll_intervall_sekunden, 30);
        assert!(cfg.austausch.fehlende_mitglieder_versorgen);
        assert!(cfg.anzeige.klartext_ohne_schluessel);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.poll_intervall(), Duration::from_secs(30));
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [austausch]
            poll_intervall_sekunden = 5

            [anzeige]
            klartext_ohne_schluessel = false
        "#;
        let cfg = E2eConfig::aus_toml(toml).unwrap();
        assert_eq!(cfg.austausch.poll_intervall_sekunden, 5);
        assert!(!cfg.anzeige.klartext_ohne_schluessel);
        // Nicht angegebene Felder behalten Standardwerte
        assert!(cfg.austausch.fehlende_mitglieder_versorgen);
        assert_eq!(
            cfg.anzeige.platzhalter_fehlgeschlagen,
            AnzeigeEinstellungen::default().platzhalter_fehlgeschlagen
        );
    }

    #[test]
    fn intervall_null_abgelehnt() {
        let result = E2eConfig::aus_toml("[austausch]\npoll_intervall_sekunden = 0\n");
        assert!(matches!(result, Err(ChatError::Konfiguration(_))));
    }

    #[test]
    fn gleiche_platzhalter_abgelehnt() {
        let toml = r#"
            [anzeige]
            platzhalter_kein_schluessel = "???"
            platzhalter_fehlgeschlagen = "???"
        "#;
        assert!(matches!(
            E2eConfig::aus_toml(toml),
            Err(ChatError::Konfiguration(_))
        ));
    }

    #[test]
    fn ungueltiges_toml_ist_konfigurationsfehler() {
        assert!(matches!(
            E2eConfig::aus_toml("austausch = ["),
            Err(ChatError::Konfiguration(_))
        ));
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = E2eConfig::laden(dir.path().join("gibt-es-nicht.toml")).unwrap();
        assert_eq!(cfg, E2eConfig::default());
    }

    #[test]
    fn datei_laden_und_speicher_oeffnen() {
        let dir = tempfile::tempdir().unwrap();
        let schluessel_dir = dir.path().join("keys");
        let pfad = dir.path().join("e2e.toml");
        std::fs::write(
            &pfad,
            format!(
                "[speicher]\nverzeichnis = {:?}\n",
                schluessel_dir.to_string_lossy()
            ),
        )
        .unwrap();

        let cfg = E2eConfig::laden(&pfad).unwrap();
        assert_eq!(cfg.speicher.verzeichnis, schluessel_dir);
        let speicher = cfg.speicher_oeffnen().unwrap();
        assert_eq!(speicher.base_dir(), schluessel_dir.as_path());
        assert!(schluessel_dir.is_dir());
    }

    #[test]
    fn ungueltige_datei_ergibt_fehler() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("kaputt.toml");
        std::fs::write(&pfad, "[anzeige]\nplatzhalter_fehlgeschlagen = \"\"\n").unwrap();
        assert!(E2eConfig::laden(&pfad).is_err());
    }
}
