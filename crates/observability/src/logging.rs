//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (hat Vorrang vor der Konfiguration):
//! - `GROOP_LOG_LEVEL`: Log-Level (trace/debug/info/warn/error) oder
//!   vollstaendige Filter-Direktive, Standard: info
//! - `GROOP_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Das Level gilt fuer die Groop-Crates; Abhaengigkeiten loggen ab `warn`.

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "GROOP_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "GROOP_LOG_FORMAT";

const GROOP_CRATES: &[&str] = &["groop_crypto", "groop_chat", "groop_observability"];

#[derive(Debug, Error)]
pub enum LoggingFehler {
    #[error("Ungueltiger Log-Level: '{0}'")]
    UngueltigesLevel(String),

    #[error("Ungueltiges Log-Format: '{0}' (erlaubt: text, json)")]
    UngueltigesFormat(String),

    #[error("Ungueltige Filter-Direktive: {0}")]
    Filter(String),

    #[error("Logging bereits initialisiert: {0}")]
    BereitsInitialisiert(String),
}

/// Ausgabeformat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parsen(format: &str) -> Result<Self, LoggingFehler> {
        match format {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            anderes => Err(LoggingFehler::UngueltigesFormat(anderes.to_string())),
        }
    }
}

/// Initialisiert das Logging-System.
///
/// `GROOP_LOG_LEVEL` und `GROOP_LOG_FORMAT` ueberschreiben `level` und
/// `format`. Ein zweiter Aufruf liefert `BereitsInitialisiert`.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<(), LoggingFehler> {
    let level = wert_aufloesen(std::env::var(ENV_LOG_LEVEL).ok(), level);
    let format = LogFormat::parsen(&wert_aufloesen(std::env::var(ENV_LOG_FORMAT).ok(), format))?;
    let filter = filter_erstellen(&level)?;

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|e| LoggingFehler::BereitsInitialisiert(e.to_string()))?;

    tracing::debug!(level = %level, ?format, "Logging initialisiert");
    Ok(())
}

/// Erstellt den Filter: ein einfaches Level gilt fuer die Groop-Crates,
/// eine Direktive mit `=` oder `,` wird unveraendert uebernommen.
pub fn filter_erstellen(level: &str) -> Result<EnvFilter, LoggingFehler> {
    let direktive = direktive_erstellen(level)?;
    EnvFilter::try_new(&direktive).map_err(|e| LoggingFehler::Filter(e.to_string()))
}

fn direktive_erstellen(level: &str) -> Result<String, LoggingFehler> {
    if level.contains('=') || level.contains(',') {
        return Ok(level.to_string());
    }
    if !log_level_gueltig(level) {
        return Err(LoggingFehler::UngueltigesLevel(level.to_string()));
    }
    let mut direktive = String::from("warn");
    for name in GROOP_CRATES {
        direktive.push_str(&format!(",{name}={level}"));
    }
    Ok(direktive)
}

/// Umgebungswert hat Vorrang, leere Werte zaehlen als nicht gesetzt
fn wert_aufloesen(env_wert: Option<String>, konfiguriert: &str) -> String {
    env_wert
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| konfiguriert.to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

pub fn log_format_gueltig(format: &str) -> bool {
    LogFormat::parsen(format).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level));
        }
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_werte() {
        assert_eq!(LogFormat::parsen("json").unwrap(), LogFormat::Json);
        assert!(log_format_gueltig("text"));
        assert!(!log_format_gueltig("xml"));
        assert!(matches!(
            LogFormat::parsen("JSON"),
            Err(LoggingFehler::UngueltigesFormat(_))
        ));
    }

    #[test]
    fn einfaches_level_gilt_fuer_groop_crates() {
        let direktive = direktive_erstellen("debug").unwrap();
        assert!(direktive.starts_with("warn,"));
        assert!(direktive.contains("groop_crypto=debug"));
        assert!(direktive.contains("groop_chat=debug"));
        assert!(filter_erstellen("debug").is_ok());
    }

    #[test]
    fn direktive_wird_uebernommen() {
        assert_eq!(
            direktive_erstellen("groop_chat=trace").unwrap(),
            "groop_chat=trace"
        );
        assert!(filter_erstellen("info,groop_crypto=trace").is_ok());
    }

    #[test]
    fn ungueltiges_level_abgelehnt() {
        assert!(matches!(
            filter_erstellen("laut"),
            Err(LoggingFehler::UngueltigesLevel(_))
        ));
    }

    #[test]
    fn umgebung_hat_vorrang() {
        assert_eq!(wert_aufloesen(Some("debug".into()), "info"), "debug");
        assert_eq!(wert_aufloesen(None, "info"), "info");
        assert_eq!(wert_aufloesen(Some("  ".into()), "json"), "json");
    }

    #[test]
    fn zweite_initialisierung_schlaegt_fehl() {
        // Erster Aufruf kann je nach Testreihenfolge bereits erfolgt sein
        let _ = logging_initialisieren("info", "text");
        assert!(matches!(
            logging_initialisieren("info", "text"),
            Err(LoggingFehler::BereitsInitialisiert(_))
        ));
    }
}
