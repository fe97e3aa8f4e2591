//! # groop-observability
//!
//! Structured Logging fuer Groop via tracing-subscriber (Text oder JSON).
//! Wird vom Host einmalig beim Start initialisiert.

pub mod logging;

pub use logging::{
    filter_erstellen, log_format_gueltig, log_level_gueltig, logging_initialisieren, LogFormat,
    LoggingFehler, ENV_LOG_FORMAT, ENV_LOG_LEVEL,
};
