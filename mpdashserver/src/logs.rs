// logs.rs
//! Initialisation du système de logging (`tracing` + `tracing-subscriber`).
//!
//! Le filtre vient de `RUST_LOG` s'il est défini, sinon du niveau minimal configuré
//! (`host.logger.min_level`).

use mpdashconfig::get_config;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Registry, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Options d'initialisation du système de logging
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Niveau minimal utilisé quand `RUST_LOG` est absent
    pub min_level: LevelFilter,
    /// Activer la sortie vers la console
    pub enable_console: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            min_level: LevelFilter::INFO,
            enable_console: true,
        }
    }
}

impl LoggingOptions {
    /// Lit les options depuis la configuration globale
    pub fn from_config() -> Self {
        let config = get_config();
        let min_level = string_to_level(&config.get_log_min_level())
            .map(level_to_levelfilter)
            .unwrap_or(LevelFilter::INFO);

        Self {
            min_level,
            enable_console: config.get_log_enable_console(),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.min_level.into())
            .from_env_lossy()
    }
}

/// Initialise le subscriber global
///
/// Retourne une erreur si un subscriber global est déjà installé (utile dans les tests
/// qui appellent la fonction plusieurs fois).
///
/// # Exemple
/// ```rust,no_run
/// use mpdashserver::logs::{init_logging, LoggingOptions};
///
/// init_logging(&LoggingOptions::from_config()).ok();
/// ```
pub fn init_logging(
    options: &LoggingOptions,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let subscriber = Registry::default().with(options.env_filter());

    if options.enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .try_init()
    } else {
        subscriber.try_init()
    }
}

fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

fn level_to_levelfilter(level: Level) -> LevelFilter {
    match level {
        Level::ERROR => LevelFilter::ERROR,
        Level::WARN => LevelFilter::WARN,
        Level::INFO => LevelFilter::INFO,
        Level::DEBUG => LevelFilter::DEBUG,
        Level::TRACE => LevelFilter::TRACE,
    }
}
