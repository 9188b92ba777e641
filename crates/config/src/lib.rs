//! Configuration loading and validation.
//!
//! Config file: `./.env.json` (JSON only). Violations are reported with the
//! team and field name and are fatal at startup.

pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{DEFAULT_CONFIG_FILE, load_config, parse_config},
    schema::{
        ConsoleConfig, CrosstalkConfig, HandlersConfig, HighlightConfig, NotificationConfig,
        SpeechConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate_config},
};
