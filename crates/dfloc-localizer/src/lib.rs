#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Localizer configuration.
pub mod config;

/// Error types for the localizer.
pub mod error;

/// The localization state machine.
pub mod localizer;

/// Registration strategy selection.
pub mod strategy;

pub use config::{AlignMethod, LocalizerConfig};
pub use error::LocalizerError;
pub use localizer::Localizer;
pub use strategy::Strategy;
