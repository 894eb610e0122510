//! Logging setup for hosts embedding the catalogue engine
//!
//! The engine itself only emits `tracing` events. Hosts that do not install
//! their own subscriber can call [`init_logging`] to get console output with
//! the usual `RUST_LOG` filtering.

use crate::error::{CatalogueError, Result};
use tracing_subscriber::EnvFilter;

/// Output verbosity, mirrors the quiet/normal/verbose switches of a host UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    /// Default filter directive when `RUST_LOG` is not set
    pub fn directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "geo_catalogue=warn",
            Verbosity::Normal => "geo_catalogue=info",
            Verbosity::Verbose => "geo_catalogue=debug",
        }
    }

    /// Filter from `RUST_LOG`, falling back to the verbosity directive
    pub fn env_filter(self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()))
    }
}

/// Install a global compact fmt subscriber.
///
/// Fails if the host already installed a global subscriber.
pub fn init_logging(verbosity: Verbosity) -> Result<()> {
    tracing_subscriber::fmt()
        .compact()
        .with_target(verbosity == Verbosity::Verbose)
        .with_env_filter(verbosity.env_filter())
        .try_init()
        .map_err(|e| CatalogueError::Validation(format!("Logging already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_follow_verbosity() {
        assert_eq!(Verbosity::Quiet.directive(), "geo_catalogue=warn");
        assert_eq!(Verbosity::default().directive(), "geo_catalogue=info");
        assert_eq!(Verbosity::Verbose.directive(), "geo_catalogue=debug");
    }
}
