//! Tunables of a [Client][crate::client::Client].

use envconfig::Envconfig;
use serde::Deserialize;

/// Default number of events fetched per [Repository][crate::repository::Repository]
/// call when reading through a [Specification][crate::specification::Specification].
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Configuration of a [Client][crate::client::Client].
///
/// Can be read from the environment, or deserialized as part of a larger
/// application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Envconfig, Deserialize)]
pub struct Config {
    /// Number of events fetched per repository call when reading.
    #[envconfig(from = "EVENT_STORE_PAGE_SIZE", default = "100")]
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    /// Returns the page size to use, never less than one.
    pub fn page_size(&self) -> usize {
        self.page_size.max(1)
    }
}
