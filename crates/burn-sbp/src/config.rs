use serde::{Deserialize, Serialize};

/// Settings of the sharding candidate search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// DMA transfer granularity, in bytes, used to score candidates.
    #[serde(default = "default_burst_length")]
    pub burst_length: usize,
    /// Maximum number of ranked candidates kept per tensor, all of them when `None`.
    #[serde(default)]
    pub candidate_limit: Option<usize>,
}

fn default_burst_length() -> usize {
    128
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            burst_length: default_burst_length(),
            candidate_limit: None,
        }
    }
}

impl SearchConfig {
    /// Sets the burst length.
    pub fn with_burst_length(mut self, burst_length: usize) -> Self {
        self.burst_length = burst_length;
        self
    }

    /// Sets the candidate limit.
    pub fn with_candidate_limit(mut self, candidate_limit: Option<usize>) -> Self {
        self.candidate_limit = candidate_limit;
        self
    }
}

#[cfg(feature = "std")]
mod persist {
    use super::SearchConfig;
    use std::path::Path;

    /// Errors raised while saving or loading a [`SearchConfig`].
    #[derive(thiserror::Error, Debug)]
    pub enum ConfigError {
        /// The file could not be read or written.
        #[error("config file I/O failed: {0}")]
        Io(#[from] std::io::Error),
        /// The file content is not a valid configuration.
        #[error("config file is malformed: {0}")]
        Format(#[from] serde_json::Error),
    }

    impl SearchConfig {
        /// Writes the configuration to `path` as pretty printed JSON.
        pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
            let content = serde_json::to_string_pretty(self)?;
            std::fs::write(path, content)?;
            Ok(())
        }

        /// Reads a configuration previously written by [`save`](SearchConfig::save).
        ///
        /// Missing fields take their default value.
        pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        }
    }

}

#[cfg(feature = "std")]
pub use persist::ConfigError;
