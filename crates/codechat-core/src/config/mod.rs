mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// the resulting configuration is invalid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!(
                "llm.temperature must be within [0, 2], got {}",
                self.llm.temperature
            );
        }
        if self.chunker.window_size == 0 {
            bail!("chunker.window_size must be at least 1");
        }
        if self.chunker.window_overlap >= self.chunker.window_size {
            bail!(
                "chunker.window_overlap ({}) must be smaller than chunker.window_size ({})",
                self.chunker.window_overlap,
                self.chunker.window_size
            );
        }
        if self.walker.max_file_size == 0 {
            bail!("walker.max_file_size must be at least 1");
        }
        if self.ingest.batch_size == 0 {
            bail!("ingest.batch_size must be at least 1");
        }
        if self.retrieval.default_k == 0 {
            bail!("retrieval.default_k must be at least 1");
        }
        if !(-1.0..=1.0).contains(&self.retrieval.score_threshold) {
            bail!(
                "retrieval.score_threshold must be within [-1, 1], got {}",
                self.retrieval.score_threshold
            );
        }
        Ok(())
    }
}
