use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct FlvMuxerConfig {
    /// Samples held while waiting for every expected media kind
    pub max_pending_samples: usize,

    /// Payloads at least this large are emitted without copying
    pub shared_chunk_threshold: usize,

    /// Emit the FLV file header at the start of each run
    pub has_header: bool,
}

impl Default for FlvMuxerConfig {
    fn default() -> Self {
        FlvMuxerConfig {
            max_pending_samples: 64,
            shared_chunk_threshold: 16 * 1024,
            has_header: true,
        }
    }
}

impl FlvMuxerConfig {
    /// Create config builder
    pub fn builder() -> FlvMuxerConfigBuilder {
        FlvMuxerConfigBuilder::new()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_pending_samples == 0 {
            return Err(Error::config("Pending sample limit must be at least 1"));
        }

        if self.shared_chunk_threshold == 0 {
            return Err(Error::config("Shared chunk threshold must be at least 1"));
        }

        Ok(())
    }
}

/// Builder for FlvMuxerConfig
pub struct FlvMuxerConfigBuilder {
    config: FlvMuxerConfig,
}

impl FlvMuxerConfigBuilder {
    pub fn new() -> Self {
        FlvMuxerConfigBuilder {
            config: FlvMuxerConfig::default(),
        }
    }

    pub fn max_pending_samples(mut self, count: usize) -> Self {
        self.config.max_pending_samples = count;
        self
    }

    pub fn shared_chunk_threshold(mut self, bytes: usize) -> Self {
        self.config.shared_chunk_threshold = bytes;
        self
    }

    pub fn has_header(mut self, enabled: bool) -> Self {
        self.config.has_header = enabled;
        self
    }

    /// Build configuration
    pub fn build(self) -> Result<FlvMuxerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for FlvMuxerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_validates() {
        assert!(FlvMuxerConfig::builder().max_pending_samples(0).build().is_err());
        assert!(FlvMuxerConfig::builder().shared_chunk_threshold(0).build().is_err());

        let config = FlvMuxerConfig::builder()
            .has_header(false)
            .shared_chunk_threshold(1024)
            .build()
            .unwrap();
        assert!(!config.has_header);
        assert_eq!(config.shared_chunk_threshold, 1024);
    }
}
