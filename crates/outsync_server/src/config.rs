//! Server configuration.

/// Configuration for the record server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of records and deletions per zone fetch.
    pub max_fetch_batch: usize,
    /// Maximum number of records per modify call.
    pub max_modify_batch: usize,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_fetch_batch: 200,
            max_modify_batch: 400,
        }
    }

    /// Sets the fetch batch limit.
    pub fn with_max_fetch_batch(mut self, size: usize) -> Self {
        self.max_fetch_batch = size.max(1);
        self
    }

    /// Sets the modify batch limit.
    pub fn with_max_modify_batch(mut self, size: usize) -> Self {
        self.max_modify_batch = size.max(1);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_to_one() {
        let config = ServerConfig::new()
            .with_max_fetch_batch(0)
            .with_max_modify_batch(10);
        assert_eq!(config.max_fetch_batch, 1);
        assert_eq!(config.max_modify_batch, 10);
    }
}
