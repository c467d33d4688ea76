//! Transaction-core configuration.

//---------------------------------------------------------------------------------------------------- Config
/// Configuration of a [`TransactionManager`](crate::TransactionManager).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// The smallest representable currency amount, in atomic units.
    ///
    /// A change output below this is suppressed (burned) rather than
    /// emitted.
    pub smallest_unit: u64,

    /// Upper bound on pool transactions pulled per mining round.
    pub block_tx_limit: usize,
}

impl Config {
    /// The default configuration.
    pub const fn new() -> Self {
        Self {
            smallest_unit: 1,
            block_tx_limit: 100,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

//---------------------------------------------------------------------------------------------------- ConfigBuilder
/// Builder for [`Config`].
#[derive(Copy, Clone, Debug, Default)]
pub struct ConfigBuilder {
    smallest_unit: Option<u64>,
    block_tx_limit: Option<usize>,
}

impl ConfigBuilder {
    pub const fn new() -> Self {
        Self {
            smallest_unit: None,
            block_tx_limit: None,
        }
    }

    pub const fn smallest_unit(mut self, smallest_unit: u64) -> Self {
        self.smallest_unit = Some(smallest_unit);
        self
    }

    pub const fn block_tx_limit(mut self, block_tx_limit: usize) -> Self {
        self.block_tx_limit = Some(block_tx_limit);
        self
    }

    pub fn build(self) -> Config {
        let defaults = Config::new();
        Config {
            smallest_unit: self.smallest_unit.unwrap_or(defaults.smallest_unit),
            block_tx_limit: self.block_tx_limit.unwrap_or(defaults.block_tx_limit),
        }
    }
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        assert_eq!(ConfigBuilder::new().build(), Config::new());
        assert_eq!(
            ConfigBuilder::new().smallest_unit(100).build().smallest_unit,
            100
        );
    }
}
