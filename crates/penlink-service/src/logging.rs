//! Logging setup for the daemon.

use tracing_subscriber::EnvFilter;

const CRATES: [&str; 3] = ["penlink_core", "penlink_service", "penlinkd"];

/// Logging options resolved from the config file and command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Level applied to the penlink crates.
    pub level: String,
    /// Raise the penlink crates to `debug`.
    pub verbose: bool,
    /// Raise the penlink crates to `trace`.
    pub debug: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

impl LogConfig {
    /// Log the penlink crates at `level`.
    pub fn new(level: &str) -> Self {
        Self {
            level: level.to_string(),
            verbose: false,
            debug: false,
        }
    }

    /// Set verbose mode.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set debug mode.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// The level the penlink crates end up with.
    pub fn effective_level(&self) -> &str {
        if self.debug {
            "trace"
        } else if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }

    /// Build the filter. `RUST_LOG` directives are kept and extended.
    pub fn filter(&self) -> anyhow::Result<EnvFilter> {
        let level = self.effective_level();
        let mut filter = EnvFilter::from_default_env();
        for krate in CRATES {
            filter = filter.add_directive(format!("{krate}={level}").parse()?);
        }
        Ok(filter)
    }

    /// Install the global subscriber.
    ///
    /// Fails if a subscriber is already installed.
    pub fn init(&self) -> anyhow::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(self.filter()?)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
    }
}
