//! Runtime configuration
//!
//! Provides compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder methods
//! 2. Environment variables (runtime)
//! 3. User's config file named by `COT_CONFIG_RS` (compile-time)
//! 4. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use cotick_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env()
//!     .tick_interval(Duration::from_millis(100))
//!     .stack_size(512 * 1024);
//! ```

pub mod defaults;

use std::time::Duration;

use cotick_core::constants::MIN_STACK_SIZE;
use cotick_core::env::{env_get, env_get_bool};

/// Runtime configuration with builder pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Interval between host ticks (one reference time unit)
    pub tick_interval: Duration,
    /// Usable stack bytes per coroutine
    pub stack_size: usize,
    /// Nesting bound for exception convergence
    pub max_exception_depth: u32,
    /// Scheduler-internal debug logging
    pub debug_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Compile-time defaults with environment overrides
    ///
    /// Environment variables (all optional):
    /// - `COT_TICK_INTERVAL_MS` - Tick interval in milliseconds
    /// - `COT_STACK_SIZE` - Stack size per coroutine in bytes
    /// - `COT_MAX_EXCEPTION_DEPTH` - Exception convergence nesting bound
    /// - `COT_DEBUG` - Enable debug logging (0/1)
    pub fn from_env() -> Self {
        Self {
            tick_interval: Duration::from_millis(env_get(
                "COT_TICK_INTERVAL_MS",
                defaults::TICK_INTERVAL_MS,
            )),
            stack_size: env_get("COT_STACK_SIZE", defaults::STACK_SIZE),
            max_exception_depth: env_get(
                "COT_MAX_EXCEPTION_DEPTH",
                defaults::MAX_EXCEPTION_DEPTH,
            ),
            debug_logging: env_get_bool("COT_DEBUG", defaults::DEBUG_LOGGING),
        }
    }

    /// Compile-time defaults only (no env override)
    pub fn new() -> Self {
        Self {
            tick_interval: Duration::from_millis(defaults::TICK_INTERVAL_MS),
            stack_size: defaults::STACK_SIZE,
            max_exception_depth: defaults::MAX_EXCEPTION_DEPTH,
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn tick_interval(mut self, d: Duration) -> Self {
        self.tick_interval = d;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn max_exception_depth(mut self, depth: u32) -> Self {
        self.max_exception_depth = depth;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue("tick_interval must be > 0"));
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("stack_size must be >= 64KB"));
        }
        if self.max_exception_depth == 0 {
            return Err(ConfigError::InvalidValue("max_exception_depth must be > 0"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("cotick configuration:");
        eprintln!("  tick_interval:        {:?}", self.tick_interval);
        eprintln!("  stack_size:           {}", self.stack_size);
        eprintln!("  max_exception_depth:  {}", self.max_exception_depth);
        eprintln!("  debug_logging:        {}", self.debug_logging);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::new();
        assert!(config.validate().is_ok());
        assert!(config.stack_size >= MIN_STACK_SIZE);
    }

    #[test]
    fn test_builder() {
        let config = RuntimeConfig::new()
            .tick_interval(Duration::from_millis(5))
            .stack_size(128 * 1024)
            .max_exception_depth(2)
            .debug_logging(true);

        assert_eq!(config.tick_interval, Duration::from_millis(5));
        assert_eq!(config.stack_size, 128 * 1024);
        assert_eq!(config.max_exception_depth, 2);
        assert!(config.debug_logging);
    }

    #[test]
    fn test_validation() {
        let config = RuntimeConfig::new().stack_size(4096);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidValue("stack_size must be >= 64KB"))
        );

        assert!(RuntimeConfig::new().tick_interval(Duration::ZERO).validate().is_err());
        assert!(RuntimeConfig::new().max_exception_depth(0).validate().is_err());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("COT_MAX_EXCEPTION_DEPTH", "3");
        let config = RuntimeConfig::from_env();
        std::env::remove_var("COT_MAX_EXCEPTION_DEPTH");
        assert_eq!(config.max_exception_depth, 3);
    }
}
