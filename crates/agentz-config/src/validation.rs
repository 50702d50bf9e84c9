//! Configuration validation logic.

use crate::errors::ConfigError;
use crate::types::ControlPlaneConfig;

/// Validate a merged configuration before use.
///
/// # Validation Rules
///
/// - `max_output_buffer_bytes <= max_output_size_bytes`
/// - `cli_startup_timeout_ms < cli_timeout_ms`
/// - `max_concurrent_agents >= 1`
/// - `max_tokens_per_minute <= max_tokens_per_hour`
pub fn validate_config(config: &ControlPlaneConfig) -> Result<(), ConfigError> {
    if config.runtime.max_output_buffer_bytes > config.runtime.max_output_size_bytes {
        return Err(ConfigError::InvalidConfiguration {
            message: format!(
                "MAX_OUTPUT_BUFFER_BYTES ({}) must not exceed MAX_OUTPUT_SIZE_BYTES ({})",
                config.runtime.max_output_buffer_bytes, config.runtime.max_output_size_bytes
            ),
        });
    }

    if config.runtime.cli_startup_timeout_ms >= config.runtime.cli_timeout_ms {
        return Err(ConfigError::InvalidConfiguration {
            message: format!(
                "CLI_STARTUP_TIMEOUT_MS ({}) must be less than CLI_TIMEOUT_MS ({})",
                config.runtime.cli_startup_timeout_ms, config.runtime.cli_timeout_ms
            ),
        });
    }

    if config.runtime.max_concurrent_agents < 1 {
        return Err(ConfigError::InvalidConfiguration {
            message: "MAX_CONCURRENT_AGENTS must be at least 1".to_string(),
        });
    }

    if config.rate_limit.max_tokens_per_minute > config.rate_limit.max_tokens_per_hour {
        return Err(ConfigError::InvalidConfiguration {
            message: format!(
                "RATE_LIMIT_TOKENS_PER_MINUTE ({}) must not exceed RATE_LIMIT_TOKENS_PER_HOUR ({})",
                config.rate_limit.max_tokens_per_minute, config.rate_limit.max_tokens_per_hour
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(validate_config(&ControlPlaneConfig::default()).is_ok());
    }

    #[test]
    fn test_buffer_must_fit_in_size() {
        let mut config = ControlPlaneConfig::default();
        config.runtime.max_output_buffer_bytes = config.runtime.max_output_size_bytes + 1;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("MAX_OUTPUT_BUFFER_BYTES"));
    }

    #[test]
    fn test_startup_timeout_must_precede_cli_timeout() {
        let mut config = ControlPlaneConfig::default();
        config.runtime.cli_startup_timeout_ms = config.runtime.cli_timeout_ms;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_concurrency_floor() {
        let mut config = ControlPlaneConfig::default();
        config.runtime.max_concurrent_agents = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_minute_tokens_within_hour_tokens() {
        let mut config = ControlPlaneConfig::default();
        config.rate_limit.max_tokens_per_minute = config.rate_limit.max_tokens_per_hour + 1;
        assert!(validate_config(&config).is_err());
    }
}
