//! Configuration loading and merging logic.

use std::path::Path;

use crate::errors::ConfigError;
use crate::types::ControlPlaneConfig;
use crate::validation::validate_config;

/// Load configuration from the hierarchy of config files plus environment.
///
/// Missing config files are not errors; parse errors are.
pub fn load_hierarchy() -> Result<ControlPlaneConfig, ConfigError> {
    let mut config = ControlPlaneConfig::default();

    if let Ok(user_paths) = agentz_paths::UserPaths::resolve() {
        match load_config_file(&user_paths.user_config()) {
            Ok(Some(user_config)) => config = merge_configs(config, user_config),
            Ok(None) => {}
            Err(e) => return Err(e),
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        match load_config_file(&agentz_paths::UserPaths::project_config(&cwd)) {
            Ok(Some(project_config)) => config = merge_configs(config, project_config),
            Ok(None) => {}
            Err(e) => return Err(e),
        }
    }

    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load a configuration file; `Ok(None)` when the file does not exist.
fn load_config_file(path: &Path) -> Result<Option<ControlPlaneConfig>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ConfigError::IoError { source: e }),
    };
    let config: ControlPlaneConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: format!("'{}': {}", path.display(), e),
        })?;
    Ok(Some(config))
}

/// Merge two configurations, with `override_config` taking precedence.
///
/// TOML files carry complete sections (serde fills unset keys with
/// defaults), so merging is section-level: an override section replaces the
/// base section wholesale, and optional top-level fields replace only when
/// present.
pub fn merge_configs(
    base: ControlPlaneConfig,
    override_config: ControlPlaneConfig,
) -> ControlPlaneConfig {
    let defaults = ControlPlaneConfig::default();
    let mut agent_commands = base.agent_commands;
    for (agent, command) in override_config.agent_commands {
        agent_commands.insert(agent, command);
    }
    ControlPlaneConfig {
        runtime: if override_config.runtime == defaults.runtime {
            base.runtime
        } else {
            override_config.runtime
        },
        rate_limit: if override_config.rate_limit == defaults.rate_limit {
            base.rate_limit
        } else {
            override_config.rate_limit
        },
        default_agent: override_config.default_agent.or(base.default_agent),
        agent_commands,
    }
}

fn env_u64(key: &str, target: &mut u64) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(key) {
        *target = value.parse().map_err(|_| ConfigError::InvalidEnvValue {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}

fn env_usize(key: &str, target: &mut usize) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(key) {
        *target = value.parse().map_err(|_| ConfigError::InvalidEnvValue {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}

fn env_u32(key: &str, target: &mut u32) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(key) {
        *target = value.parse().map_err(|_| ConfigError::InvalidEnvValue {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}

/// Apply the documented environment keys on top of the merged file config.
pub fn apply_env_overrides(config: &mut ControlPlaneConfig) -> Result<(), ConfigError> {
    env_u64("CLI_TIMEOUT_MS", &mut config.runtime.cli_timeout_ms)?;
    env_u64(
        "CLI_STARTUP_TIMEOUT_MS",
        &mut config.runtime.cli_startup_timeout_ms,
    )?;
    env_usize(
        "MAX_CONCURRENT_AGENTS",
        &mut config.runtime.max_concurrent_agents,
    )?;
    env_u64(
        "MAX_OUTPUT_SIZE_BYTES",
        &mut config.runtime.max_output_size_bytes,
    )?;
    env_u64(
        "MAX_OUTPUT_BUFFER_BYTES",
        &mut config.runtime.max_output_buffer_bytes,
    )?;
    env_u64("FLUSH_DELAY_MS", &mut config.runtime.flush_delay_ms)?;
    env_usize(
        "FLUSH_CHUNK_THRESHOLD",
        &mut config.runtime.flush_chunk_threshold,
    )?;
    env_u64("MAX_SESSION_AGE_MS", &mut config.runtime.max_session_age_ms)?;
    env_usize("MAX_SESSIONS_COUNT", &mut config.runtime.max_sessions_count)?;
    if let Ok(prefix) = std::env::var("ALLOWED_PATH_PREFIX") {
        config.runtime.allowed_path_prefix = Some(prefix);
    }

    env_usize(
        "RATE_LIMIT_REQUESTS_PER_MINUTE",
        &mut config.rate_limit.max_requests_per_minute,
    )?;
    env_u64(
        "RATE_LIMIT_MAX_TOKENS_PER_REQUEST",
        &mut config.rate_limit.max_tokens_per_request,
    )?;
    env_u64(
        "RATE_LIMIT_TOKENS_PER_MINUTE",
        &mut config.rate_limit.max_tokens_per_minute,
    )?;
    env_u64(
        "RATE_LIMIT_TOKENS_PER_HOUR",
        &mut config.rate_limit.max_tokens_per_hour,
    )?;
    env_u64(
        "RATE_LIMIT_SUSPENSION_DURATION_MS",
        &mut config.rate_limit.suspension_duration_ms,
    )?;
    env_u32(
        "RATE_LIMIT_MAX_VIOLATIONS",
        &mut config.rate_limit.max_violations,
    )?;
    Ok(())
}
