use serde::{Deserialize, Serialize};

/// Worker runtime limits and stream buffering knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker terminated after this long (`CLI_TIMEOUT_MS`).
    pub cli_timeout_ms: u64,
    /// Worker must connect back to the ingester within this window
    /// (`CLI_STARTUP_TIMEOUT_MS`).
    pub cli_startup_timeout_ms: u64,
    /// Concurrent agents per host (`MAX_CONCURRENT_AGENTS`).
    pub max_concurrent_agents: usize,
    /// Max output bytes retained per session (`MAX_OUTPUT_SIZE_BYTES`).
    pub max_output_size_bytes: u64,
    /// Ingester-side pending buffer cap (`MAX_OUTPUT_BUFFER_BYTES`).
    pub max_output_buffer_bytes: u64,
    /// Flush pending chunks after this delay (`FLUSH_DELAY_MS`).
    pub flush_delay_ms: u64,
    /// Flush pending chunks after this count (`FLUSH_CHUNK_THRESHOLD`).
    pub flush_chunk_threshold: usize,
    /// Retention sweep: sessions older than this are eligible
    /// (`MAX_SESSION_AGE_MS`).
    pub max_session_age_ms: u64,
    /// Retention sweep: keep at most this many sessions (`MAX_SESSIONS_COUNT`).
    pub max_sessions_count: usize,
    /// Spawn working directories must live under this prefix
    /// (`ALLOWED_PATH_PREFIX`; defaults to the process working directory).
    pub allowed_path_prefix: Option<String>,
    /// Whether sessions get isolated worktrees; when off, sessions run
    /// directly in the repository root.
    pub worktree_isolation: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cli_timeout_ms: 3_600_000,
            cli_startup_timeout_ms: 30_000,
            max_concurrent_agents: 3,
            max_output_size_bytes: 10_000_000,
            max_output_buffer_bytes: 1_000_000,
            flush_delay_ms: 250,
            flush_chunk_threshold: 10,
            max_session_age_ms: 7 * 24 * 60 * 60 * 1000,
            max_sessions_count: 100,
            allowed_path_prefix: None,
            worktree_isolation: true,
        }
    }
}

/// Sliding-window limits and suspension policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// `RATE_LIMIT_REQUESTS_PER_MINUTE`
    pub max_requests_per_minute: usize,
    /// `RATE_LIMIT_MAX_TOKENS_PER_REQUEST`
    pub max_tokens_per_request: u64,
    /// `RATE_LIMIT_TOKENS_PER_MINUTE`
    pub max_tokens_per_minute: u64,
    /// `RATE_LIMIT_TOKENS_PER_HOUR`
    pub max_tokens_per_hour: u64,
    /// `RATE_LIMIT_SUSPENSION_DURATION_MS`
    pub suspension_duration_ms: u64,
    /// `RATE_LIMIT_MAX_VIOLATIONS`
    pub max_violations: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 60,
            max_tokens_per_request: 50_000,
            max_tokens_per_minute: 200_000,
            max_tokens_per_hour: 1_000_000,
            suspension_duration_ms: 15 * 60 * 1000,
            max_violations: 5,
        }
    }
}

/// Best-effort substring filter applied to spawn prompts and instructions.
/// A safety net, not a security boundary.
pub const DANGEROUS_COMMANDS: [&str; 10] = [
    "rm -rf /",
    "rm -rf /*",
    "sudo rm",
    "> /dev/sda",
    "mkfs",
    "dd if=",
    "fork bomb",
    "curl | bash",
    "wget | sh",
    "curl | sh",
];

/// The full control-plane configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub runtime: RuntimeConfig,
    pub rate_limit: RateLimitConfig,
    /// Default agent wire name used when spawn omits one.
    pub default_agent: Option<String>,
    /// Per-agent binary overrides (agent wire name → command). Unlisted
    /// agents resolve their wire name on PATH.
    pub agent_commands: std::collections::BTreeMap<String, String>,
}

impl ControlPlaneConfig {
    /// Load and validate the full configuration hierarchy.
    pub fn load() -> Result<Self, crate::errors::ConfigError> {
        crate::loading::load_hierarchy()
    }

    pub fn validate(&self) -> Result<(), crate::errors::ConfigError> {
        crate::validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ControlPlaneConfig::default();
        assert_eq!(config.runtime.cli_timeout_ms, 3_600_000);
        assert_eq!(config.runtime.cli_startup_timeout_ms, 30_000);
        assert_eq!(config.runtime.max_concurrent_agents, 3);
        assert_eq!(config.runtime.max_output_size_bytes, 10_000_000);
        assert_eq!(config.runtime.max_output_buffer_bytes, 1_000_000);
        assert_eq!(config.runtime.flush_delay_ms, 250);
        assert_eq!(config.runtime.flush_chunk_threshold, 10);
        assert_eq!(config.runtime.max_session_age_ms, 604_800_000);
        assert_eq!(config.runtime.max_sessions_count, 100);
        assert_eq!(config.rate_limit.max_requests_per_minute, 60);
        assert_eq!(config.rate_limit.max_tokens_per_request, 50_000);
        assert_eq!(config.rate_limit.max_tokens_per_minute, 200_000);
        assert_eq!(config.rate_limit.max_tokens_per_hour, 1_000_000);
        assert_eq!(config.rate_limit.suspension_duration_ms, 900_000);
        assert_eq!(config.rate_limit.max_violations, 5);
    }

    #[test]
    fn test_defaults_validate() {
        assert!(ControlPlaneConfig::default().validate().is_ok());
    }

    #[test]
    fn test_toml_partial_override() {
        let config: ControlPlaneConfig = toml::from_str(
            r#"
            [runtime]
            max_concurrent_agents = 5

            [rate_limit]
            max_requests_per_minute = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.runtime.max_concurrent_agents, 5);
        assert_eq!(config.runtime.flush_delay_ms, 250);
        assert_eq!(config.rate_limit.max_requests_per_minute, 10);
        assert_eq!(config.rate_limit.max_tokens_per_hour, 1_000_000);
    }
}
