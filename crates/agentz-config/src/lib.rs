//! Configuration for the agentz control plane.
//!
//! Configuration is loaded in the following order (later sources override
//! earlier ones):
//! 1. **Hardcoded defaults** - Built-in fallback values
//! 2. **User config** - `~/.agentz/config.toml`
//! 3. **Project config** - `./.agentz/config.toml`
//! 4. **Environment variables** - the documented `CLI_*` / `MAX_*` /
//!    `RATE_LIMIT_*` keys (highest priority)

mod errors;
mod loading;
mod types;
mod validation;

pub use errors::ConfigError;
pub use loading::{apply_env_overrides, load_hierarchy, merge_configs};
pub use types::{ControlPlaneConfig, DANGEROUS_COMMANDS, RateLimitConfig, RuntimeConfig};
pub use validation::validate_config;
