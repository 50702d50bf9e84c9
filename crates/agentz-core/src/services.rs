//! Process-wide collaborators, wired once and threaded through handlers.

use std::path::Path;

use agentz_config::ControlPlaneConfig;
use agentz_paths::ControlPlanePaths;
use agentz_store::EventStore;

use crate::process::ProcessMonitor;
use crate::ratelimit::RateLimiter;

/// The control plane's collaborators for one repository.
///
/// Everything with an init-once lifecycle lives here (store, monitor,
/// limiter, config); handlers borrow `Services` instead of reaching for
/// globals. Cheap to clone — all members share their interior state.
#[derive(Debug, Clone)]
pub struct Services {
    pub config: ControlPlaneConfig,
    pub paths: ControlPlanePaths,
    pub store: EventStore,
    pub monitor: ProcessMonitor,
    pub limiter: RateLimiter,
}

impl Services {
    pub fn new(repo_root: &Path, config: ControlPlaneConfig) -> Self {
        let paths = ControlPlanePaths::for_repo(repo_root);
        Self {
            store: EventStore::new(paths.clone()),
            monitor: ProcessMonitor::new(paths.clone()),
            limiter: RateLimiter::new(config.rate_limit.clone()),
            paths,
            config,
        }
    }

    pub fn repo_root(&self) -> &Path {
        self.paths.repo_root()
    }
}
