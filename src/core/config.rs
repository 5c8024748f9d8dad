//! Guard Configuration
//!
//! Paths and tunables shared by the policy store, the grant store and the
//! evaluator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::confirm::PermissionHandling;

/// Directory (under the project and home dirs) holding all guard files
pub const KODE_DIR: &str = ".kode";

/// Policy document file name
pub const POLICY_FILE: &str = "bashPermissions.json";

/// Project grant file name
pub const GRANTS_FILE: &str = "permissions.json";

/// Legacy project config file name (read-only `allowedTools` source)
pub const LEGACY_CONFIG_FILE: &str = "config.json";

/// Default lifetime of a once-grant
pub const DEFAULT_ONCE_TTL: Duration = Duration::from_millis(5000);

/// Default lifetime of the merged policy cache
pub const DEFAULT_POLICY_CACHE_TTL: Duration = Duration::from_millis(5000);

/// Default upper bound on a command analysis
pub const DEFAULT_ANALYZER_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the authorization core
///
/// Use the builder pattern to configure it:
///
/// ```ignore
/// let config = GuardConfig::new("/work/project")
///     .with_home_dir("/home/me")
///     .with_restricted(true)
///     .with_analyzer_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Working directory of the session
    pub project_dir: PathBuf,

    /// User home directory (global policy lives here)
    pub home_dir: PathBuf,

    /// Whether tool calls are gated at all
    ///
    /// When false, every call is allowed without consulting any store.
    pub restricted: bool,

    /// Lifetime of a once-grant
    pub once_ttl: Duration,

    /// Lifetime of the merged policy cache
    pub policy_cache_ttl: Duration,

    /// Upper bound on a single command analysis
    pub analyzer_timeout: Duration,

    /// `cd <dir>` sub-commands equal to this directory are skipped during
    /// compound authorization. `None` disables the elision.
    pub elided_cd_dir: Option<PathBuf>,

    /// Automatic answer for decisions that would otherwise prompt
    pub permission_handling: PermissionHandling,
}

impl GuardConfig {
    /// Create a configuration rooted at `project_dir`
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let home_dir = dirs::home_dir().unwrap_or_else(|| project_dir.clone());
        Self {
            elided_cd_dir: Some(project_dir.clone()),
            project_dir,
            home_dir,
            restricted: true,
            once_ttl: DEFAULT_ONCE_TTL,
            policy_cache_ttl: DEFAULT_POLICY_CACHE_TTL,
            analyzer_timeout: DEFAULT_ANALYZER_TIMEOUT,
            permission_handling: PermissionHandling::default(),
        }
    }

    /// Create a configuration for the current directory
    pub fn from_cwd() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Override the home directory
    pub fn with_home_dir(mut self, home_dir: impl Into<PathBuf>) -> Self {
        self.home_dir = home_dir.into();
        self
    }

    /// Enable or disable gating
    pub fn with_restricted(mut self, restricted: bool) -> Self {
        self.restricted = restricted;
        self
    }

    /// Set the once-grant lifetime
    pub fn with_once_ttl(mut self, ttl: Duration) -> Self {
        self.once_ttl = ttl;
        self
    }

    /// Set the policy cache lifetime
    pub fn with_policy_cache_ttl(mut self, ttl: Duration) -> Self {
        self.policy_cache_ttl = ttl;
        self
    }

    /// Set the analyzer timeout
    pub fn with_analyzer_timeout(mut self, timeout: Duration) -> Self {
        self.analyzer_timeout = timeout;
        self
    }

    /// Set (or clear) the directory whose `cd` is elided
    pub fn with_elided_cd_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.elided_cd_dir = dir;
        self
    }

    /// Set the automatic permission handling
    pub fn with_permission_handling(mut self, handling: PermissionHandling) -> Self {
        self.permission_handling = handling;
        self
    }

    /// `<project>/.kode/bashPermissions.json`
    pub fn project_policy_path(&self) -> PathBuf {
        kode_path(&self.project_dir, POLICY_FILE)
    }

    /// `<home>/.kode/bashPermissions.json`
    pub fn global_policy_path(&self) -> PathBuf {
        kode_path(&self.home_dir, POLICY_FILE)
    }

    /// `<project>/.kode/permissions.json`
    pub fn grants_path(&self) -> PathBuf {
        kode_path(&self.project_dir, GRANTS_FILE)
    }

    /// `<project>/.kode/config.json`
    pub fn legacy_config_path(&self) -> PathBuf {
        kode_path(&self.project_dir, LEGACY_CONFIG_FILE)
    }

    /// The `cd <dir>` string elided from compound commands, if any
    pub fn elided_cd_command(&self) -> Option<String> {
        self.elided_cd_dir
            .as_ref()
            .map(|dir| format!("cd {}", dir.display()))
    }
}

fn kode_path(base: &Path, file: &str) -> PathBuf {
    base.join(KODE_DIR).join(file)
}
