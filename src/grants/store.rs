//! Grant store implementation
//!
//! Three lifetimes:
//! - **Project**: `.kode/permissions.json`, the one canonical on-disk store
//! - **Session**: in memory for the life of the process
//! - **Once**: in memory, timestamped, valid while younger than the TTL
//!
//! The legacy project config (`.kode/config.json`) is still read for its
//! `allowedTools`, but nothing is ever written there.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::key::permission_key;
use crate::core::persist::{read_json_document, write_json_document};
use crate::core::{system_clock, Clock, GuardConfig, GuardError, GuardResult};
use crate::tools::{Tool, ToolKind};

/// Lifetime of a grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantScope {
    /// Single use, expires after the once TTL
    Once,
    /// Until the process exits
    Session,
    /// Persisted to the project grant file
    Project,
}

/// Where a matching grant was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantSource {
    /// Legacy project config `allowedTools`
    LegacyConfig,
    /// `.kode/permissions.json`
    ProjectFile,
    /// Session grants
    Session,
    /// An unexpired once-grant
    Once,
}

/// On-disk shape of the project grant file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRecord {
    /// Sorted, de-duplicated permission keys
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
}

impl GrantRecord {
    fn from_value(value: &Value) -> Self {
        Self {
            allowed_tools: allowed_tools_of(value),
        }
    }

    /// Insert keeping the list sorted; returns false if already present
    pub fn insert(&mut self, key: &str) -> bool {
        match self.allowed_tools.binary_search_by(|k| k.as_str().cmp(key)) {
            Ok(_) => false,
            Err(pos) => {
                self.allowed_tools.insert(pos, key.to_string());
                true
            }
        }
    }

    fn normalize(&mut self) {
        self.allowed_tools.sort();
        self.allowed_tools.dedup();
    }
}

fn allowed_tools_of(value: &Value) -> Vec<String> {
    match value.get("allowedTools") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        Some(other) => {
            tracing::warn!("[GrantStore] Ignoring non-array allowedTools: {}", other);
            Vec::new()
        }
        None => Vec::new(),
    }
}

/// Point-in-time view of every grant source
#[derive(Debug, Clone, Default)]
pub struct GrantSnapshot {
    /// Legacy config `allowedTools`
    pub legacy_allowed: Vec<String>,
    /// Project grant file `allowedTools`
    pub project_allowed: Vec<String>,
    /// Session grants
    pub session_allowed: BTreeSet<String>,
    /// Unexpired once-grants (key -> granted at, epoch ms)
    pub once_allowed: HashMap<String, i64>,
}

impl GrantSnapshot {
    /// First source holding `key`, in check order
    pub fn find(&self, key: &str) -> Option<GrantSource> {
        if self.legacy_allowed.iter().any(|k| k == key) {
            Some(GrantSource::LegacyConfig)
        } else if self.project_allowed.iter().any(|k| k == key) {
            Some(GrantSource::ProjectFile)
        } else if self.session_allowed.contains(key) {
            Some(GrantSource::Session)
        } else if self.once_allowed.contains_key(key) {
            Some(GrantSource::Once)
        } else {
            None
        }
    }

    /// Whether any source holds `key`
    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Whether `key` is in one of the on-disk sources
    pub fn persisted_contains(&self, key: &str) -> bool {
        matches!(
            self.find(key),
            Some(GrantSource::LegacyConfig | GrantSource::ProjectFile)
        )
    }
}

/// Persisted and volatile user decisions
#[derive(Debug)]
pub struct GrantStore {
    grants_path: PathBuf,
    legacy_path: PathBuf,
    once_ttl: Duration,
    clock: Arc<dyn Clock>,
    session: Mutex<BTreeSet<String>>,
    once: Mutex<HashMap<String, i64>>,
    /// Held across every read-modify-write of the grant file
    write_lock: tokio::sync::Mutex<()>,
}

impl GrantStore {
    /// Create a store for the paths in `config`
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            grants_path: config.grants_path(),
            legacy_path: config.legacy_config_path(),
            once_ttl: config.once_ttl,
            clock: system_clock(),
            session: Mutex::new(BTreeSet::new()),
            once: Mutex::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Use a different clock for once-grant expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Path of the canonical project grant file
    pub fn grants_path(&self) -> &Path {
        &self.grants_path
    }

    async fn read_record(&self) -> GrantRecord {
        read_json_document(&self.grants_path)
            .await
            .map(|v| GrantRecord::from_value(&v))
            .unwrap_or_default()
    }

    /// Read every source fresh from disk and memory
    pub async fn snapshot(&self) -> GrantSnapshot {
        let legacy_allowed = read_json_document(&self.legacy_path)
            .await
            .map(|v| allowed_tools_of(&v))
            .unwrap_or_default();
        let project_allowed = self.read_record().await.allowed_tools;

        let session_allowed = self
            .session
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();

        let now = self.clock.now_millis();
        let ttl = self.once_ttl.as_millis() as i64;
        let once_allowed = match self.once.lock() {
            Ok(mut once) => {
                once.retain(|_, granted_at| now - *granted_at < ttl);
                once.clone()
            }
            Err(_) => HashMap::new(),
        };

        GrantSnapshot {
            legacy_allowed,
            project_allowed,
            session_allowed,
            once_allowed,
        }
    }

    /// Whether `key` is granted in any scope right now
    pub async fn is_granted(&self, key: &str) -> bool {
        self.snapshot().await.contains(key)
    }

    /// Record a user decision.
    ///
    /// Filesystem-mutation tools always get a session grant whatever `scope`
    /// asks for; the returned scope is the one actually used.
    pub async fn save(
        &self,
        tool: &dyn Tool,
        input: &Value,
        prefix: Option<&str>,
        scope: GrantScope,
    ) -> GuardResult<GrantScope> {
        let key = permission_key(tool, input, prefix);

        if tool.kind() == ToolKind::FileMutation {
            self.grant_session(&key)?;
            return Ok(GrantScope::Session);
        }

        match scope {
            GrantScope::Project => {
                let _guard = self.write_lock.lock().await;
                let mut record = self.read_record().await;
                record.normalize();
                if record.insert(&key) {
                    write_json_document(&self.grants_path, &record).await?;
                    tracing::info!("[GrantStore] Saved project grant {}", key);
                } else {
                    tracing::debug!("[GrantStore] Project grant {} already present", key);
                }
            }
            GrantScope::Session => self.grant_session(&key)?,
            GrantScope::Once => {
                let now = self.clock.now_millis();
                self.once
                    .lock()
                    .map_err(|_| GuardError::other("once-grant lock poisoned"))?
                    .insert(key.clone(), now);
                tracing::info!("[GrantStore] Granted {} once", key);
            }
        }

        Ok(scope)
    }

    fn grant_session(&self, key: &str) -> GuardResult<()> {
        let inserted = self
            .session
            .lock()
            .map_err(|_| GuardError::other("session-grant lock poisoned"))?
            .insert(key.to_string());
        if inserted {
            tracing::info!("[GrantStore] Granted {} for this session", key);
        }
        Ok(())
    }

    /// Persisted project grants, sorted
    pub async fn list_approved(&self) -> Vec<String> {
        let mut record = self.read_record().await;
        record.normalize();
        record.allowed_tools
    }

    /// Remove a persisted project grant; returns whether it was present
    pub async fn remove_approved(&self, key: &str) -> GuardResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.read_record().await;
        let before = record.allowed_tools.len();
        record.allowed_tools.retain(|k| k != key);
        if record.allowed_tools.len() == before {
            return Ok(false);
        }
        record.normalize();
        write_json_document(&self.grants_path, &record).await?;
        tracing::info!("[GrantStore] Removed project grant {}", key);
        Ok(true)
    }

    /// Drop all session and once grants
    pub fn clear_volatile(&self) {
        if let Ok(mut session) = self.session.lock() {
            session.clear();
        }
        if let Ok(mut once) = self.once.lock() {
            once.clear();
        }
    }
}
