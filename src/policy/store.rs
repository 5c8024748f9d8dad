//! Policy store implementation
//!
//! Loads the project and global policy documents, merges them, caches the
//! pair for a short TTL and answers `is_command_allowed`. Every write through
//! the store drops the cache before returning. Writes are serialized by a
//! store-wide lock, and a write generation keeps a load that raced a write
//! from refilling the cache with the old documents.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::defaults::BannedCommands;
use super::document::{merge_configs, BashPermissionConfig, PrefixPermission};
use crate::command::tokenize;
use crate::core::persist::{read_json_document, write_json_document};
use crate::core::{system_clock, Clock, GuardConfig, GuardResult};

/// Which policy file a mutation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyScope {
    /// `<project>/.kode/bashPermissions.json`
    Project,
    /// `<home>/.kode/bashPermissions.json`
    Global,
}

/// Which rule produced a verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictSource {
    /// `globallyBannedCommands`
    GloballyBanned,
    /// `globallyAllowedCommands`
    GloballyAllowed,
    /// A prefix rule (carries the prefix)
    PrefixRule(String),
    /// The effective ban list
    BannedList,
    /// Strict mode default deny
    StrictMode,
    /// Nothing matched
    Default,
}

/// Answer of `is_command_allowed`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandVerdict {
    /// Whether the policy admits the command
    pub allowed: bool,
    /// Why it was denied
    pub reason: Option<String>,
    /// Rule that decided
    pub source: VerdictSource,
}

impl CommandVerdict {
    fn allow(source: VerdictSource) -> Self {
        Self {
            allowed: true,
            reason: None,
            source,
        }
    }

    fn deny(source: VerdictSource, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            source,
        }
    }

    /// Allowed by a rule naming the command, not merely by default
    pub fn is_explicit_allow(&self) -> bool {
        self.allowed
            && matches!(
                self.source,
                VerdictSource::GloballyAllowed | VerdictSource::PrefixRule(_)
            )
    }
}

#[derive(Debug, Clone)]
struct CachedPolicy {
    global: BashPermissionConfig,
    project: BashPermissionConfig,
    loaded_at: i64,
}

/// Layered bash policy store
#[derive(Debug)]
pub struct PolicyStore {
    global_path: PathBuf,
    project_path: PathBuf,
    banned: BannedCommands,
    cache_ttl: Duration,
    clock: Arc<dyn Clock>,
    cache: Mutex<Option<CachedPolicy>>,
    /// Bumped on every invalidation
    generation: AtomicU64,
    /// Held across every write, including load-modify-save mutations
    write_lock: tokio::sync::Mutex<()>,
}

impl PolicyStore {
    /// Create a store for the paths in `config`
    pub fn new(config: &GuardConfig, banned: BannedCommands) -> Self {
        Self {
            global_path: config.global_policy_path(),
            project_path: config.project_policy_path(),
            banned,
            cache_ttl: config.policy_cache_ttl,
            clock: system_clock(),
            cache: Mutex::new(None),
            generation: AtomicU64::new(0),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Use a different clock for cache expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Path of the file behind `scope`
    pub fn path(&self, scope: PolicyScope) -> &PathBuf {
        match scope {
            PolicyScope::Project => &self.project_path,
            PolicyScope::Global => &self.global_path,
        }
    }

    /// The injected default ban list
    pub fn banned_commands(&self) -> &BannedCommands {
        &self.banned
    }

    /// Load one document straight from disk, bypassing the cache.
    ///
    /// Missing or malformed files yield an empty document.
    pub async fn load_document(&self, scope: PolicyScope) -> BashPermissionConfig {
        let path = self.path(scope);
        match read_json_document(path).await {
            Some(value) => BashPermissionConfig::from_value(&value),
            None => BashPermissionConfig::default(),
        }
    }

    /// Merged global + project policy, cached for the configured TTL
    pub async fn merged_config(&self) -> BashPermissionConfig {
        let now = self.clock.now_millis();
        if let Some(cached) = self.cached(now) {
            return merge_configs(&cached.global, &cached.project);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let global = self.load_document(PolicyScope::Global).await;
        let project = self.load_document(PolicyScope::Project).await;
        let merged = merge_configs(&global, &project);

        tracing::debug!(
            "[PolicyStore] Loaded policy ({} prefix rules, strict: {})",
            merged.prefix_rules().len(),
            merged.is_strict()
        );

        self.store_cache(
            generation,
            CachedPolicy {
                global,
                project,
                loaded_at: now,
            },
        );

        merged
    }

    /// Cache `entry` unless the store was invalidated since `generation`
    fn store_cache(&self, generation: u64, entry: CachedPolicy) -> bool {
        let Ok(mut cache) = self.cache.lock() else {
            return false;
        };
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("[PolicyStore] Policy changed during load; not caching");
            return false;
        }
        *cache = Some(entry);
        true
    }

    fn cached(&self, now: i64) -> Option<CachedPolicy> {
        let cache = self.cache.lock().ok()?;
        cache
            .as_ref()
            .filter(|c| now - c.loaded_at < self.cache_ttl.as_millis() as i64)
            .cloned()
    }

    /// Forget the cached documents
    pub fn clear_cache(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut cache) = self.cache.lock() {
            *cache = None;
        }
    }

    /// Whether the merged policy admits `command`
    pub async fn is_command_allowed(&self, command: &str) -> CommandVerdict {
        let config = self.merged_config().await;
        let verdict = check_command(&config, &self.banned, command);
        if !verdict.allowed {
            tracing::info!(
                "[PolicyStore] Denied '{}': {}",
                command,
                verdict.reason.as_deref().unwrap_or("policy")
            );
        }
        verdict
    }

    /// Write `config` to the file behind `scope`, pruning default fields
    pub async fn save_config(
        &self,
        config: &BashPermissionConfig,
        scope: PolicyScope,
    ) -> GuardResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_config(config, scope).await
    }

    /// Write without taking the lock; callers hold `write_lock`
    async fn write_config(
        &self,
        config: &BashPermissionConfig,
        scope: PolicyScope,
    ) -> GuardResult<()> {
        let path = self.path(scope);
        let result = write_json_document(path, &config.pruned()).await;
        self.clear_cache();

        match &result {
            Ok(()) => tracing::info!("[PolicyStore] Saved {}", path.display()),
            Err(e) => tracing::error!("[PolicyStore] Failed to save {}: {}", path.display(), e),
        }
        result
    }

    /// Add (or replace) the rule for `permission.prefix` in `scope`
    pub async fn add_prefix_permission(
        &self,
        permission: PrefixPermission,
        scope: PolicyScope,
    ) -> GuardResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut config = self.load_document(scope).await;
        let mut rules = config.prefix_permissions.take().unwrap_or_default();
        rules.retain(|r| r.prefix != permission.prefix);
        rules.push(permission);
        config.prefix_permissions = Some(rules);
        self.write_config(&config, scope).await
    }

    /// Remove the rule for `prefix` from `scope`; returns whether one existed
    pub async fn remove_prefix_permission(
        &self,
        prefix: &str,
        scope: PolicyScope,
    ) -> GuardResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut config = self.load_document(scope).await;
        let Some(rules) = config.prefix_permissions.as_mut() else {
            return Ok(false);
        };
        let before = rules.len();
        rules.retain(|r| r.prefix != prefix);
        if rules.len() == before {
            return Ok(false);
        }
        self.write_config(&config, scope).await?;
        Ok(true)
    }

    /// Turn strict mode on or off in `scope`
    pub async fn set_strict_mode(&self, strict: bool, scope: PolicyScope) -> GuardResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut config = self.load_document(scope).await;
        config.strict_mode = Some(strict);
        self.write_config(&config, scope).await
    }
}

/// Leading word of a command, lowercased
pub fn bare_command(command: &str) -> String {
    command
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase()
}

fn list_contains(list: &Option<Vec<String>>, bare: &str) -> bool {
    list.iter()
        .flatten()
        .any(|entry| entry.to_lowercase() == bare)
}

/// Evaluate `command` against a merged policy.
///
/// Order: global bans, global allows, longest prefix rule, effective ban
/// list, then default allow (or deny in strict mode).
pub fn check_command(
    config: &BashPermissionConfig,
    banned: &BannedCommands,
    command: &str,
) -> CommandVerdict {
    let bare = bare_command(command);

    if list_contains(&config.globally_banned_commands, &bare) {
        return CommandVerdict::deny(
            VerdictSource::GloballyBanned,
            format!("Command '{}' is globally banned", bare),
        );
    }

    if list_contains(&config.globally_allowed_commands, &bare) {
        return CommandVerdict::allow(VerdictSource::GloballyAllowed);
    }

    if let Some(rule) = find_prefix_permission(command, config.prefix_rules()) {
        let source = VerdictSource::PrefixRule(rule.prefix.clone());
        if !rule.allowed {
            return CommandVerdict::deny(
                source,
                format!("Command prefix '{}' is not allowed", rule.prefix),
            );
        }
        if let Some(patterns) = &rule.allowed_args {
            if !args_allowed(command, &rule.prefix, patterns) {
                return CommandVerdict::deny(
                    source,
                    format!("Command arguments not allowed for prefix '{}'", rule.prefix),
                );
            }
        }
        return CommandVerdict::allow(source);
    }

    let exemptions = config.override_banned_commands.as_deref().unwrap_or(&[]);
    if banned.is_banned(&bare, exemptions) {
        return CommandVerdict::deny(
            VerdictSource::BannedList,
            format!("Command '{}' is not allowed for security reasons", bare),
        );
    }

    if config.is_strict() {
        return CommandVerdict::deny(
            VerdictSource::StrictMode,
            format!("Command '{}' is not explicitly allowed in strict mode", bare),
        );
    }

    CommandVerdict::allow(VerdictSource::Default)
}

/// Longest matching prefix rule; earlier rules win ties
fn find_prefix_permission<'a>(
    command: &str,
    rules: &'a [PrefixPermission],
) -> Option<&'a PrefixPermission> {
    let mut sorted: Vec<&PrefixPermission> = rules.iter().collect();
    sorted.sort_by(|a, b| b.prefix.trim().len().cmp(&a.prefix.trim().len()));
    sorted.into_iter().find(|rule| rule.matches(command))
}

/// Every argument after the prefix must match one of `patterns`
fn args_allowed(command: &str, prefix: &str, patterns: &[String]) -> bool {
    let skip = prefix.split_whitespace().count();
    let args: Vec<String> = tokenize(command).into_iter().skip(skip).collect();

    if args.is_empty() {
        return patterns.iter().any(|p| p.is_empty() || p == "*");
    }

    args.iter()
        .all(|arg| patterns.iter().any(|pattern| arg_matches(arg, pattern)))
}

fn arg_matches(arg: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    match glob::Pattern::new(pattern) {
        Ok(glob) => glob.matches(arg),
        Err(_) => arg == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn strings(items: &[&str]) -> Option<Vec<String>> {
        Some(items.iter().map(|s| s.to_string()).collect())
    }

    fn check(config: &BashPermissionConfig, command: &str) -> bool {
        check_command(config, &BannedCommands::builtin(), command).allowed
    }

    fn create_test_store() -> (PolicyStore, Arc<ManualClock>, TempDir) {
        let temp = TempDir::new().unwrap();
        let config = GuardConfig::new(temp.path().join("project"))
            .with_home_dir(temp.path().join("home"));
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = PolicyStore::new(&config, BannedCommands::builtin()).with_clock(clock.clone());
        (store, clock, temp)
    }

    #[test]
    fn test_override_exempts_from_builtin_bans() {
        let config = BashPermissionConfig {
            strict_mode: Some(false),
            override_banned_commands: strings(&["curl"]),
            globally_allowed_commands: strings(&["git"]),
            ..Default::default()
        };

        assert!(check(&config, "curl https://x"));
        assert!(!check(&config, "format c:"));
        assert!(!check(&config, "wget file.txt"));
    }

    #[test]
    fn test_strict_mode_default_deny() {
        let config = BashPermissionConfig {
            strict_mode: Some(true),
            globally_allowed_commands: strings(&["ls"]),
            ..Default::default()
        };

        assert!(check(&config, "ls -la"));
        let verdict = check_command(&config, &BannedCommands::builtin(), "node app.js");
        assert!(!verdict.allowed);
        assert_eq!(verdict.source, VerdictSource::StrictMode);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let config = BashPermissionConfig {
            prefix_permissions: Some(vec![
                PrefixPermission::allow("git"),
                PrefixPermission::deny("git push"),
            ]),
            ..Default::default()
        };

        assert!(check(&config, "git status"));
        let verdict = check_command(&config, &BannedCommands::builtin(), "git push origin main");
        assert!(!verdict.allowed);
        assert_eq!(verdict.source, VerdictSource::PrefixRule("git push".into()));
    }

    #[test]
    fn test_global_ban_beats_everything() {
        let config = BashPermissionConfig {
            globally_banned_commands: strings(&["rm"]),
            globally_allowed_commands: strings(&["rm"]),
            prefix_permissions: Some(vec![PrefixPermission::allow("rm")]),
            ..Default::default()
        };

        let verdict = check_command(&config, &BannedCommands::builtin(), "rm -rf build");
        assert!(!verdict.allowed);
        assert_eq!(verdict.source, VerdictSource::GloballyBanned);
        assert_eq!(verdict.reason.as_deref(), Some("Command 'rm' is globally banned"));
    }

    #[test]
    fn test_allowed_args_globs() {
        let config = BashPermissionConfig {
            prefix_permissions: Some(vec![
                PrefixPermission::allow("rm").with_allowed_args(["*.tmp", "*.log", "--help"]),
                PrefixPermission::allow("curl")
                    .with_allowed_args(["*.example.com", "localhost:*", "-h"]),
            ]),
            ..Default::default()
        };

        assert!(check(&config, "rm test.tmp"));
        assert!(check(&config, "rm a.tmp b.log"));
        assert!(check(&config, "rm --help"));
        assert!(!check(&config, "rm test.txt"));
        assert!(!check(&config, "rm -rf test.tmp"));
        assert!(check(&config, "curl localhost:8080"));
        assert!(check(&config, "curl api.example.com"));
        assert!(!check(&config, "curl https://google.com"));
        assert!(!check(&config, "rm"));
    }

    #[test]
    fn test_no_args_need_explicit_empty_pattern() {
        let config = BashPermissionConfig {
            prefix_permissions: Some(vec![
                PrefixPermission::allow("make").with_allowed_args([""]),
                PrefixPermission::allow("cargo build").with_allowed_args(["*"]),
            ]),
            ..Default::default()
        };

        assert!(check(&config, "make"));
        assert!(!check(&config, "make install"));
        assert!(check(&config, "cargo build"));
        assert!(check(&config, "cargo build --release"));
    }

    #[test]
    fn test_static_bans_without_config() {
        let config = BashPermissionConfig::default();
        assert!(!check(&config, "curl example.com"));
        assert!(check(&config, "npm install"));
        assert!(check(&config, ""));
    }

    #[tokio::test]
    async fn test_project_overrides_global_on_disk() {
        let (store, _clock, _temp) = create_test_store();

        store
            .save_config(
                &BashPermissionConfig {
                    strict_mode: Some(true),
                    globally_allowed_commands: strings(&["python"]),
                    ..Default::default()
                },
                PolicyScope::Global,
            )
            .await
            .unwrap();
        store
            .save_config(
                &BashPermissionConfig {
                    globally_allowed_commands: strings(&["node"]),
                    ..Default::default()
                },
                PolicyScope::Project,
            )
            .await
            .unwrap();

        assert!(store.is_command_allowed("node app.js").await.allowed);
        assert!(!store.is_command_allowed("python x.py").await.allowed);
    }

    #[tokio::test]
    async fn test_cache_ttl_and_invalidation() {
        let (store, clock, _temp) = create_test_store();
        assert!(store.is_command_allowed("node app.js").await.allowed);

        // An out-of-band edit is not seen while the cache is fresh
        let path = store.path(PolicyScope::Project).clone();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"strictMode": true}"#).unwrap();
        clock.advance(1_000);
        assert!(store.is_command_allowed("node app.js").await.allowed);

        // ...and is seen once the TTL has passed
        clock.advance(4_500);
        assert!(!store.is_command_allowed("node app.js").await.allowed);

        // Writes through the store invalidate immediately
        store.set_strict_mode(false, PolicyScope::Project).await.unwrap();
        assert!(store.is_command_allowed("node app.js").await.allowed);
    }

    #[tokio::test]
    async fn test_load_racing_a_write_is_not_cached() {
        let (store, _clock, _temp) = create_test_store();

        // A reader loads the old documents, then a write lands before it caches
        let generation = store.generation.load(Ordering::SeqCst);
        let global = store.load_document(PolicyScope::Global).await;
        let project = store.load_document(PolicyScope::Project).await;
        store.set_strict_mode(true, PolicyScope::Project).await.unwrap();

        let stale = CachedPolicy {
            global,
            project,
            loaded_at: store.clock.now_millis(),
        };
        assert!(!store.store_cache(generation, stale));
        assert!(!store.is_command_allowed("node app.js").await.allowed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reads_and_write_see_the_write() {
        for _ in 0..20 {
            let (store, _clock, _temp) = create_test_store();

            let (_, written, _) = tokio::join!(
                store.merged_config(),
                store.set_strict_mode(true, PolicyScope::Project),
                store.merged_config(),
            );
            written.unwrap();

            assert!(store.merged_config().await.is_strict());
            assert!(!store.is_command_allowed("node app.js").await.allowed);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mutations_keep_every_change() {
        for _ in 0..20 {
            let (store, _clock, _temp) = create_test_store();

            let (a, b, c) = tokio::join!(
                store.add_prefix_permission(PrefixPermission::allow("npm test"), PolicyScope::Project),
                store.add_prefix_permission(PrefixPermission::deny("git push"), PolicyScope::Project),
                store.set_strict_mode(true, PolicyScope::Project),
            );
            a.unwrap();
            b.unwrap();
            c.unwrap();

            let doc = store.load_document(PolicyScope::Project).await;
            assert_eq!(doc.prefix_rules().len(), 2);
            assert!(doc.prefix_rules().contains(&PrefixPermission::allow("npm test")));
            assert!(doc.prefix_rules().contains(&PrefixPermission::deny("git push")));
            assert!(doc.is_strict());
        }
    }

    #[tokio::test]
    async fn test_add_and_remove_prefix_permission() {
        let (store, _clock, _temp) = create_test_store();

        store
            .add_prefix_permission(PrefixPermission::deny("git push"), PolicyScope::Project)
            .await
            .unwrap();
        store
            .add_prefix_permission(PrefixPermission::allow("git push"), PolicyScope::Project)
            .await
            .unwrap();

        let doc = store.load_document(PolicyScope::Project).await;
        assert_eq!(doc.prefix_rules(), &[PrefixPermission::allow("git push")]);

        assert!(store
            .remove_prefix_permission("git push", PolicyScope::Project)
            .await
            .unwrap());
        assert!(!store
            .remove_prefix_permission("git push", PolicyScope::Project)
            .await
            .unwrap());

        // Nothing leaked into the global file
        assert_eq!(
            store.load_document(PolicyScope::Global).await,
            BashPermissionConfig::default()
        );
    }

    #[tokio::test]
    async fn test_save_load_save_is_byte_identical() {
        let (store, _clock, _temp) = create_test_store();
        let config = BashPermissionConfig::from_value(&json!({
            "overrideBannedCommands": ["curl"],
            "prefixPermissions": [
                {"prefix": "rm", "description": "tmp only", "allowed": true, "allowedArgs": ["*.tmp"], "scope": "project"}
            ],
            "globallyAllowedCommands": [],
            "strictMode": false
        }));

        store.save_config(&config, PolicyScope::Project).await.unwrap();
        let first = std::fs::read_to_string(store.path(PolicyScope::Project)).unwrap();

        let reloaded = store.load_document(PolicyScope::Project).await;
        store.save_config(&reloaded, PolicyScope::Project).await.unwrap();
        let second = std::fs::read_to_string(store.path(PolicyScope::Project)).unwrap();

        assert_eq!(first, second);
        assert!(!first.contains("strictMode"));
        assert!(!first.contains("globallyAllowedCommands"));
    }

    #[tokio::test]
    async fn test_malformed_file_is_default() {
        let (store, _clock, _temp) = create_test_store();
        let path = store.path(PolicyScope::Project).clone();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{{{").unwrap();

        assert_eq!(
            store.load_document(PolicyScope::Project).await,
            BashPermissionConfig::default()
        );
        assert!(store.is_command_allowed("ls").await.allowed);
    }
}
