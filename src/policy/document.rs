//! Bash policy documents
//!
//! A `BashPermissionConfig` is what `.kode/bashPermissions.json` holds, in
//! either the project or the home directory. Unset fields stay `None` so the
//! layered merge can tell "not configured" from "configured empty".

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a prefix rule is meant to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    /// Every project
    Global,
    /// This project
    Project,
    /// This session
    Session,
}

/// A prefix rule; longer prefixes take precedence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefixPermission {
    /// Leading words of the command this rule covers
    pub prefix: String,

    /// Free-form note shown in listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether matching commands are allowed
    pub allowed: bool,

    /// Glob patterns every argument must match (`""`/`"*"` admit no-arg use)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_args: Option<Vec<String>>,

    /// Intended scope of the rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<RuleScope>,
}

impl PrefixPermission {
    /// Rule allowing `prefix`
    pub fn allow(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            description: None,
            allowed: true,
            allowed_args: None,
            scope: None,
        }
    }

    /// Rule denying `prefix`
    pub fn deny(prefix: impl Into<String>) -> Self {
        Self {
            allowed: false,
            ..Self::allow(prefix)
        }
    }

    /// Restrict the arguments this rule admits
    pub fn with_allowed_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether `command` starts with this rule's prefix on a word boundary
    pub fn matches(&self, command: &str) -> bool {
        let prefix = self.prefix.trim();
        if prefix.is_empty() {
            return false;
        }
        let command = command.trim();
        match command.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
            None => false,
        }
    }
}

/// Policy document, project and global variants share the shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BashPermissionConfig {
    /// Built-in banned commands that are no longer banned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_banned_commands: Option<Vec<String>>,

    /// Prefix rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_permissions: Option<Vec<PrefixPermission>>,

    /// Commands allowed whatever else is configured (except global bans)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub globally_allowed_commands: Option<Vec<String>>,

    /// Commands denied whatever else is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub globally_banned_commands: Option<Vec<String>>,

    /// Deny anything not explicitly allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_mode: Option<bool>,
}

impl BashPermissionConfig {
    /// Build a document from raw JSON, keeping every well-formed field.
    ///
    /// A field of the wrong type is dropped with a warning rather than
    /// discarding the whole document; malformed prefix rules are skipped.
    pub fn from_value(value: &Value) -> Self {
        fn string_list(value: &Value, field: &str) -> Option<Vec<String>> {
            let raw = value.get(field)?;
            match serde_json::from_value::<Vec<String>>(raw.clone()) {
                Ok(list) => Some(list),
                Err(e) => {
                    tracing::warn!("[PolicyStore] Ignoring '{}': {}", field, e);
                    None
                }
            }
        }

        let prefix_permissions = match value.get("prefixPermissions") {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|item| match PrefixPermission::deserialize(item) {
                        Ok(rule) => Some(rule),
                        Err(e) => {
                            tracing::warn!("[PolicyStore] Skipping prefix rule {}: {}", item, e);
                            None
                        }
                    })
                    .collect(),
            ),
            Some(other) => {
                tracing::warn!("[PolicyStore] Ignoring 'prefixPermissions': {}", other);
                None
            }
            None => None,
        };

        let strict_mode = match value.get("strictMode") {
            Some(Value::Bool(b)) => Some(*b),
            Some(other) => {
                tracing::warn!("[PolicyStore] Ignoring 'strictMode': {}", other);
                None
            }
            None => None,
        };

        Self {
            override_banned_commands: string_list(value, "overrideBannedCommands"),
            prefix_permissions,
            globally_allowed_commands: string_list(value, "globallyAllowedCommands"),
            globally_banned_commands: string_list(value, "globallyBannedCommands"),
            strict_mode,
        }
    }

    /// Drop fields that carry only default values (empty lists, `false`)
    pub fn pruned(&self) -> Self {
        fn non_empty<T: Clone>(list: &Option<Vec<T>>) -> Option<Vec<T>> {
            list.as_ref().filter(|l| !l.is_empty()).cloned()
        }

        Self {
            override_banned_commands: non_empty(&self.override_banned_commands),
            prefix_permissions: non_empty(&self.prefix_permissions),
            globally_allowed_commands: non_empty(&self.globally_allowed_commands),
            globally_banned_commands: non_empty(&self.globally_banned_commands),
            strict_mode: self.strict_mode.filter(|strict| *strict),
        }
    }

    /// Prefix rules, or an empty slice
    pub fn prefix_rules(&self) -> &[PrefixPermission] {
        self.prefix_permissions.as_deref().unwrap_or(&[])
    }

    /// Whether strict mode is on
    pub fn is_strict(&self) -> bool {
        self.strict_mode.unwrap_or(false)
    }
}

/// Merge a global and a project document.
///
/// Project fields override global ones and list fields are replaced
/// wholesale, except `prefixPermissions`, which is `global ++ project`.
pub fn merge_configs(
    global: &BashPermissionConfig,
    project: &BashPermissionConfig,
) -> BashPermissionConfig {
    let prefix_permissions = match (&global.prefix_permissions, &project.prefix_permissions) {
        (None, None) => None,
        (g, p) => Some(
            g.iter()
                .flatten()
                .chain(p.iter().flatten())
                .cloned()
                .collect(),
        ),
    };

    BashPermissionConfig {
        override_banned_commands: project
            .override_banned_commands
            .clone()
            .or_else(|| global.override_banned_commands.clone()),
        prefix_permissions,
        globally_allowed_commands: project
            .globally_allowed_commands
            .clone()
            .or_else(|| global.globally_allowed_commands.clone()),
        globally_banned_commands: project
            .globally_banned_commands
            .clone()
            .or_else(|| global.globally_banned_commands.clone()),
        strict_mode: project.strict_mode.or(global.strict_mode),
    }
}
