//! Built-in banned command list

/// Commands denied unless a policy document exempts them
pub const DEFAULT_BANNED_COMMANDS: &[&str] = &[
    "alias",
    "aria2c",
    "axel",
    "chrome",
    "curl",
    "curlie",
    "del",
    "fdisk",
    "firefox",
    "format",
    "http-prompt",
    "httpie",
    "links",
    "lynx",
    "mkfs",
    "nc",
    "reboot",
    "safari",
    "shutdown",
    "telnet",
    "w3m",
    "wget",
    "xh",
];

/// Default ban list handed to the policy store
///
/// The store never reaches for a global list; whoever builds it decides
/// which defaults apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannedCommands {
    commands: Vec<String>,
}

impl BannedCommands {
    /// A ban list from arbitrary names (matched case-insensitively)
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands
                .into_iter()
                .map(|c| c.into().to_lowercase())
                .collect(),
        }
    }

    /// The built-in list
    pub fn builtin() -> Self {
        Self::new(DEFAULT_BANNED_COMMANDS.iter().copied())
    }

    /// Whether `bare` is banned once `exemptions` are removed
    pub fn is_banned(&self, bare: &str, exemptions: &[String]) -> bool {
        let bare = bare.to_lowercase();
        self.commands.contains(&bare) && !exemptions.iter().any(|e| e.to_lowercase() == bare)
    }

    /// All banned names
    pub fn commands(&self) -> &[String] {
        &self.commands
    }
}

impl Default for BannedCommands {
    fn default() -> Self {
        Self::builtin()
    }
}
