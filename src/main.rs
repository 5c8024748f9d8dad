use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::json;

use shadow_guard::command::HeuristicAnalyzer;
use shadow_guard::core::{GuardConfig, ToolUseContext};
use shadow_guard::grants::GrantStore;
use shadow_guard::logging;
use shadow_guard::permissions::{Decision, PermissionEvaluator};
use shadow_guard::policy::{BannedCommands, PolicyScope, PolicyStore, PrefixPermission, RuleScope};
use shadow_guard::tools::BashTool;

/// Inspect and manage tool-use permissions for a project
#[derive(Parser, Debug)]
#[command(name = "shadow-guard")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Project directory (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show how a shell command would be treated
    Check {
        /// The command line
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Manage persisted project grants
    #[command(name = "approved-tools")]
    ApprovedTools {
        #[command(subcommand)]
        action: ApprovedToolsAction,
    },

    /// Manage the bash policy documents
    #[command(name = "bash-permissions")]
    BashPermissions {
        #[command(subcommand)]
        action: BashPermissionsAction,
    },
}

#[derive(Subcommand, Debug)]
enum ApprovedToolsAction {
    /// List project grants
    List,
    /// Remove a project grant by key, e.g. "Bash(npm test:*)"
    Remove { key: String },
}

#[derive(Subcommand, Debug)]
enum BashPermissionsAction {
    /// Print the merged policy (or one file with --global / --project)
    Show {
        #[arg(long, conflicts_with = "project")]
        global: bool,
        #[arg(long)]
        project: bool,
    },

    /// Add or replace a prefix rule
    AddPrefix {
        prefix: String,
        /// Deny instead of allow
        #[arg(long)]
        deny: bool,
        /// Glob every argument must match (repeatable)
        #[arg(long = "arg")]
        allowed_args: Vec<String>,
        #[arg(long)]
        description: Option<String>,
        /// Write to the global file
        #[arg(long)]
        global: bool,
    },

    /// Remove a prefix rule
    RemovePrefix {
        prefix: String,
        #[arg(long)]
        global: bool,
    },

    /// Turn strict mode on or off
    StrictMode {
        state: Toggle,
        #[arg(long)]
        global: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    Enable,
    Disable,
}

fn scope(global: bool) -> PolicyScope {
    if global {
        PolicyScope::Global
    } else {
        PolicyScope::Project
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.project_dir {
        Some(dir) => GuardConfig::new(dir),
        None => GuardConfig::from_cwd().context("cannot determine the current directory")?,
    };

    let _log_guard = logging::init_logging(&config.home_dir)?;
    tracing::info!("[Cli] Project {}", config.project_dir.display());

    let policy = Arc::new(PolicyStore::new(&config, BannedCommands::builtin()));
    let grants = Arc::new(GrantStore::new(&config));

    match args.command {
        Command::Check { command } => {
            let command = command.join(" ");
            let analyzer = Arc::new(HeuristicAnalyzer::new()?);
            let evaluator =
                PermissionEvaluator::new(&config, policy.clone(), grants.clone(), analyzer);

            let verdict = policy.is_command_allowed(&command).await;
            println!(
                "{} {} ({:?})",
                "policy:".bold(),
                if verdict.allowed {
                    "allowed".green()
                } else {
                    "denied".red()
                },
                verdict.source
            );
            if let Some(reason) = &verdict.reason {
                println!("  {}", reason.dimmed());
            }

            let ctx = ToolUseContext::new("cli");
            let decision = evaluator
                .evaluate(&BashTool, &json!({ "command": command }), &ctx)
                .await;
            match decision {
                Decision::Allow => println!("{} {}", "decision:".bold(), "allow".green()),
                Decision::Deny { reason } => {
                    println!("{} {}", "decision:".bold(), "deny".red());
                    println!("  {}", reason.dimmed());
                }
                Decision::Ask { analysis, .. } => {
                    println!("{} {}", "decision:".bold(), "ask".yellow());
                    if let Some(analysis) = analysis {
                        if analysis.injection_detected() {
                            println!("  {}", "possible command injection".red());
                        } else if let Some(prefix) = analysis.prefix() {
                            println!("  prefix: {}", prefix.cyan());
                        }
                    }
                }
                Decision::Cancelled => println!("{} cancelled", "decision:".bold()),
            }
        }

        Command::ApprovedTools { action } => match action {
            ApprovedToolsAction::List => {
                let approved = grants.list_approved().await;
                if approved.is_empty() {
                    println!("No tools are approved in {}", config.project_dir.display());
                } else {
                    for key in approved {
                        println!("{}", key);
                    }
                }
            }
            ApprovedToolsAction::Remove { key } => {
                if grants.remove_approved(&key).await? {
                    println!("{} {}", "Removed".green(), key);
                } else {
                    println!("{} was not approved", key.yellow());
                }
            }
        },

        Command::BashPermissions { action } => match action {
            BashPermissionsAction::Show { global, project } => {
                let document = if global {
                    policy.load_document(PolicyScope::Global).await
                } else if project {
                    policy.load_document(PolicyScope::Project).await
                } else {
                    policy.merged_config().await
                };
                println!("{}", serde_json::to_string_pretty(&document.pruned())?);
            }
            BashPermissionsAction::AddPrefix {
                prefix,
                deny,
                allowed_args,
                description,
                global,
            } => {
                let mut rule = if deny {
                    PrefixPermission::deny(&prefix)
                } else {
                    PrefixPermission::allow(&prefix)
                };
                if !allowed_args.is_empty() {
                    rule = rule.with_allowed_args(allowed_args);
                }
                if let Some(description) = description {
                    rule = rule.with_description(description);
                }
                rule.scope = Some(if global {
                    RuleScope::Global
                } else {
                    RuleScope::Project
                });

                policy.add_prefix_permission(rule, scope(global)).await?;
                println!(
                    "{} prefix rule for {}",
                    if deny { "Denied".red() } else { "Allowed".green() },
                    prefix.bold()
                );
            }
            BashPermissionsAction::RemovePrefix { prefix, global } => {
                if policy.remove_prefix_permission(&prefix, scope(global)).await? {
                    println!("{} prefix rule for {}", "Removed".green(), prefix.bold());
                } else {
                    println!("No prefix rule for {}", prefix.yellow());
                }
            }
            BashPermissionsAction::StrictMode { state, global } => {
                let strict = matches!(state, Toggle::Enable);
                policy.set_strict_mode(strict, scope(global)).await?;
                println!(
                    "Strict mode {}",
                    if strict { "enabled".yellow() } else { "disabled".green() }
                );
            }
        },
    }

    Ok(())
}
