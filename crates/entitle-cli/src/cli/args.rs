use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "entitle",
    version,
    about = "License validation and module entitlement against a remote licensing authority"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// YAML configuration file
    #[arg(long, global = true, env = "ENTITLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database (overrides config and ENTITLE_DB)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Actor name recorded in the audit trail
    #[arg(long, global = true, env = "ENTITLE_ACTOR", default_value = "cli")]
    pub actor: String,

    /// Run with read-only (AdminRead) capability
    #[arg(long, global = true)]
    pub read_only: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Point this environment at a licensing authority
    Configure(ConfigureArgs),
    /// Validate the license (cached unless --force)
    Validate(ValidateArgs),
    /// Client secret management
    Secret(SecretArgs),
    /// Module listing and lifecycle
    Modules(ModulesArgs),
    /// Contact lead submission
    Lead(LeadArgs),
    /// Read the audit trail
    Audit(AuditArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConfigureArgs {
    /// Authority base URL (http or https)
    #[arg(long)]
    pub base_url: String,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Ignore the cache and ask the authority
    #[arg(long)]
    pub force: bool,

    /// Run as the scheduled refresh (system caller, never forced)
    #[arg(long, conflicts_with = "force")]
    pub scheduled: bool,

    /// Modules to ask about (repeatable)
    #[arg(long = "module")]
    pub modules: Vec<String>,
}

#[derive(Args, Debug)]
pub struct SecretArgs {
    #[command(subcommand)]
    pub cmd: SecretSub,
}

#[derive(Subcommand, Debug)]
pub enum SecretSub {
    /// Revoke the current secret and provision a new one
    Regenerate,
}

#[derive(Args, Debug)]
pub struct ModulesArgs {
    #[command(subcommand)]
    pub cmd: ModulesSub,
}

#[derive(Subcommand, Debug)]
pub enum ModulesSub {
    /// List modules with their effective entitlement
    List,
    /// Check whether a module is usable
    Usable(ModuleKeyArgs),
    /// List host tables owned by a module
    Tables(ModuleKeyArgs),
    /// Install a module (not enabled)
    Install(ModuleKeyArgs),
    /// Enable an installed module
    Enable(ModuleKeyArgs),
    /// Disable a module, keeping its data
    Disable(ModuleKeyArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ModuleKeyArgs {
    pub key: String,
}

#[derive(Args, Debug)]
pub struct LeadArgs {
    #[command(subcommand)]
    pub cmd: LeadSub,
}

#[derive(Subcommand, Debug)]
pub enum LeadSub {
    /// Send a contact lead to the authority
    Submit(LeadSubmitArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LeadSubmitArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub message: String,

    #[arg(long)]
    pub company: Option<String>,

    /// Modules of interest (repeatable)
    #[arg(long = "module")]
    pub modules: Vec<String>,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    #[command(subcommand)]
    pub cmd: AuditSub,

    /// Maximum records, newest first
    #[arg(long, global = true, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Subcommand, Debug)]
pub enum AuditSub {
    /// Validation attempts
    Validations,
    /// Configuration changes
    Config,
    /// Module state transitions
    Modules,
}
