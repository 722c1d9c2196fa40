//! Banlist - access-control administration CLI
//!
//! The `banlist` command inspects and edits the deny/allow state shared with
//! the bot.
//!
//! ## Commands
//!
//! - `check`: Show whether a user is blocked in a conversation
//! - `add`: Create a record or add time to it
//! - `dec`: Subtract time from a record, or remove it
//! - `reset`: Remove a user from every collection
//! - `list`: Show the records relevant to a conversation
//! - `reconcile`: Drop expired and redundant records

use anyhow::{bail, Context, Result};
use banlist_core::{
    init_tracing, AccessControl, AclConfig, AddOutcome, DecrementOutcome, Target, Verdict,
};
use banlist_state::FsRecordStore;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, Level};

type Acl = AccessControl<FsRecordStore>;

#[derive(Parser)]
#[command(name = "banlist")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Manage conversation and global deny/allow lists", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON results
    #[arg(long, global = true)]
    json: bool,

    /// TOML config file
    #[arg(long, global = true, env = "BANLIST_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides config and BANLIST_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether a user is blocked in a conversation
    Check {
        /// Conversation ID
        #[arg(short, long)]
        conversation: String,

        /// User ID
        user: String,
    },

    /// Create a record, or add time to an existing one
    Add {
        #[command(flatten)]
        record: RecordArgs,
    },

    /// Subtract time from a record; a duration of 0 removes it
    Dec {
        #[command(flatten)]
        record: RecordArgs,
    },

    /// Remove a user from every collection
    Reset {
        /// User ID
        user: String,
    },

    /// Show records for a conversation and the global lists
    List {
        /// Conversation ID (global lists only when omitted)
        #[arg(short, long)]
        conversation: Option<String>,
    },

    /// Drop expired records and records made redundant by allows
    Reconcile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Collection {
    Deny,
    Allow,
    DenyAll,
    AllowAll,
}

#[derive(clap::Args)]
struct RecordArgs {
    /// Collection to edit
    #[arg(value_enum)]
    collection: Collection,

    /// User ID
    user: String,

    /// Duration such as 1d2h30m or 90; 0 means permanent (add) or remove (dec)
    #[arg(default_value = "0")]
    duration: String,

    /// Conversation ID, required for deny and allow
    #[arg(short, long)]
    conversation: Option<String>,

    /// Reason stored with the record
    #[arg(short, long, default_value = "")]
    reason: String,
}

impl RecordArgs {
    fn target(&self) -> Result<Target> {
        build_target(self.collection, self.conversation.as_deref())
    }
}

fn build_target(collection: Collection, conversation: Option<&str>) -> Result<Target> {
    let conversation = conversation.filter(|c| !c.is_empty());
    match (collection, conversation) {
        (Collection::Deny, Some(c)) => Ok(Target::Deny(c.to_string())),
        (Collection::Allow, Some(c)) => Ok(Target::Allow(c.to_string())),
        (Collection::DenyAll, None) => Ok(Target::DenyAll),
        (Collection::AllowAll, None) => Ok(Target::AllowAll),
        (Collection::Deny | Collection::Allow, None) => {
            bail!("--conversation is required for {collection:?} records")
        }
        (Collection::DenyAll | Collection::AllowAll, Some(_)) => {
            bail!("--conversation does not apply to global collections")
        }
    }
}

/// Defaults, then the config file, then the environment, then flags.
fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<AclConfig> {
    let config = match path {
        Some(path) => AclConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AclConfig::default(),
    };
    let config = config.apply_env();
    Ok(match data_dir {
        Some(dir) => config.with_data_dir(dir),
        None => config,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref(), cli.data_dir.clone())?;
    debug!(data_dir = %config.data_dir.display(), enabled = config.enabled, "configuration loaded");
    let acl = AccessControl::open(&config)
        .with_context(|| format!("Failed to open state in {}", config.data_dir.display()))?;

    let output = run(&acl, cli.command, cli.json).await?;
    println!("{output}");
    Ok(())
}

async fn run(acl: &Acl, command: Commands, json: bool) -> Result<String> {
    match command {
        Commands::Check { conversation, user } => cmd_check(acl, &conversation, &user, json).await,
        Commands::Add { record } => cmd_add(acl, &record, json).await,
        Commands::Dec { record } => cmd_dec(acl, &record, json).await,
        Commands::Reset { user } => cmd_reset(acl, &user, json).await,
        Commands::List { conversation } => cmd_list(acl, conversation.as_deref(), json).await,
        Commands::Reconcile => cmd_reconcile(acl, json).await,
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output")
}

fn describe_verdict(conversation: &str, user: &str, verdict: &Verdict) -> String {
    let state = if verdict.blocked { "blocked" } else { "allowed" };
    let mut line = format!("{user} is {state} in {conversation}");
    if let Some(layer) = verdict.source {
        line.push_str(&format!(" (matched {layer:?})"));
    }
    if !verdict.reason.is_empty() {
        line.push_str(&format!(": {}", verdict.reason));
    }
    line
}

async fn cmd_check(acl: &Acl, conversation: &str, user: &str, json: bool) -> Result<String> {
    if !acl.is_enabled() {
        debug!("checks are disabled; every user is allowed");
    }
    let verdict = acl.check(conversation, user).await?;
    if json {
        return to_json(&verdict);
    }
    Ok(describe_verdict(conversation, user, &verdict))
}

fn expiry_text(expires_at: i64) -> String {
    if expires_at == 0 {
        return "permanently".to_string();
    }
    match chrono::DateTime::from_timestamp(expires_at, 0) {
        Some(at) => format!("until {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => format!("until {expires_at}"),
    }
}

async fn cmd_add(acl: &Acl, args: &RecordArgs, json: bool) -> Result<String> {
    let target = args.target()?;
    let outcome = acl
        .add_raw(&target, &args.user, &args.duration, &args.reason)
        .await?;
    if json {
        return to_json(&outcome);
    }
    let verb = match outcome {
        AddOutcome::Created(_) => "Added",
        AddOutcome::Extended(_) => "Extended",
        AddOutcome::MadePermanent(_) => "Made permanent",
    };
    Ok(format!(
        "{verb} {} in {target} {}",
        args.user,
        expiry_text(outcome.record().expires_at())
    ))
}

async fn cmd_dec(acl: &Acl, args: &RecordArgs, json: bool) -> Result<String> {
    let target = args.target()?;
    let outcome = acl
        .decrement_raw(&target, &args.user, &args.duration, &args.reason)
        .await?;
    if json {
        return to_json(&outcome);
    }
    Ok(match outcome {
        DecrementOutcome::Removed(_) => format!("Removed {} from {target}", args.user),
        DecrementOutcome::Shortened(record) => format!(
            "Shortened {} in {target}, now {}",
            args.user,
            expiry_text(record.expires_at())
        ),
    })
}

async fn cmd_reset(acl: &Acl, user: &str, json: bool) -> Result<String> {
    let removed = acl.reset(user).await?;
    if json {
        return to_json(&serde_json::json!({ "user": user, "removed": removed }));
    }
    Ok(format!("Removed {removed} record(s) for {user}"))
}

async fn cmd_list(acl: &Acl, conversation: Option<&str>, json: bool) -> Result<String> {
    let listing = acl.listing(conversation).await?;
    if json {
        return to_json(&listing);
    }
    Ok(listing.to_string().trim_end().to_string())
}

async fn cmd_reconcile(acl: &Acl, json: bool) -> Result<String> {
    let report = acl.reconcile().await?;
    if json {
        return to_json(&report);
    }
    if report.is_noop() {
        return Ok("Nothing to reconcile".to_string());
    }
    Ok(format!(
        "Expired: {}\nPruned:  {} (deny {}, deny_all {}, allow_all {}, allow {})",
        report.expired,
        report.pruned.total(),
        report.pruned.overridden_deny,
        report.pruned.overridden_deny_all,
        report.pruned.orphaned_allow_all,
        report.pruned.orphaned_allow,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use banlist_core::AclError;

    fn open(dir: &Path) -> Acl {
        let config = AclConfig::default()
            .with_data_dir(dir)
            .with_cache_ttl(std::time::Duration::ZERO);
        AccessControl::open(&config).unwrap()
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("banlist").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_build_target() {
        assert_eq!(
            build_target(Collection::Deny, Some("g1")).unwrap(),
            Target::Deny("g1".into())
        );
        assert_eq!(build_target(Collection::AllowAll, None).unwrap(), Target::AllowAll);
        assert!(build_target(Collection::Allow, None).is_err());
        assert!(build_target(Collection::Deny, Some("")).is_err());
        assert!(build_target(Collection::DenyAll, Some("g1")).is_err());
    }

    #[test]
    fn test_parse_add_defaults_to_permanent() {
        let cli = parse(&["add", "deny-all", "u1"]);
        let Commands::Add { record } = cli.command else {
            panic!("expected add");
        };
        assert_eq!(record.collection, Collection::DenyAll);
        assert_eq!(record.duration, "0");
        assert_eq!(record.reason, "");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["list", "-c", "g1", "--json", "--data-dir", "/tmp/x"]);
        assert!(cli.json);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn test_data_dir_flag_wins() {
        let config = load_config(None, Some(PathBuf::from("/srv/banlist"))).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/banlist"));
    }

    #[tokio::test]
    async fn test_add_then_check() {
        let dir = tempfile::tempdir().unwrap();
        let acl = open(dir.path());

        let cli = parse(&["add", "deny", "u1", "1h", "-c", "g1", "-r", "spam"]);
        let out = run(&acl, cli.command, false).await.unwrap();
        assert!(out.starts_with("Added u1 in deny[g1] until "), "{out}");

        let cli = parse(&["check", "-c", "g1", "u1"]);
        let out = run(&acl, cli.command, false).await.unwrap();
        assert_eq!(out, "u1 is blocked in g1 (matched ConversationDeny): spam");

        let cli = parse(&["check", "-c", "g2", "u1"]);
        let out = run(&acl, cli.command, true).await.unwrap();
        let verdict: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(verdict["blocked"], false);
    }

    #[tokio::test]
    async fn test_dec_zero_removes_and_reset_counts() {
        let dir = tempfile::tempdir().unwrap();
        let acl = open(dir.path());

        run(&acl, parse(&["add", "deny-all", "u1", "0"]).command, false)
            .await
            .unwrap();
        run(&acl, parse(&["add", "allow-all", "u1", "0"]).command, false)
            .await
            .unwrap();
        run(&acl, parse(&["add", "deny", "u2", "0", "-c", "g1"]).command, false)
            .await
            .unwrap();

        let out = run(&acl, parse(&["dec", "deny", "u2", "-c", "g1"]).command, false)
            .await
            .unwrap();
        assert_eq!(out, "Removed u2 from deny[g1]");

        // The permanent global allow overrode the global deny on the next
        // reconcile, and the allow was then dropped for lack of a deny.
        let out = run(&acl, parse(&["reset", "u1"]).command, false)
            .await
            .unwrap();
        assert_eq!(out, "Removed 0 record(s) for u1");
    }

    #[tokio::test]
    async fn test_errors_surface_from_core() {
        let dir = tempfile::tempdir().unwrap();
        let acl = open(dir.path());

        let err = run(&acl, parse(&["dec", "deny-all", "ghost", "1h"]).command, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AclError>(),
            Some(AclError::NotFound { .. })
        ));

        let err = run(&acl, parse(&["add", "deny-all", "u", "1h1d"]).command, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AclError>(),
            Some(AclError::InvalidFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_and_reconcile_output() {
        let dir = tempfile::tempdir().unwrap();
        let acl = open(dir.path());

        let out = run(&acl, parse(&["reconcile"]).command, false)
            .await
            .unwrap();
        assert_eq!(out, "Nothing to reconcile");

        run(&acl, parse(&["add", "deny", "u1", "0", "-c", "g1"]).command, false)
            .await
            .unwrap();
        let out = run(&acl, parse(&["list", "-c", "g1"]).command, false)
            .await
            .unwrap();
        assert!(out.contains("denied in g1:\n  u1 (permanent) no reason"), "{out}");
    }
}
