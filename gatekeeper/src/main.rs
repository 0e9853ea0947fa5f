use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gatekeeper_core::{
    ActionExecutor, DeadBranchDetector, IdentityCache, IdentityResolver, MergeRequestAudit,
    NotificationDispatcher, Policy, ProjectMetadataCache,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gatekeeper::config::Config;
use gatekeeper::{get_bot_version, GitLabClient, LdapDirectory, RecordingLogger, SmtpMailer};

/// Gatekeeper: merge request governance for GitLab
#[derive(Parser, Debug)]
#[command(name = "gatekeeper")]
#[command(about = "Enforces team review consensus on GitLab merge requests", long_about = None)]
struct Cli {
    /// Policy file (overrides POLICY_PATH)
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring review markers on open and merged merge requests up to date
    CheckRequests(CheckRequestsArgs),
    /// Report unprotected branches without commits for a week
    DeadBranches(DeadBranchesArgs),
}

#[derive(Parser, Debug)]
struct CheckRequestsArgs {
    /// If set, do not make any changes, just print what would be done
    #[arg(long)]
    dry_run: bool,
}

#[derive(Parser, Debug)]
struct DeadBranchesArgs {
    /// Email every identified author a digest of their dead branches
    #[arg(long)]
    notify: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    info!("Starting gatekeeper {}", get_bot_version());

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(policy) = cli.policy {
        config.policy_path = policy;
    }

    let policy = Policy::load(&config.policy_path, &config.gitlab.user).with_context(|| {
        format!("Failed to load policy from {}", config.policy_path.display())
    })?;
    info!(
        "Loaded policy for {} projects from {}",
        policy.projects().len(),
        config.policy_path.display()
    );

    let recording_logger = if config.recording_enabled {
        match RecordingLogger::new(PathBuf::from(&config.recording_log_path)) {
            Ok((logger, _handle)) => {
                info!(
                    "Recording enabled, logging to: {}",
                    config.recording_log_path
                );
                Some(logger)
            }
            Err(e) => {
                error!("Failed to initialize recording logger: {}", e);
                None
            }
        }
    } else {
        None
    };

    let forge = GitLabClient::new_with_recording(
        &config.gitlab.url,
        config.gitlab.token.clone(),
        config.http_timeout,
        recording_logger.clone(),
    )?;
    let directory = LdapDirectory::new(config.ldap.clone(), config.http_timeout);
    let mailer = SmtpMailer::new(&config.smtp, config.http_timeout)?;
    let mut metadata = ProjectMetadataCache::new(config.gitlab.url.clone());

    let result: Result<()> = match cli.command {
        Commands::CheckRequests(args) => {
            let actions = MergeRequestAudit::new(&forge, &policy).run().await;
            info!("Audit produced {} actions", actions.len());
            if args.dry_run {
                println!("{}", serde_json::to_string_pretty(&actions)?);
            } else {
                let executor = ActionExecutor::new(
                    &forge,
                    &policy,
                    IdentityResolver::new(&directory),
                    NotificationDispatcher::new(&mailer),
                );
                let summary = executor.execute(&actions, &mut metadata).await;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Ok(())
        }
        Commands::DeadBranches(args) => {
            let detector =
                DeadBranchDetector::new(&forge, &policy, IdentityResolver::new(&directory));
            let report = detector
                .detect(Utc::now(), &mut IdentityCache::new(), &mut metadata)
                .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if args.notify {
                let sent = NotificationDispatcher::new(&mailer)
                    .send_author_digests(&report)
                    .await;
                info!("Sent {} dead branch digests", sent);
            }
            Ok(())
        }
    };

    if let Some(logger) = &recording_logger {
        logger.flush().await;
    }

    result
}
