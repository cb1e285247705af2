/// `cli` module: argument parsing and task dispatch for the `gadget` binary.
///
/// All vendor and concurrency logic lives in [`gadget_core`]; this module only
/// loads configuration, builds the vendor client a command needs, and hands it
/// to the matching function in [`crate::tasks`].
///
/// ## How To Use
/// - For command-line users: run `gadget --help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// ## Extending
/// New commands get a variant in [`ArtifactoryCommand`] or [`BitbucketCommand`]
/// and a task function in `tasks/`. Clients are built per command from the
/// loaded config and passed down explicitly.
use crate::load_config::{default_locations, load_config, resolve_config_path, GadgetConfig};
use crate::tasks::artifactory::{
    artifact_query, cleanup, container_lookup_query, container_query, find_container,
    CleanupKind, CleanupOptions,
};
use crate::tasks::bitbucket::{
    branches_table, delete_repository, load_permissions_file, members_table, permissions_report,
    repositories_table, users_table, PermissionsExport,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gadget_core::artifactory::ArtifactoryClient;
use gadget_core::bitbucket::{parse_repo_ref, BitbucketClient};
use gadget_core::bulk_delete::{DEFAULT_CONCURRENCY, DEFAULT_THROTTLE};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// CLI for gadget: small maintenance tasks against Artifactory and Bitbucket.
#[derive(Parser)]
#[clap(
    name = "gadget",
    version,
    about = "Run maintenance and reporting tasks against Artifactory and Bitbucket"
)]
pub struct Cli {
    /// Path to the YAML config file [default: ~/.tasker_conf.yaml, then ./tasker_conf.yaml]
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Artifactory tasks
    #[clap(subcommand)]
    Artifactory(ArtifactoryCommand),
    /// Bitbucket Cloud tasks
    #[clap(subcommand)]
    Bitbucket(BitbucketCommand),
}

#[derive(Args, Debug, Clone)]
pub struct CleanupArgs {
    /// Repository to clean up
    #[clap(long)]
    pub repo: String,
    /// Only items last updated before this date (e.g. 2021-01-01 or 6mo)
    #[clap(long)]
    pub date: String,
    /// Delete the matched items; without it the task only reports
    #[clap(long)]
    pub purge: bool,
    /// Print the table of matched items
    #[clap(long)]
    pub output: bool,
    /// Number of concurrent delete workers
    #[clap(long, default_value_t = NonZeroUsize::new(DEFAULT_CONCURRENCY).unwrap_or(NonZeroUsize::MIN))]
    pub threads: NonZeroUsize,
    /// Pause in milliseconds each worker takes between deletes
    #[clap(long, default_value_t = u64::try_from(DEFAULT_THROTTLE.as_millis()).unwrap_or(u64::MAX))]
    pub throttle_ms: u64,
    /// Exit with an error when nothing matches
    #[clap(long)]
    pub fail_if_empty: bool,
}

impl CleanupArgs {
    fn options(&self, kind: CleanupKind) -> CleanupOptions {
        CleanupOptions {
            kind,
            repo: self.repo.clone(),
            purge: self.purge,
            output: self.output,
            threads: self.threads,
            throttle: Duration::from_millis(self.throttle_ms),
            fail_if_empty: self.fail_if_empty,
        }
    }
}

#[derive(Subcommand)]
pub enum ArtifactoryCommand {
    /// Report, and with --purge delete, files not updated since --date
    ArtifactCleanup(CleanupArgs),
    /// Report, and with --purge delete, docker images not updated since --date
    ContainerCleanup {
        #[clap(flatten)]
        args: CleanupArgs,
        /// Only image paths matching this pattern
        #[clap(long, default_value = "*")]
        pathmatch: String,
    },
    /// Find a docker image by name and tag across repositories
    FindContainer {
        /// Repository pattern to search
        #[clap(long, default_value = "*")]
        repo: String,
        /// Image name
        #[clap(long)]
        name: String,
        /// Image tag
        #[clap(long)]
        tag: String,
    },
}

#[derive(Subcommand)]
pub enum BitbucketCommand {
    /// List the repositories of a workspace
    Repos {
        #[clap(long)]
        workspace: String,
    },
    /// List the members of a workspace
    Members {
        #[clap(long)]
        workspace: String,
    },
    /// List workspace users and their workspace permission
    Users {
        #[clap(long)]
        workspace: String,
    },
    /// List the branches of a repository with their age
    Branches {
        /// Repository as workspace/slug
        #[clap(long)]
        repo: String,
    },
    /// Export repository permissions of every user in a workspace
    Permissions {
        #[clap(long)]
        workspace: String,
        /// Raw JSON output file
        #[clap(long, default_value = "results.json")]
        json: PathBuf,
        /// CSV report file
        #[clap(long, default_value = "bitbucket_report.csv")]
        csv: PathBuf,
        /// Also print the permissions as a table
        #[clap(long)]
        table: bool,
    },
    /// Load a permissions JSON export into a SQLite database
    LoadPermissions {
        /// JSON export written by `permissions`
        #[clap(long, default_value = "results.json")]
        input: PathBuf,
        /// SQLite database file, created if missing
        #[clap(long, default_value = "bitbucket.db")]
        db: PathBuf,
    },
    /// Delete a repository
    DeleteRepo {
        /// Repository as workspace/slug
        #[clap(long)]
        repo: String,
    },
}

fn repo_check(repo: &str) -> Result<(&str, &str)> {
    parse_repo_ref(repo).with_context(|| {
        format!("Repo is not a path-like value (eg: workspace/repoName): {repo}")
    })
}

fn artifactory_client(config: &GadgetConfig) -> Result<ArtifactoryClient> {
    ArtifactoryClient::new(config.artifactory()?).context("Failed to construct Artifactory client")
}

fn bitbucket_client(config: &GadgetConfig) -> Result<BitbucketClient> {
    BitbucketClient::new(config.bitbucket()?).context("Failed to construct Bitbucket client")
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    // Works on local files only, so it needs no config.
    if let Commands::Bitbucket(BitbucketCommand::LoadPermissions { input, db }) = &cli.command {
        tracing::info!(command = "load-permissions", input = %input.display(), db = %db.display(), "Loading permissions");
        load_permissions_file(input, db).await?;
        return Ok(());
    }

    let path = resolve_config_path(cli.config.as_deref(), &default_locations())?;
    let config = load_config(path)?;

    match cli.command {
        Commands::Artifactory(command) => run_artifactory(&config, command).await,
        Commands::Bitbucket(command) => run_bitbucket(&config, command).await,
    }
}

async fn run_artifactory(config: &GadgetConfig, command: ArtifactoryCommand) -> Result<()> {
    let client = Arc::new(artifactory_client(config)?);

    match command {
        ArtifactoryCommand::ArtifactCleanup(args) => {
            tracing::info!(command = "artifact-cleanup", repo = %args.repo, purge = args.purge, "Starting cleanup");
            let search = client.search(artifact_query(&args.repo, &args.date));
            let report = cleanup(
                &search,
                search.initial_request(),
                Arc::clone(&client),
                &args.options(CleanupKind::Artifacts),
                &mut std::io::stdout(),
            )
            .await?;
            report.ensure_success()
        }
        ArtifactoryCommand::ContainerCleanup { args, pathmatch } => {
            tracing::info!(command = "container-cleanup", repo = %args.repo, purge = args.purge, "Starting cleanup");
            let search = client.search(container_query(&args.repo, &args.date, &pathmatch));
            let report = cleanup(
                &search,
                search.initial_request(),
                Arc::clone(&client),
                &args.options(CleanupKind::Containers),
                &mut std::io::stdout(),
            )
            .await?;
            report.ensure_success()
        }
        ArtifactoryCommand::FindContainer { repo, name, tag } => {
            let search = client.search(container_lookup_query(&repo, &name, &tag));
            let found = find_container(&search, search.initial_request()).await?;
            if found.is_empty() {
                anyhow::bail!("no container {name}:{tag} found in {repo}");
            }
            for record in &found {
                println!("{}", record.display_path());
            }
            Ok(())
        }
    }
}

async fn run_bitbucket(config: &GadgetConfig, command: BitbucketCommand) -> Result<()> {
    let client = bitbucket_client(config)?;

    match command {
        BitbucketCommand::Repos { workspace } => {
            let table = repositories_table(&client, client.repositories_request(&workspace)).await?;
            table.print();
        }
        BitbucketCommand::Members { workspace } => {
            let table = members_table(&client, client.members_request(&workspace)).await?;
            table.print();
        }
        BitbucketCommand::Users { workspace } => {
            let table =
                users_table(&client, client.workspace_permissions_request(&workspace)).await?;
            table.print();
        }
        BitbucketCommand::Branches { repo } => {
            let (workspace, slug) = repo_check(&repo)?;
            let table = branches_table(&client, client.branches_request(workspace, slug)).await?;
            table.print();
        }
        BitbucketCommand::Permissions {
            workspace,
            json,
            csv,
            table,
        } => {
            let export = PermissionsExport {
                json: Some(json.as_path()),
                csv: Some(csv.as_path()),
                table,
            };
            let report = permissions_report(
                &client,
                client.repository_permissions_request(&workspace),
                &export,
            )
            .await?;
            if let Some(table) = &report.table {
                table.print();
            }
            println!(
                "Wrote {} permissions to {} and {}",
                report.records.len(),
                json.display(),
                csv.display()
            );
        }
        BitbucketCommand::LoadPermissions { input, db } => {
            load_permissions_file(&input, &db).await?;
        }
        BitbucketCommand::DeleteRepo { repo } => {
            let (workspace, slug) = repo_check(&repo)?;
            delete_repository(&client, workspace, slug).await?;
        }
    }
    Ok(())
}
