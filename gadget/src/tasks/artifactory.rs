//! Artifactory cleanup and lookup tasks.
//!
//! A cleanup lists matching items with a paged AQL search, reports them, and
//! only when purging hands them to the bulk deleter. Targets that resolve to
//! a repository root are never deleted.

use std::io::Write;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use gadget_core::aql::{AqlQuery, ItemType};
use gadget_core::artifactory::{is_item_path, ArtifactRecord};
use gadget_core::bulk_delete::{delete_all, BulkDeleteOptions, DeletionSummary};
use gadget_core::contract::{
    DeletionOutcome, DeletionTask, Deleter, OutcomeKind, PageRequest, PageSource,
};
use gadget_core::paginate::fetch_all;
use gadget_core::report::{format_date, Table};
use tracing::{error, info, warn};

/// Paths never touched by a container cleanup.
pub const PROTECTED_CONTAINER_PATHS: [&str; 2] = ["gradle*", "node*"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupKind {
    /// Every file in the repository.
    Artifacts,
    /// Docker images, found through their `manifest.json`. The whole tag
    /// folder is deleted.
    Containers,
}

#[derive(Debug, Clone)]
pub struct CleanupOptions {
    pub kind: CleanupKind,
    pub repo: String,
    /// Actually delete. Without it the task only reports.
    pub purge: bool,
    /// Print the table of matches.
    pub output: bool,
    pub threads: NonZeroUsize,
    pub throttle: Duration,
    /// Treat an empty match set as an error.
    pub fail_if_empty: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub matched: usize,
    pub table: Table,
    /// Present only when a purge ran.
    pub outcomes: Option<Vec<DeletionOutcome>>,
}

impl CleanupReport {
    pub fn summary(&self) -> Option<DeletionSummary> {
        self.outcomes
            .as_deref()
            .map(DeletionSummary::from_outcomes)
    }

    /// Errors when any deletion failed.
    pub fn ensure_success(&self) -> Result<()> {
        if let Some(summary) = self.summary() {
            if summary.has_failures() {
                anyhow::bail!("{} of {} deletions failed", summary.failed, summary.total());
            }
        }
        Ok(())
    }
}

pub fn artifact_query(repo: &str, date: &str) -> AqlQuery {
    AqlQuery::items()
        .name_matches("*")
        .item_type(ItemType::File)
        .updated_before(date)
        .repo(repo)
}

pub fn container_query(repo: &str, date: &str, pathmatch: &str) -> AqlQuery {
    AqlQuery::items()
        .item_type(ItemType::File)
        .repo(repo)
        .name_matches("manifest.json")
        .updated_before(date)
        .path_matches(pathmatch)
        .exclude_paths(PROTECTED_CONTAINER_PATHS)
}

pub fn container_lookup_query(repo: &str, name: &str, tag: &str) -> AqlQuery {
    AqlQuery::items()
        .item_type(ItemType::File)
        .repo_matches(repo)
        .property("docker.repoName", name)
        .property("docker.manifest", tag)
}

/// Task that deletes `record`, or `None` when the target would be the
/// repository root (a container manifest stored at path `.`).
fn deletion_task(kind: CleanupKind, record: &ArtifactRecord) -> Option<DeletionTask> {
    let path = match kind {
        CleanupKind::Artifacts => record.repo_path(),
        CleanupKind::Containers => record.path.clone(),
    };
    is_item_path(&path).then(|| DeletionTask::artifact(&record.repo, path))
}

fn build_table(kind: CleanupKind, records: &[ArtifactRecord]) -> Table {
    let date = |raw: &Option<String>| raw.as_deref().map(format_date).unwrap_or_default();
    let mut table = match kind {
        CleanupKind::Artifacts => Table::new("Artifacts", ["File", "Created", "Updated"]),
        CleanupKind::Containers => Table::new("Containers", ["File", "Updated"]),
    };
    for record in records {
        match kind {
            CleanupKind::Artifacts => table.add_row([
                record.display_path(),
                date(&record.created),
                date(&record.updated),
            ]),
            CleanupKind::Containers => {
                table.add_row([record.display_path(), date(&record.updated)])
            }
        }
    }
    table.set_footer(format!("Results: {}", records.len()));
    table
}

fn parse_records(items: &[gadget_core::contract::Item]) -> Result<Vec<ArtifactRecord>> {
    items
        .iter()
        .map(|item| ArtifactRecord::from_item(item).context("unexpected AQL result row"))
        .collect()
}

/// Lists items for `options`, reports them to `out` and, when purging,
/// deletes them.
///
/// `source` must be positioned at `initial`; `deleter` is only used when
/// `options.purge` is set.
pub async fn cleanup<S, D, W>(
    source: &S,
    initial: PageRequest,
    deleter: Arc<D>,
    options: &CleanupOptions,
    out: &mut W,
) -> Result<CleanupReport>
where
    S: PageSource + ?Sized,
    D: Deleter + ?Sized + 'static,
    W: Write + ?Sized,
{
    let items = fetch_all(source, initial)
        .await
        .with_context(|| format!("AQL search in {} failed", options.repo))?;
    let records = parse_records(&items)?;

    if records.is_empty() {
        info!(repo = %options.repo, "No artifacts to process");
        writeln!(out, "No artifacts to process")?;
        if options.fail_if_empty {
            anyhow::bail!("no matching items in {}", options.repo);
        }
        return Ok(CleanupReport::default());
    }

    info!(repo = %options.repo, matched = records.len(), "Items to process");
    let table = build_table(options.kind, &records);
    if options.output {
        write!(out, "{}", table.render())?;
    } else if let Some(footer) = table.footer() {
        writeln!(out, "{footer}")?;
    }

    let outcomes = if options.purge {
        let mut tasks = Vec::with_capacity(records.len());
        let mut refused = Vec::new();
        for record in &records {
            match deletion_task(options.kind, record) {
                Some(task) => tasks.push(task),
                None => {
                    warn!(item = %record.display_path(), "Refusing to delete repository root");
                    refused.push(DeletionOutcome {
                        task: DeletionTask::artifact(&record.repo, &record.path),
                        kind: OutcomeKind::Failed,
                        error: Some("target is the repository root".to_string()),
                    });
                }
            }
        }

        let bulk = BulkDeleteOptions::new(options.threads).with_throttle(options.throttle);
        let mut outcomes = delete_all(deleter, tasks, bulk).await;
        outcomes.extend(refused);
        for failed in outcomes.iter().filter(|o| o.kind == OutcomeKind::Failed) {
            error!(task = %failed.task, error = ?failed.error, "Deletion failed");
        }
        let summary = DeletionSummary::from_outcomes(&outcomes);
        writeln!(out, "{summary}")?;
        Some(outcomes)
    } else {
        warn!(repo = %options.repo, "Report only, pass --purge to delete");
        writeln!(out, "Report only, pass --purge to delete")?;
        None
    };

    Ok(CleanupReport {
        matched: records.len(),
        table,
        outcomes,
    })
}

/// Finds the manifest of a docker image by name and tag.
pub async fn find_container<S>(source: &S, initial: PageRequest) -> Result<Vec<ArtifactRecord>>
where
    S: PageSource + ?Sized,
{
    let items = fetch_all(source, initial)
        .await
        .context("AQL container lookup failed")?;
    parse_records(&items)
}
