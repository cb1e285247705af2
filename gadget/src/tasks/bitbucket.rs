//! Bitbucket Cloud reporting tasks.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use gadget_core::bitbucket::{BranchRecord, MemberRecord, PermissionRecord, RepositoryRecord};
use gadget_core::contract::{DeleteError, Deleter, DeletionTask, Item, PageRequest, PageSource};
use gadget_core::paginate::fetch_all;
use gadget_core::permissions_db::{load_permissions, open_permissions_db, LoadSummary};
use gadget_core::report::{age_in_days, format_date, write_permissions_csv, Table};
use tracing::{info, warn};

/// Fetches a full listing and fails when it is empty.
async fn fetch_non_empty<S>(source: &S, initial: PageRequest, what: &str) -> Result<Vec<Item>>
where
    S: PageSource + ?Sized,
{
    let items = fetch_all(source, initial)
        .await
        .with_context(|| format!("listing {what} failed"))?;
    if items.is_empty() {
        anyhow::bail!("no {what} found");
    }
    info!(count = items.len(), what, "Fetched listing");
    Ok(items)
}

fn parse_all<T, F>(items: &[Item], parse: F) -> Result<Vec<T>>
where
    F: Fn(&Item) -> Result<T, serde_json::Error>,
{
    items
        .iter()
        .map(|item| parse(item).context("unexpected Bitbucket record"))
        .collect()
}

pub async fn repositories_table<S>(source: &S, initial: PageRequest) -> Result<Table>
where
    S: PageSource + ?Sized,
{
    let items = fetch_non_empty(source, initial, "repositories").await?;
    let repos = parse_all(&items, RepositoryRecord::from_item)?;

    let mut table = Table::new(
        format!("Repositories({})", repos.len()),
        ["Name", "Project", "Language", "Created"],
    );
    for repo in &repos {
        table.add_row([
            repo.name.clone(),
            repo.project.as_ref().map(|p| p.key.clone()).unwrap_or_default(),
            repo.language.clone().unwrap_or_default(),
            repo.created_on.as_deref().map(format_date).unwrap_or_default(),
        ]);
    }
    Ok(table)
}

pub async fn members_table<S>(source: &S, initial: PageRequest) -> Result<Table>
where
    S: PageSource + ?Sized,
{
    let items = fetch_non_empty(source, initial, "members").await?;
    let mut members = parse_all(&items, MemberRecord::from_item)?;
    members.sort_by(|a, b| a.user.display_name.cmp(&b.user.display_name));

    let mut table = Table::new(format!("Members({})", members.len()), ["Name", "Id"]);
    for member in &members {
        table.add_row([
            member.user.display_name.clone(),
            member.user.account_id.clone().unwrap_or_default(),
        ]);
    }
    Ok(table)
}

/// Workspace-level permission of every user.
pub async fn users_table<S>(source: &S, initial: PageRequest) -> Result<Table>
where
    S: PageSource + ?Sized,
{
    let items = fetch_non_empty(source, initial, "users").await?;
    let mut grants = parse_all(&items, PermissionRecord::from_item)?;
    grants.sort_by(|a, b| a.user.display_name.cmp(&b.user.display_name));

    let mut table = Table::new(
        format!("Users({})", grants.len()),
        ["DisplayName", "NickName", "Permission"],
    );
    for grant in &grants {
        table.add_row([
            grant.user.display_name.clone(),
            grant.user.nickname.clone().unwrap_or_default(),
            grant.permission.clone(),
        ]);
    }
    Ok(table)
}

/// Branches of a repository, oldest commit first, with their age in days.
pub async fn branches_table<S>(source: &S, initial: PageRequest) -> Result<Table>
where
    S: PageSource + ?Sized,
{
    let items = fetch_non_empty(source, initial, "branches").await?;
    let mut branches = parse_all(&items, BranchRecord::from_item)?;
    branches.sort_by(|a, b| a.target.date.cmp(&b.target.date));

    let now = Utc::now();
    let mut table = Table::new(
        format!("Branches({})", branches.len()),
        ["Branch", "Author", "Created", "Age(Days)"],
    );
    for branch in &branches {
        table.add_row([
            branch.name.clone(),
            branch
                .target
                .author
                .as_ref()
                .and_then(|a| a.raw.clone())
                .unwrap_or_default(),
            format_date(&branch.target.date),
            age_in_days(&branch.target.date, now)
                .map(|d| d.to_string())
                .unwrap_or_default(),
        ]);
    }
    Ok(table)
}

#[derive(Debug, Default)]
pub struct PermissionsExport<'a> {
    /// Raw listing, pretty printed.
    pub json: Option<&'a Path>,
    /// `Name,Repo,Permission` report.
    pub csv: Option<&'a Path>,
    pub table: bool,
}

#[derive(Debug)]
pub struct PermissionsReport {
    pub records: Vec<PermissionRecord>,
    pub table: Option<Table>,
}

/// Repository permissions of every user in a workspace, exported as JSON
/// and CSV artifacts.
pub async fn permissions_report<S>(
    source: &S,
    initial: PageRequest,
    export: &PermissionsExport<'_>,
) -> Result<PermissionsReport>
where
    S: PageSource + ?Sized,
{
    let items = fetch_non_empty(source, initial, "permissions").await?;
    let records = parse_all(&items, PermissionRecord::from_item)?;

    if let Some(path) = export.json {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &items)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), records = items.len(), "Wrote permissions JSON");
    }

    if let Some(path) = export.csv {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        write_permissions_csv(BufWriter::new(file), &records)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), records = records.len(), "Wrote permissions CSV");
    }

    let table = export.table.then(|| {
        let mut sorted: Vec<&PermissionRecord> = records.iter().collect();
        sorted.sort_by(|a, b| a.user.display_name.cmp(&b.user.display_name));
        let mut table = Table::new(
            format!("Permissions({})", records.len()),
            ["DisplayName", "NickName", "Repository", "Permission"],
        );
        for record in sorted {
            table.add_row([
                record.user.display_name.clone(),
                record.user.nickname.clone().unwrap_or_default(),
                record
                    .repository
                    .as_ref()
                    .and_then(|r| r.full_name.clone())
                    .unwrap_or_default(),
                record.permission.clone(),
            ]);
        }
        table
    });

    Ok(PermissionsReport { records, table })
}

/// Deletes one repository. An already absent repository is an error here,
/// since the caller named it explicitly.
pub async fn delete_repository<D>(deleter: &D, workspace: &str, slug: &str) -> Result<()>
where
    D: Deleter + ?Sized,
{
    let task = DeletionTask::repository(workspace, slug);
    match deleter.delete(&task).await {
        Ok(()) => {
            info!(repo = %task, "Deleted repository");
            println!("Deleted repo: {task}");
            Ok(())
        }
        Err(DeleteError::NotFound) => {
            warn!(repo = %task, "Repository not found");
            anyhow::bail!("repository {task} not found")
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("deleting {task} failed"))),
    }
}

/// Loads a permissions JSON export (as written by [`permissions_report`])
/// into the SQLite database at `db`.
pub async fn load_permissions_file(input: &Path, db: &Path) -> Result<LoadSummary> {
    let raw = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let items: Vec<Item> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of permission records", input.display()))?;
    info!(input = %input.display(), records = items.len(), "Loaded permissions export");
    let records = parse_all(&items, PermissionRecord::from_item)?;

    let pool = open_permissions_db(db)
        .await
        .with_context(|| format!("Failed to open database {}", db.display()))?;
    let summary = load_permissions(&pool, &records)
        .await
        .with_context(|| format!("Failed to load permissions into {}", db.display()))?;
    pool.close().await;

    println!("Loaded {summary} into {}", db.display());
    Ok(summary)
}
