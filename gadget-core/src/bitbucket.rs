//! Bitbucket Cloud 2.0 client: cursor-paged listings and repository deletion.
//!
//! Bitbucket pages carry their items under `values` and the absolute URL of
//! the following page under `next`. That URL is used as the cursor as-is,
//! after checking that it points back at the configured API host.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contract::{
    delete_result, page_from_response, ClientError, DeleteError, Deleter, DeletionTarget,
    DeletionTask, FetchError, Item, Page, PageRequest, PageSource,
};

pub const DEFAULT_API_URL: &str = "https://api.bitbucket.org";

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitbucketConfig {
    pub username: String,
    /// App password.
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

pub struct BitbucketClient {
    http: Client,
    api_url: Url,
    username: String,
    password: String,
}

/// Splits a `workspace/slug` argument. Returns `None` unless both halves are
/// present and non-empty.
pub fn parse_repo_ref(repo: &str) -> Option<(&str, &str)> {
    let (workspace, slug) = repo.split_once('/')?;
    if workspace.is_empty() || slug.is_empty() || slug.contains('/') {
        return None;
    }
    Some((workspace, slug))
}

impl BitbucketClient {
    pub fn new(config: &BitbucketConfig) -> Result<Self, ClientError> {
        let raw = config.api_url.trim_end_matches('/');
        let api_url = Url::parse(raw).map_err(|e| ClientError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        info!(api_url = %api_url, username = %config.username, "Initialized Bitbucket client");
        Ok(Self {
            http: Client::builder().build()?,
            api_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str], query: Option<(&str, &str)>) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("2.0").extend(segments);
        }
        if let Some((key, value)) = query {
            url.query_pairs_mut().append_pair(key, value);
        }
        url
    }

    /// Repositories of a workspace, sorted by name.
    pub fn repositories_request(&self, workspace: &str) -> PageRequest {
        PageRequest::initial(
            self.endpoint(&["repositories", workspace], Some(("sort", "name")))
                .to_string(),
        )
    }

    pub fn members_request(&self, workspace: &str) -> PageRequest {
        PageRequest::initial(self.endpoint(&["workspaces", workspace, "members"], None).to_string())
    }

    /// Workspace-level permissions of every user.
    pub fn workspace_permissions_request(&self, workspace: &str) -> PageRequest {
        PageRequest::initial(
            self.endpoint(&["workspaces", workspace, "permissions"], None)
                .to_string(),
        )
    }

    /// Per-repository permissions of every user, sorted by nickname.
    pub fn repository_permissions_request(&self, workspace: &str) -> PageRequest {
        PageRequest::initial(
            self.endpoint(
                &["workspaces", workspace, "permissions", "repositories"],
                Some(("sort", "user.nickname")),
            )
            .to_string(),
        )
    }

    pub fn branches_request(&self, workspace: &str, slug: &str) -> PageRequest {
        PageRequest::initial(
            self.endpoint(&["repositories", workspace, slug, "refs", "branches"], None)
                .to_string(),
        )
    }

    pub fn repository_url(&self, workspace: &str, slug: &str) -> Url {
        self.endpoint(&["repositories", workspace, slug], None)
    }

    fn same_origin(&self, url: &Url) -> bool {
        url.scheme() == self.api_url.scheme()
            && url.host_str() == self.api_url.host_str()
            && url.port_or_known_default() == self.api_url.port_or_known_default()
    }
}

#[async_trait]
impl PageSource for BitbucketClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
        let url = Url::parse(request.as_str())
            .map_err(|e| FetchError::Decode(format!("invalid page url {}: {e}", request.as_str())))?;
        if !self.same_origin(&url) {
            return Err(FetchError::Decode(format!(
                "page url {url} is outside {}",
                self.api_url
            )));
        }
        debug!(url = %url, "Fetching Bitbucket page");
        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        page_from_response(response).await
    }
}

#[async_trait]
impl Deleter for BitbucketClient {
    async fn delete(&self, task: &DeletionTask) -> Result<(), DeleteError> {
        let DeletionTarget::Repository { workspace, slug } = &task.target else {
            return Err(DeleteError::Failed(format!(
                "Bitbucket cannot delete {task}: not a repository"
            )));
        };
        let url = self.repository_url(workspace, slug);
        debug!(url = %url, "Deleting repository");
        let response = self
            .http
            .delete(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        delete_result(response).await
    }
}

fn from_item<T: for<'de> Deserialize<'de>>(item: &Item) -> Result<T, serde_json::Error> {
    serde_json::from_value(serde_json::Value::Object(item.clone()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub display_name: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub project: Option<ProjectRef>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub created_on: Option<String>,
}

impl RepositoryRecord {
    pub fn from_item(item: &Item) -> Result<Self, serde_json::Error> {
        from_item(item)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub user: UserRef,
}

impl MemberRecord {
    pub fn from_item(item: &Item) -> Result<Self, serde_json::Error> {
        from_item(item)
    }
}

/// A workspace or repository permission grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub permission: String,
    pub user: UserRef,
    #[serde(default)]
    pub repository: Option<RepositoryRecord>,
}

impl PermissionRecord {
    pub fn from_item(item: &Item) -> Result<Self, serde_json::Error> {
        from_item(item)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchTarget {
    pub date: String,
    #[serde(default)]
    pub author: Option<BranchAuthor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchAuthor {
    #[serde(default)]
    pub raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub name: String,
    pub target: BranchTarget,
}

impl BranchRecord {
    pub fn from_item(item: &Item) -> Result<Self, serde_json::Error> {
        from_item(item)
    }
}
