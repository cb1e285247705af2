//! Artifactory REST client: paged AQL search and artifact deletion.

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aql::AqlQuery;
use crate::contract::{
    delete_result, page_from_response, ClientError, DeleteError, Deleter, DeletionTarget,
    DeletionTask, FetchError, Item, Page, PageRequest, PageSource,
};

/// Rows requested per AQL page.
pub const DEFAULT_AQL_PAGE_SIZE: usize = 1000;

/// Connection settings for an Artifactory instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactoryConfig {
    /// Host name (`repo.example.com`) or full base URL (`https://repo.example.com`).
    pub server: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
}

pub struct ArtifactoryClient {
    http: Client,
    /// `https://{server}/artifactory`, without trailing slash.
    base_url: Url,
    username: String,
    password: String,
}

impl ArtifactoryClient {
    pub fn new(config: &ArtifactoryConfig) -> Result<Self, ClientError> {
        let server = config.server.trim_end_matches('/');
        let raw = if server.contains("://") {
            format!("{server}/artifactory")
        } else {
            format!("https://{server}/artifactory")
        };
        let base_url = Url::parse(&raw).map_err(|e| ClientError::InvalidBaseUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        info!(base_url = %base_url, username = %config.username, "Initialized Artifactory client");
        Ok(Self {
            http: Client::builder().build()?,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// URL of `path` inside `repo`, with every path segment percent-encoded.
    pub fn artifact_url(&self, repo: &str, path: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(repo);
            segments.extend(path.split('/').filter(|s| !s.is_empty() && *s != "."));
        }
        url
    }

    pub fn aql_url(&self) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(["api", "search", "aql"]);
        }
        url
    }

    /// A paged search over `query`.
    pub fn search(&self, query: AqlQuery) -> AqlSearch<'_> {
        AqlSearch {
            client: self,
            query,
            page_size: DEFAULT_AQL_PAGE_SIZE,
        }
    }
}

/// [`PageSource`] over an AQL query. The cursor is the offset of the next
/// page and is only handed out when the current page came back full.
pub struct AqlSearch<'a> {
    client: &'a ArtifactoryClient,
    query: AqlQuery,
    page_size: usize,
}

impl AqlSearch<'_> {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Request that starts the search at offset zero.
    pub fn initial_request(&self) -> PageRequest {
        PageRequest::initial(self.client.aql_url().to_string())
    }
}

/// Offset encoded in `request`. The initial request always starts at zero.
pub fn aql_offset(request: &PageRequest) -> Result<usize, FetchError> {
    match request {
        PageRequest::Initial(_) => Ok(0),
        PageRequest::Cursor(cursor) => cursor
            .parse::<usize>()
            .map_err(|e| FetchError::Decode(format!("invalid AQL offset cursor {cursor:?}: {e}"))),
    }
}

/// Cursor for the page after one that started at `offset` and held `len` rows.
pub fn aql_next_cursor(offset: usize, len: usize, page_size: usize) -> Option<String> {
    (len >= page_size).then(|| (offset + len).to_string())
}

#[async_trait]
impl PageSource for AqlSearch<'_> {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
        let offset = aql_offset(request)?;
        let text = self
            .query
            .clone()
            .offset(offset)
            .limit(self.page_size)
            .render();
        let url = self.client.aql_url();
        debug!(url = %url, query = %text, "Running AQL search");

        let response = self
            .client
            .http
            .post(url)
            .basic_auth(&self.client.username, Some(&self.client.password))
            .header(header::CONTENT_TYPE, "text/plain")
            .body(text)
            .send()
            .await?;

        let mut page = page_from_response(response).await?;
        page.next = aql_next_cursor(offset, page.items.len(), self.page_size);
        Ok(page)
    }
}

/// True when `path` names something below the repository root. Empty, `.`
/// and `..` segments do not count, so `"."` or `"a/.."` are rejected.
pub fn is_item_path(path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    !segments.is_empty() && !segments.contains(&"..")
}

#[async_trait]
impl Deleter for ArtifactoryClient {
    async fn delete(&self, task: &DeletionTask) -> Result<(), DeleteError> {
        let DeletionTarget::Artifact { repo, path } = &task.target else {
            return Err(DeleteError::Failed(format!(
                "Artifactory cannot delete {task}: not an artifact"
            )));
        };
        if !is_item_path(path) {
            return Err(DeleteError::Failed(format!(
                "refusing to delete {task}: path does not name an item inside {repo}"
            )));
        }
        let url = self.artifact_url(repo, path);
        debug!(url = %url, "Deleting artifact");
        let response = self
            .http
            .delete(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        delete_result(response).await
    }
}

/// Typed view of one AQL result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub repo: String,
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

impl ArtifactRecord {
    pub fn from_item(item: &Item) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(item.clone()))
    }

    /// Path of the item inside its repository. AQL reports root items with path `.`.
    pub fn repo_path(&self) -> String {
        if self.path.is_empty() || self.path == "." {
            self.name.clone()
        } else {
            format!("{}/{}", self.path, self.name)
        }
    }

    /// `repo:path/name`, as shown in reports.
    pub fn display_path(&self) -> String {
        format!("{}:{}", self.repo, self.repo_path())
    }
}
