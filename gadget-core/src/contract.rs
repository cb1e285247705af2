//! # contract: the seams every vendor task goes through
//!
//! This module defines the two traits that vendor clients implement and the
//! plain data types that flow between them and the generic helpers:
//!
//! - [`PageSource`]: fetches one page of a cursor-paginated API. Driven by
//!   [`crate::paginate::fetch_all`].
//! - [`Deleter`]: issues one delete call. Driven by
//!   [`crate::bulk_delete::delete_all`].
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`, so tests (in this crate and in
//!   the CLI crate via the `test-export-mocks` feature) can script page
//!   sequences and delete results without a network.
//!
//! ## Adding New Vendors
//! - Implement [`PageSource`] if the vendor lists things, [`Deleter`] if the
//!   vendor deletes things. Map "already gone" to [`DeleteError::NotFound`];
//!   everything else is [`DeleteError::Failed`].

use async_trait::async_trait;
use mockall::automock;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// One item record of a page. Its shape is vendor specific and opaque here.
pub type Item = Map<String, Value>;

/// All items of a paginated listing, in page-then-within-page order.
pub type ResultSet = Vec<Item>;

/// Where to fetch the next page from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// The first request of a listing.
    Initial(String),
    /// A cursor taken from the previous page's `next` field.
    Cursor(String),
}

impl PageRequest {
    pub fn initial(url: impl Into<String>) -> Self {
        PageRequest::Initial(url.into())
    }

    /// The URL or cursor token carried by this request.
    pub fn as_str(&self) -> &str {
        match self {
            PageRequest::Initial(s) | PageRequest::Cursor(s) => s,
        }
    }
}

/// One fetched response unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    pub next: Option<String>,
}

impl Page {
    /// Parses a page from the JSON body of a listing endpoint.
    ///
    /// Items are read from the first array found under `values`, `items` or
    /// `results`. A missing `next`, `next: null` and an empty string all
    /// mean there is no further page.
    pub fn from_json(body: &Value) -> Result<Page, FetchError> {
        let obj = body
            .as_object()
            .ok_or_else(|| FetchError::Decode("page body is not a JSON object".into()))?;

        let array = ["values", "items", "results"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array))
            .ok_or_else(|| {
                FetchError::Decode("page body has no values/items/results array".into())
            })?;

        let mut items = Vec::with_capacity(array.len());
        for entry in array {
            match entry {
                Value::Object(map) => items.push(map.clone()),
                other => {
                    return Err(FetchError::Decode(format!(
                        "page item is not an object: {other}"
                    )))
                }
            }
        }

        let next = obj
            .get("next")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        Ok(Page { items, next })
    }
}

/// Reads a listing response into a [`Page`], mapping non-success statuses to
/// [`FetchError::Status`].
pub(crate) async fn page_from_response(response: reqwest::Response) -> Result<Page, FetchError> {
    let url = response.url().to_string();
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
        return Err(FetchError::Status {
            url,
            status: status.as_u16(),
            body,
        });
    }
    let body: Value = response
        .json()
        .await
        .map_err(|e| FetchError::Decode(format!("{url}: {e}")))?;
    Page::from_json(&body)
}

/// Failure while building a vendor client from its configuration.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("could not build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure while following a paginated listing. Aborts the whole fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode page: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transport(e.to_string())
    }
}

/// Addressing information for one delete call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeletionTarget {
    /// An artifact or folder inside an Artifactory repository.
    Artifact { repo: String, path: String },
    /// A Bitbucket repository.
    Repository { workspace: String, slug: String },
}

/// One item reference queued for deletion. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeletionTask {
    /// Stable identity used to correlate outcomes with inputs.
    pub id: String,
    pub target: DeletionTarget,
}

impl DeletionTask {
    pub fn artifact(repo: impl Into<String>, path: impl Into<String>) -> Self {
        let repo = repo.into();
        let path = path.into();
        DeletionTask {
            id: format!("{repo}:{path}"),
            target: DeletionTarget::Artifact { repo, path },
        }
    }

    pub fn repository(workspace: impl Into<String>, slug: impl Into<String>) -> Self {
        let workspace = workspace.into();
        let slug = slug.into();
        DeletionTask {
            id: format!("{workspace}/{slug}"),
            target: DeletionTarget::Repository { workspace, slug },
        }
    }
}

impl fmt::Display for DeletionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Failure of a single delete call.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// The target was already absent. Not treated as a failure.
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Failed(String),
}

impl From<reqwest::Error> for DeleteError {
    fn from(e: reqwest::Error) -> Self {
        DeleteError::Failed(e.to_string())
    }
}

/// Maps the response of a DELETE call. 404 means the target is already gone.
pub(crate) async fn delete_result(response: reqwest::Response) -> Result<(), DeleteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(DeleteError::NotFound);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(DeleteError::Failed(format!(
        "DELETE {url} returned {status}: {body}"
    )))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Deleted,
    NotFound,
    Failed,
}

/// Result of processing one [`DeletionTask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOutcome {
    pub task: DeletionTask,
    pub kind: OutcomeKind,
    pub error: Option<String>,
}

/// Trait for fetching single pages from a cursor-paginated listing.
///
/// Implementors translate a [`PageRequest`] into one HTTP call and return
/// the parsed [`Page`]. Non-success statuses must come back as
/// [`FetchError::Status`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError>;
}

/// Trait for deleting a single remote resource.
///
/// The trait is `Send` + `Sync` because one instance is shared by all
/// workers of a bulk deletion.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Deleter: Send + Sync {
    async fn delete(&self, task: &DeletionTask) -> Result<(), DeleteError>;
}
