//! Typed builder for Artifactory Query Language `items.find(...)` queries.
//!
//! Criteria are rendered through `serde_json`, so every user supplied value
//! ends up as a quoted, escaped JSON string.

use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    File,
    Folder,
    Any,
}

impl ItemType {
    fn as_str(self) -> &'static str {
        match self {
            ItemType::File => "file",
            ItemType::Folder => "folder",
            ItemType::Any => "any",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Criterion {
    key: String,
    value: Value,
}

impl Criterion {
    fn field(key: impl Into<String>, value: Value) -> Self {
        Criterion {
            key: key.into(),
            value,
        }
    }

    fn into_object(self) -> Value {
        let mut map = Map::new();
        map.insert(self.key, self.value);
        Value::Object(map)
    }
}

/// An `items.find` query under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AqlQuery {
    criteria: Vec<Criterion>,
    offset: Option<usize>,
    limit: Option<usize>,
}

impl AqlQuery {
    pub fn items() -> Self {
        Self::default()
    }

    /// Exact repository name.
    pub fn repo(self, repo: &str) -> Self {
        self.with(Criterion::field("repo", json!(repo)))
    }

    /// Repository name wildcard.
    pub fn repo_matches(self, pattern: &str) -> Self {
        self.with(Criterion::field("repo", json!({ "$match": pattern })))
    }

    pub fn item_type(self, item_type: ItemType) -> Self {
        self.with(Criterion::field("type", json!(item_type.as_str())))
    }

    pub fn name_matches(self, pattern: &str) -> Self {
        self.with(Criterion::field("name", json!({ "$match": pattern })))
    }

    pub fn path_matches(self, pattern: &str) -> Self {
        self.with(Criterion::field("path", json!({ "$match": pattern })))
    }

    /// Items last updated before `date` (an ISO date or a relative span such as `4w`).
    pub fn updated_before(self, date: &str) -> Self {
        self.with(Criterion::field("updated", json!({ "$before": date })))
    }

    /// Property equality, e.g. `docker.repoName`.
    pub fn property(self, key: &str, value: &str) -> Self {
        self.with(Criterion::field(format!("@{key}"), json!(value)))
    }

    /// Excludes items whose path matches any of `patterns`.
    pub fn exclude_paths<I, P>(self, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let clauses: Vec<Value> = patterns
            .into_iter()
            .map(|p| json!({ "path": { "$nmatch": p.as_ref() } }))
            .collect();
        if clauses.is_empty() {
            return self;
        }
        self.with(Criterion::field("$msp", Value::Array(clauses)))
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn with(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// The criteria object passed to `items.find`. Repeated keys are
    /// combined under `$and`.
    pub fn criteria(&self) -> Value {
        let mut keys: Vec<&str> = self.criteria.iter().map(|c| c.key.as_str()).collect();
        keys.sort_unstable();
        let has_duplicates = keys.windows(2).any(|w| w[0] == w[1]);

        if has_duplicates {
            let clauses = self
                .criteria
                .iter()
                .cloned()
                .map(Criterion::into_object)
                .collect();
            json!({ "$and": Value::Array(clauses) })
        } else {
            let map = self
                .criteria
                .iter()
                .cloned()
                .map(|c| (c.key, c.value))
                .collect::<Map<String, Value>>();
            Value::Object(map)
        }
    }

    /// Renders the full query text.
    pub fn render(&self) -> String {
        let mut text = format!("items.find({})", self.criteria());
        if let Some(offset) = self.offset {
            text.push_str(&format!(".offset({offset})"));
        }
        if let Some(limit) = self.limit {
            text.push_str(&format!(".limit({limit})"));
        }
        text
    }
}
