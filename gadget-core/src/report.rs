//! Report formatting shared by the CLI tasks: `tabled` tables, date
//! reformatting and CSV export.

use std::fmt;
use std::io::Write;

use chrono::{DateTime, NaiveDateTime, Utc};
use colored::Colorize as _;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::bitbucket::PermissionRecord;

/// Output format for dates in reports, e.g. `Mar 04 2021`.
pub const REPORT_DATE_FORMAT: &str = "%b %d %Y";

/// Parses an RFC 3339 timestamp (Artifactory and Bitbucket both emit these).
/// Timestamps without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Reformats a timestamp for display, falling back to the raw text.
pub fn format_date(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|dt| dt.format(REPORT_DATE_FORMAT).to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Whole days between `raw` and `now`. Negative when `raw` is in the future.
pub fn age_in_days(raw: &str, now: DateTime<Utc>) -> Option<i64> {
    parse_timestamp(raw).map(|dt| (now - dt).num_days())
}

/// A titled table, laid out by `tabled` with a borderless style.
#[derive(Debug, Clone, Default)]
pub struct Table {
    title: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    footer: Option<String>,
}

impl Table {
    pub fn new<I, S>(title: impl Into<String>, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: title.into(),
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            footer: None,
        }
    }

    pub fn add_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    pub fn set_footer(&mut self, footer: impl Into<String>) {
        self.footer = Some(footer.into());
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn footer(&self) -> Option<&str> {
        self.footer.as_deref()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header and rows as aligned text, without title or footer.
    pub fn body(&self) -> String {
        let mut builder = Builder::default();
        builder.push_record(self.headers.iter().cloned());
        for row in &self.rows {
            builder.push_record(row.iter().cloned());
        }
        let mut table = builder.build();
        table.with(Style::blank());
        table.to_string()
    }

    /// The table with a highlighted title and a dimmed footer, for terminals.
    pub fn render(&self) -> String {
        let mut text = format!("{}\n{}\n", self.title.bold(), self.body());
        if let Some(footer) = &self.footer {
            text.push_str(&format!("{}\n", footer.dimmed()));
        }
        text
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", self.body())?;
        if let Some(footer) = &self.footer {
            writeln!(f, "{footer}")?;
        }
        Ok(())
    }
}

/// Writes `Name,Repo,Permission` rows. Consecutive rows for the same user
/// leave the name blank, so input sorted by user reads as one block per user.
pub fn write_permissions_csv<W: Write>(
    writer: W,
    records: &[PermissionRecord],
) -> Result<(), csv::Error> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(["Name", "Repo", "Permission"])?;

    let mut current_user: Option<String> = None;
    for record in records {
        let user_key = record
            .user
            .uuid
            .clone()
            .unwrap_or_else(|| record.user.display_name.clone());
        let name = if current_user.as_deref() == Some(user_key.as_str()) {
            ""
        } else {
            record.user.display_name.as_str()
        };
        let repo = record
            .repository
            .as_ref()
            .map(|r| r.full_name.clone().unwrap_or_else(|| r.name.clone()))
            .unwrap_or_default();
        out.write_record([name, repo.as_str(), record.permission.as_str()])?;
        current_user = Some(user_key);
    }
    out.flush()?;
    Ok(())
}
