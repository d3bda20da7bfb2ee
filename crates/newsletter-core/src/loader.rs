//! Content loading: YAML document to [`Newsletter`].
//!
//! Two document shapes are accepted. The current one nests everything under a
//! `newsletter` key; the legacy one keeps `newsletter_date` and `items` at the
//! root and requires fewer item fields.

use std::{fs, path::Path};

use serde::Deserialize;
use serde_yaml::Value;
use time::{macros::format_description, Date};
use tracing::debug;

use crate::{
    error::{Error, Result},
    model::{Item, Newsletter},
};

const INLINE_SOURCE: &str = "<inline>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Current,
    Legacy,
}

impl Shape {
    fn date_field(self) -> &'static str {
        match self {
            Self::Current => "date",
            Self::Legacy => "newsletter_date",
        }
    }

    fn requires(self, field: &str) -> bool {
        match self {
            Self::Current => true,
            Self::Legacy => matches!(field, "title" | "summary" | "why_it_matters"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawIssue {
    date: Option<Value>,
    newsletter_date: Option<Value>,
    subject: Option<String>,
    items: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawItem {
    company: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    why_it_matters: Option<String>,
    next_steps: Option<String>,
    teams: Option<Vec<String>>,
    link: Option<String>,
    source: Option<String>,
}

/// Read and validate the newsletter document at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<Newsletter> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| Error::InputRead {
        path: path.to_path_buf(),
        source,
    })?;
    let newsletter = parse(&contents).map_err(|reason| Error::malformed(path, reason))?;
    debug!(
        target: "newsletter_core",
        path = %path.display(),
        items = newsletter.items.len(),
        "newsletter loaded"
    );
    Ok(newsletter)
}

/// Validate an in-memory YAML document.
pub fn load_str(contents: &str) -> Result<Newsletter> {
    parse(contents).map_err(|reason| Error::malformed(INLINE_SOURCE, reason))
}

fn parse(contents: &str) -> Result<Newsletter, String> {
    let document: Value =
        serde_yaml::from_str(contents).map_err(|error| format!("invalid YAML: {error}"))?;

    let nested = match &document {
        Value::Null => return Err("document is empty".to_string()),
        Value::Mapping(mapping) => mapping.get("newsletter").cloned(),
        _ => return Err("top level of the document must be a mapping".to_string()),
    };
    let (root, shape) = match nested {
        Some(inner) => (inner, Shape::Current),
        None => (document, Shape::Legacy),
    };

    if !root.is_mapping() {
        return Err("field 'newsletter' must be a mapping".to_string());
    }
    let raw: RawIssue =
        serde_yaml::from_value(root).map_err(|error| format!("invalid newsletter: {error}"))?;

    let date_field = shape.date_field();
    let date_value = match shape {
        Shape::Current => raw.date,
        Shape::Legacy => raw.newsletter_date,
    }
    .ok_or_else(|| format!("missing required field '{date_field}'"))?;
    let date = parse_date(&date_value, date_field)?;

    let entries = match raw.items {
        None | Some(Value::Null) => return Err("missing required field 'items'".to_string()),
        Some(Value::Sequence(entries)) => entries,
        Some(_) => return Err("field 'items' must be a sequence".to_string()),
    };
    if entries.is_empty() {
        return Err("newsletter must have at least one item".to_string());
    }

    let items = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| build_item(entry, index + 1, shape))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Newsletter {
        date,
        subject: non_blank(raw.subject),
        items,
    })
}

fn parse_date(value: &Value, field: &str) -> Result<Date, String> {
    let format = format_description!("[year]-[month]-[day]");
    let text = match value {
        Value::String(text) => text.trim(),
        other => {
            return Err(format!(
                "field '{field}' must be an ISO date (YYYY-MM-DD), found {other:?}"
            ))
        }
    };
    Date::parse(text, &format).map_err(|_| {
        format!("field '{field}' must be an ISO date (YYYY-MM-DD), found '{text}'")
    })
}

fn build_item(entry: Value, position: usize, shape: Shape) -> Result<Item, String> {
    if !entry.is_mapping() {
        return Err(format!("item {position} must be a mapping"));
    }
    let raw: RawItem =
        serde_yaml::from_value(entry).map_err(|error| format!("item {position}: {error}"))?;

    let text = |value: Option<String>, field: &str| -> Result<String, String> {
        match non_blank(value) {
            Some(text) => Ok(text),
            None if shape.requires(field) => Err(format!(
                "missing required field '{field}' in item {position}"
            )),
            None => Ok(String::new()),
        }
    };

    let mut teams: Vec<String> = Vec::new();
    for team in raw.teams.unwrap_or_default() {
        let team = team.trim();
        if !team.is_empty() && !teams.iter().any(|seen| seen == team) {
            teams.push(team.to_string());
        }
    }

    Ok(Item {
        company: text(raw.company, "company")?,
        title: text(raw.title, "title")?,
        summary: text(raw.summary, "summary")?,
        why_it_matters: text(raw.why_it_matters, "why_it_matters")?,
        next_steps: text(raw.next_steps, "next_steps")?,
        teams,
        link: non_blank(raw.link),
        source: non_blank(raw.source),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
