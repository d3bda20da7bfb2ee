use serde::Serialize;
use time::{macros::format_description, Date};

/// A fully validated newsletter issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Newsletter {
    pub date: Date,
    pub subject: Option<String>,
    pub items: Vec<Item>,
}

/// One newsletter entry describing a company or news event and the recommended follow-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub company: String,
    pub title: String,
    pub summary: String,
    pub why_it_matters: String,
    pub next_steps: String,
    /// Deduplicated, in first-seen order.
    pub teams: Vec<String>,
    pub link: Option<String>,
    pub source: Option<String>,
}

impl Newsletter {
    /// ISO form of the issue date, e.g. `2025-03-01`.
    #[must_use]
    pub fn iso_date(&self) -> String {
        let format = format_description!("[year]-[month]-[day]");
        self.date
            .format(&format)
            .unwrap_or_else(|_| self.date.to_string())
    }

    /// Human-facing form of the issue date, e.g. `March 1, 2025`.
    #[must_use]
    pub fn display_date(&self) -> String {
        let format = format_description!("[month repr:long] [day padding:none], [year]");
        self.date
            .format(&format)
            .unwrap_or_else(|_| self.iso_date())
    }
}
