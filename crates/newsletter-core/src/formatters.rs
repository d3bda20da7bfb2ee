//! Pure text formatters applied to free-text item fields before rendering.
//!
//! Each formatter maps `&str` to an HTML fragment. The composed
//! [`format_text`] and [`format_list`] run them in the order that matters:
//! citation markers are removed before bullet and paragraph detection, and
//! bold conversion runs last since it only touches inline spans.

use std::fmt::{self, Debug};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static NUMERIC_CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\d+\]").expect("numeric citation regex"));
static CONTENT_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r":contentReference\[oaicite:[^\]]+\]\{index=\d+\}")
        .expect("content reference regex")
});
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold regex"));
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n\s*").expect("paragraph break regex"));

const BULLET_MARKERS: [char; 2] = ['-', '•'];
const LIST_CLASS: &str = "bullets";

pub type Formatter = fn(&str) -> String;

/// Who HTML-escapes a field before a formatter adds markup to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escaping {
    /// The renderer escapes the field and hands the formatter safe text.
    Renderer,
    /// The formatter escapes its own input, as [`format_text`] and [`format_list`] do.
    Formatter,
}

/// Remove bracketed numeric citations such as `[1]` and AI content-reference tokens.
///
/// Bracketed text that is not purely digits (`[note]`) is kept.
pub fn clean_citations(text: &str) -> String {
    let without_references = CONTENT_REFERENCE.replace_all(text, "");
    NUMERIC_CITATION
        .replace_all(&without_references, "")
        .into_owned()
}

/// Convert `**span**` pairs into `<strong>` elements. Unpaired markers stay as written.
pub fn format_bold(text: &str) -> String {
    let converted = BOLD.replace_all(text, "<strong>$1</strong>").into_owned();
    if converted.contains("**") {
        debug!(target: "newsletter_core", "unmatched bold marker left verbatim");
    }
    converted
}

/// Replace every newline with `<br>`.
pub fn nl2br(text: &str) -> String {
    normalize_newlines(text).replace('\n', "<br>")
}

/// Split text into `<p>` blocks on blank lines; single newlines become `<br>`.
pub fn format_paragraphs(text: &str) -> String {
    let text = normalize_newlines(text);
    PARAGRAPH_BREAK
        .split(text.trim())
        .filter(|block| !block.trim().is_empty())
        .map(|block| paragraph(block.lines()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Group runs of `-`/`•` lines into `<ul>` lists and everything else into paragraphs.
///
/// A list ends at the first blank line or the first line that is not a bullet.
pub fn format_bullets(text: &str) -> String {
    let text = normalize_newlines(text);
    let mut blocks: Vec<Block<'_>> = Vec::new();
    let mut current: Option<Block<'_>> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            blocks.extend(current.take());
            continue;
        }
        match bullet_body(line) {
            Some(body) => {
                if let Some(Block::List(items)) = current.as_mut() {
                    items.push(body);
                    continue;
                }
                blocks.extend(current.take());
                current = Some(Block::List(vec![body]));
            }
            None => {
                if let Some(Block::Paragraph(lines)) = current.as_mut() {
                    lines.push(line);
                    continue;
                }
                blocks.extend(current.take());
                current = Some(Block::Paragraph(vec![line]));
            }
        }
    }
    blocks.extend(current);

    blocks
        .iter()
        .map(Block::to_html)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Clean a single bullet line: drop its marker, convert bold, strip citation tokens.
pub fn format_bullet(text: &str) -> String {
    let trimmed = text.trim();
    let body = bullet_body(trimmed).unwrap_or(trimmed);
    format_bold(&clean_citations(body))
}

/// Escape the characters that would let item text open markup.
///
/// Citation tokens survive escaping untouched, so cleaning may run on either side of it.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Full treatment for prose fields: citations, escaping, paragraphs, bold.
pub fn format_text(text: &str) -> String {
    let escaped = escape_html(&clean_citations(text));
    format_bold(&format_paragraphs(&escaped))
}

/// Full treatment for fields that may carry bullet lists.
pub fn format_list(text: &str) -> String {
    let escaped = escape_html(&clean_citations(text));
    format_bold(&format_bullets(&escaped))
}

enum Block<'a> {
    List(Vec<&'a str>),
    Paragraph(Vec<&'a str>),
}

impl Block<'_> {
    fn to_html(&self) -> String {
        match self {
            Self::List(items) => {
                let mut html = format!("<ul class=\"{LIST_CLASS}\">\n");
                for item in items {
                    html.push_str("<li>");
                    html.push_str(item);
                    html.push_str("</li>\n");
                }
                html.push_str("</ul>");
                html
            }
            Self::Paragraph(lines) => paragraph(lines.iter().copied()),
        }
    }
}

fn paragraph<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    let body = lines
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("<br>");
    format!("<p>{body}</p>")
}

fn bullet_body(line: &str) -> Option<&str> {
    line.trim_start()
        .strip_prefix(BULLET_MARKERS)
        .map(str::trim)
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Named formatters exposed to templates.
///
/// Formatters added with [`FormatterTable::with`] receive escaped text, so a
/// template calling `{{nl2br summary}}` never passes item markup through.
#[derive(Clone)]
pub struct FormatterTable {
    entries: Vec<(&'static str, Formatter, Escaping)>,
}

impl FormatterTable {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The formatters the bundled template relies on.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with("clean_citations", clean_citations)
            .with("format_bold", format_bold)
            .with("format_bullet", format_bullet)
            .with("format_bullets", format_bullets)
            .with("format_paragraphs", format_paragraphs)
            .with("nl2br", nl2br)
            .with_escaping("format_text", format_text, Escaping::Formatter)
            .with_escaping("format_list", format_list, Escaping::Formatter)
    }

    /// Add a formatter that expects escaped input, replacing any entry with the same name.
    #[must_use]
    pub fn with(self, name: &'static str, formatter: Formatter) -> Self {
        self.with_escaping(name, formatter, Escaping::Renderer)
    }

    #[must_use]
    pub fn with_escaping(
        mut self,
        name: &'static str,
        formatter: Formatter,
        escaping: Escaping,
    ) -> Self {
        match self.entries.iter_mut().find(|(existing, ..)| *existing == name) {
            Some(entry) => {
                entry.1 = formatter;
                entry.2 = escaping;
            }
            None => self.entries.push((name, formatter, escaping)),
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Formatter> {
        self.entries
            .iter()
            .find(|(existing, ..)| *existing == name)
            .map(|(_, formatter, _)| *formatter)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Formatter, Escaping)> + '_ {
        self.entries.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FormatterTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl Debug for FormatterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, ..)| name))
            .finish()
    }
}
