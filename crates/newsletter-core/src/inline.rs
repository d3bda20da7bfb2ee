//! CSS inlining for email clients that ignore `<style>` blocks.
//!
//! The document is parsed with scraper, stylesheet rules are matched against
//! every element in one pass, and the tree is serialized back with the resolved
//! declarations in each element's `style` attribute. Rules that cannot live in
//! an attribute (at-rules, pseudo-classes, selectors scraper rejects) are kept
//! in a single `<style>` block where the first one used to be.

use std::fmt::Write;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

static COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("css comment regex"));
static IMPORTANT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*!\s*important\s*$").expect("important regex"));

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript", "plaintext",
];
const UNSTYLED_ELEMENTS: &[&str] = &["head", "title", "meta", "link", "script", "style", "base"];

/// Inline `<style>` rules into `style` attributes.
///
/// HTML without a `<style>` element is returned unchanged.
pub fn inline_css(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(style_selector) = Selector::parse("style") else {
        return html.to_string();
    };

    let blocks: Vec<String> = document
        .select(&style_selector)
        .map(|style| {
            let css: String = style.text().collect();
            match style.value().attr("media").map(str::trim) {
                Some(media) if !applies_on_screen(media) => {
                    format!("@media {media} {{\n{css}\n}}")
                }
                _ => css,
            }
        })
        .collect();
    if blocks.is_empty() {
        debug!(target: "newsletter_core", "no style block found; skipping CSS inlining");
        return html.to_string();
    }

    let sheet = Stylesheet::parse(&blocks.join("\n"));
    debug!(
        target: "newsletter_core",
        inlined_rules = sheet.rules.len(),
        retained_bytes = sheet.retained.len(),
        "stylesheet parsed"
    );

    let mut serializer = Serializer {
        rules: &sheet.rules,
        retained: Some(sheet.retained.as_str()),
        out: String::with_capacity(html.len() + html.len() / 2),
    };
    for child in document.tree.root().children() {
        serializer.write_node(child.value(), ElementRef::wrap(child), false);
    }
    serializer.out
}

/// A `media` attribute that still targets screens keeps its rules inlinable.
fn applies_on_screen(media: &str) -> bool {
    media.is_empty()
        || media
            .split(',')
            .map(str::trim)
            .any(|query| query.eq_ignore_ascii_case("all") || query.eq_ignore_ascii_case("screen"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Declaration {
    property: String,
    value: String,
    important: bool,
}

struct InlineRule {
    selector: Selector,
    specificity: (u32, u32, u32),
    order: usize,
    declarations: Vec<Declaration>,
}

#[derive(Default)]
struct Stylesheet {
    rules: Vec<InlineRule>,
    retained: String,
}

impl Stylesheet {
    fn parse(css: &str) -> Self {
        let css = COMMENT.replace_all(css, "");
        let mut sheet = Self::default();
        let mut cursor = 0;

        while cursor < css.len() {
            let rest = &css[cursor..];
            let Some(offset) = rest.find(['{', ';']) else {
                break;
            };
            let prelude = rest[..offset].trim();
            let open = cursor + offset;

            if css[open..].starts_with(';') {
                if prelude.starts_with('@') {
                    sheet.retain(&format!("{prelude};"));
                }
                cursor = open + 1;
                continue;
            }

            let close = block_end(&css, open).unwrap_or(css.len());
            let body = &css[open + 1..close.min(css.len())];
            if prelude.starts_with('@') {
                sheet.retain(&format!("{prelude} {{{body}}}"));
            } else if !prelude.is_empty() {
                sheet.add_rule(prelude, body);
            }
            cursor = close + 1;
        }
        sheet
    }

    fn add_rule(&mut self, prelude: &str, body: &str) {
        let declarations = parse_declarations(body);
        if declarations.is_empty() {
            return;
        }

        let mut kept = Vec::new();
        for text in split_top_level(prelude, ',') {
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            if text.contains(':') {
                kept.push(text);
                continue;
            }
            match Selector::parse(text) {
                Ok(selector) => self.rules.push(InlineRule {
                    selector,
                    specificity: specificity(text),
                    order: self.rules.len(),
                    declarations: declarations.clone(),
                }),
                Err(_) => kept.push(text),
            }
        }

        if !kept.is_empty() {
            self.retain(&format!("{} {{{}}}", kept.join(", "), body.trim()));
        }
    }

    fn retain(&mut self, css: &str) {
        if !self.retained.is_empty() {
            self.retained.push('\n');
        }
        self.retained.push_str(css);
    }
}

/// Index of the `}` closing the block opened at `open`, honoring nesting and quotes.
fn block_end(css: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (index, ch) in css[open..].char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '{') => depth += 1,
            (None, '}') => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on `separator` outside quotes, parentheses and brackets.
fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (index, ch) in text.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth -= 1,
            (None, c) if c == separator && depth <= 0 => {
                parts.push(&text[start..index]);
                start = index + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse_declarations(block: &str) -> Vec<Declaration> {
    split_top_level(block, ';')
        .into_iter()
        .filter_map(|entry| {
            let (property, value) = entry.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let important = IMPORTANT.is_match(value);
            let value = IMPORTANT.replace(value, "").trim().to_string();
            if property.is_empty() || value.is_empty() {
                return None;
            }
            Some(Declaration {
                property,
                value,
                important,
            })
        })
        .collect()
}

/// `(ids, classes + attributes, element names)` for a selector without pseudo-classes.
fn specificity(selector: &str) -> (u32, u32, u32) {
    let (mut ids, mut classes, mut types) = (0, 0, 0);
    let mut chars = selector.chars().peekable();
    let mut compound_start = true;

    while let Some(ch) = chars.next() {
        match ch {
            '#' | '.' => {
                if ch == '#' {
                    ids += 1;
                } else {
                    classes += 1;
                }
                while chars.next_if(|c| is_ident_char(*c)).is_some() {}
                compound_start = false;
            }
            '[' => {
                classes += 1;
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                }
                compound_start = false;
            }
            ' ' | '\t' | '\n' | '>' | '+' | '~' => compound_start = true,
            c if compound_start && (c.is_alphabetic() || c == '_') => {
                types += 1;
                while chars.next_if(|c| is_ident_char(*c)).is_some() {}
                compound_start = false;
            }
            _ => compound_start = false,
        }
    }
    (ids, classes, types)
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '-' || ch == '_'
}

#[derive(Default)]
struct StyleMap {
    declarations: Vec<Declaration>,
}

impl StyleMap {
    /// Later declarations win unless the existing one is `!important` and the new one is not.
    fn apply(&mut self, declaration: Declaration) {
        match self
            .declarations
            .iter_mut()
            .find(|existing| existing.property == declaration.property)
        {
            Some(existing) if existing.important && !declaration.important => {}
            Some(existing) => *existing = declaration,
            None => self.declarations.push(declaration),
        }
    }

    /// The element's own declarations replace matched rules unconditionally.
    fn set(&mut self, declaration: Declaration) {
        match self
            .declarations
            .iter_mut()
            .find(|existing| existing.property == declaration.property)
        {
            Some(existing) => *existing = declaration,
            None => self.declarations.push(declaration),
        }
    }

    fn render(&self) -> String {
        self.declarations
            .iter()
            .map(|declaration| {
                if declaration.important {
                    format!("{}: {} !important", declaration.property, declaration.value)
                } else {
                    format!("{}: {}", declaration.property, declaration.value)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

struct Serializer<'a> {
    rules: &'a [InlineRule],
    retained: Option<&'a str>,
    out: String,
}

impl Serializer<'_> {
    fn write_node(&mut self, node: &Node, element: Option<ElementRef<'_>>, raw_text: bool) {
        match node {
            Node::Doctype(doctype) => {
                let _ = write!(self.out, "<!DOCTYPE {}", doctype.name());
                if !doctype.public_id().is_empty() {
                    let _ = write!(self.out, " PUBLIC \"{}\"", doctype.public_id());
                }
                if !doctype.system_id().is_empty() {
                    let _ = write!(self.out, " \"{}\"", doctype.system_id());
                }
                self.out.push('>');
            }
            Node::Comment(comment) => {
                let _ = write!(self.out, "<!--{}-->", &**comment);
            }
            Node::Text(text) if raw_text => self.out.push_str(text),
            Node::Text(text) => escape_into(&mut self.out, text, false),
            Node::Element(_) => {
                if let Some(element) = element {
                    self.write_element(element);
                }
            }
            _ => {}
        }
    }

    fn write_element(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        if name == "style" {
            if let Some(css) = self.retained.take().filter(|css| !css.is_empty()) {
                let _ = write!(self.out, "<style type=\"text/css\">\n{css}\n</style>");
            }
            return;
        }

        let style = self.resolve(element);
        self.out.push('<');
        self.out.push_str(name);
        for (attribute, value) in element.value().attrs() {
            if attribute == "style" && style.is_some() {
                continue;
            }
            self.write_attribute(attribute, value);
        }
        if let Some(style) = &style {
            self.write_attribute("style", style);
        }
        self.out.push('>');

        if VOID_ELEMENTS.contains(&name) {
            return;
        }
        let raw_text = RAW_TEXT_ELEMENTS.contains(&name);
        for child in element.children() {
            self.write_node(child.value(), ElementRef::wrap(child), raw_text);
        }
        let _ = write!(self.out, "</{name}>");
    }

    fn write_attribute(&mut self, name: &str, value: &str) {
        self.out.push(' ');
        self.out.push_str(name);
        self.out.push_str("=\"");
        escape_into(&mut self.out, value, true);
        self.out.push('"');
    }

    fn resolve(&self, element: ElementRef<'_>) -> Option<String> {
        if UNSTYLED_ELEMENTS.contains(&element.value().name()) {
            return None;
        }
        let mut matched: Vec<&InlineRule> = self
            .rules
            .iter()
            .filter(|rule| rule.selector.matches(&element))
            .collect();
        if matched.is_empty() {
            return None;
        }
        matched.sort_by_key(|rule| (rule.specificity, rule.order));

        let mut styles = StyleMap::default();
        for rule in matched {
            for declaration in &rule.declarations {
                styles.apply(declaration.clone());
            }
        }
        if let Some(existing) = element.value().attr("style") {
            for declaration in parse_declarations(existing) {
                styles.set(declaration);
            }
        }
        Some(styles.render())
    }
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}
