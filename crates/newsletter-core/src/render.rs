//! Template rendering using Handlebars.
//!
//! The renderer owns its registry. Formatters arrive as an explicit
//! [`FormatterTable`] and are registered as helpers, so templates call them as
//! `{{format_text item.summary}}`. Helper output is written unescaped, so the
//! renderer escapes the field first unless the formatter does it itself. Plain
//! `{{field}}` expressions keep the default HTML escaping.

use std::{fs, io, path::PathBuf};

use handlebars::{
    Context as HbsContext, Handlebars, Helper, HelperResult, Output, RenderContext,
};
use serde::Serialize;
use tracing::debug;

use crate::{
    error::{Error, Result},
    formatters::{escape_html, Escaping, FormatterTable},
    model::{Item, Newsletter},
};

/// A template file addressed by directory and file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub dir: PathBuf,
    pub name: String,
}

impl TemplateRef {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// Read the template source, mapping a missing file to [`Error::TemplateNotFound`].
    pub fn read(&self) -> Result<String> {
        let path = self.path();
        if !path.is_file() {
            return Err(self.not_found());
        }
        fs::read_to_string(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => self.not_found(),
            _ => Error::InputRead { path, source },
        })
    }

    fn not_found(&self) -> Error {
        Error::TemplateNotFound {
            name: self.name.clone(),
            dir: self.dir.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TemplateContext<'a> {
    newsletter: IssueView<'a>,
    item_count: usize,
    generated_at: &'a str,
}

#[derive(Debug, Serialize)]
struct IssueView<'a> {
    date: String,
    display_date: String,
    subject: Option<&'a str>,
    items: &'a [Item],
}

pub struct Renderer<'reg> {
    handlebars: Handlebars<'reg>,
}

impl Renderer<'_> {
    pub fn new(formatters: &FormatterTable) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);

        for (name, formatter, escaping) in formatters.iter() {
            handlebars.register_helper(
                name,
                Box::new(
                    move |helper: &Helper,
                          _: &Handlebars,
                          _: &HbsContext,
                          _: &mut RenderContext,
                          out: &mut dyn Output|
                          -> HelperResult {
                        let input = helper
                            .param(0)
                            .and_then(|param| param.value().as_str())
                            .unwrap_or_default();
                        let html = match escaping {
                            Escaping::Renderer => formatter(&escape_html(input)),
                            Escaping::Formatter => formatter(input),
                        };
                        out.write(&html)?;
                        Ok(())
                    },
                ),
            );
        }

        debug!(
            target: "newsletter_core",
            helpers = formatters.len(),
            "template renderer initialized"
        );
        Self { handlebars }
    }

    /// Render `newsletter` through the template file named by `template`.
    pub fn render(
        &self,
        newsletter: &Newsletter,
        template: &TemplateRef,
        generated_at: &str,
    ) -> Result<String> {
        let source = template.read()?;
        self.render_source(&template.name, &source, newsletter, generated_at)
    }

    /// Render `newsletter` through an in-memory template.
    pub fn render_source(
        &self,
        name: &str,
        source: &str,
        newsletter: &Newsletter,
        generated_at: &str,
    ) -> Result<String> {
        let context = TemplateContext {
            newsletter: IssueView {
                date: newsletter.iso_date(),
                display_date: newsletter.display_date(),
                subject: newsletter.subject.as_deref(),
                items: &newsletter.items,
            },
            item_count: newsletter.items.len(),
            generated_at,
        };

        let html = self
            .handlebars
            .render_template(source, &context)
            .map_err(|error| Error::Render {
                name: name.to_string(),
                source: Box::new(error),
            })?;

        debug!(
            target: "newsletter_core",
            template = name,
            bytes = html.len(),
            "template rendered"
        );
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatters::FormatterTable;
    use time::macros::date;

    fn newsletter() -> Newsletter {
        Newsletter {
            date: date!(2025 - 03 - 01),
            subject: Some("Weekly".to_string()),
            items: vec![Item {
                company: "Acme & Co".to_string(),
                title: "Launch".to_string(),
                summary: "Shipped **today**[1]".to_string(),
                why_it_matters: "Market shift".to_string(),
                next_steps: "- Call them\n- Write notes".to_string(),
                teams: vec!["Sales".to_string()],
                link: None,
                source: None,
            }],
        }
    }

    #[test]
    fn helpers_come_from_the_table() {
        let renderer = Renderer::new(&FormatterTable::standard());
        let html = renderer
            .render_source(
                "inline",
                "{{#each newsletter.items}}{{format_text summary}}|{{format_list next_steps}}{{/each}}",
                &newsletter(),
                "now",
            )
            .expect("renders");
        assert_eq!(
            html,
            "<p>Shipped <strong>today</strong></p>|<ul class=\"bullets\">\n<li>Call them</li>\n<li>Write notes</li>\n</ul>"
        );
    }

    #[test]
    fn single_formatters_receive_escaped_fields() {
        let mut issue = newsletter();
        issue.items[0].summary =
            "<script>x</script>\nb[2]:contentReference[oaicite:0]{index=0}".to_string();
        let renderer = Renderer::new(&FormatterTable::standard());
        let html = renderer
            .render_source(
                "inline",
                "{{#each newsletter.items}}{{nl2br summary}}|{{clean_citations summary}}{{/each}}",
                &issue,
                "now",
            )
            .expect("renders");
        assert_eq!(
            html,
            "&lt;script&gt;x&lt;/script&gt;<br>b[2]:contentReference[oaicite:0]{index=0}\
             |&lt;script&gt;x&lt;/script&gt;\nb"
        );
    }

    #[test]
    fn plain_fields_are_escaped() {
        let renderer = Renderer::new(&FormatterTable::empty());
        let html = renderer
            .render_source(
                "inline",
                "{{newsletter.display_date}} {{#each newsletter.items}}{{company}}{{/each}} {{item_count}} {{generated_at}}",
                &newsletter(),
                "2025-03-01 09:00:00",
            )
            .expect("renders");
        assert_eq!(html, "March 1, 2025 Acme &amp; Co 1 2025-03-01 09:00:00");
    }

    #[test]
    fn missing_template_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let renderer = Renderer::new(&FormatterTable::standard());
        let template = TemplateRef::new(dir.path(), "absent.html.hbs");
        let error = renderer
            .render(&newsletter(), &template, "now")
            .expect_err("template is missing");
        assert!(matches!(error, Error::TemplateNotFound { ref name, .. } if name == "absent.html.hbs"));
    }

    #[test]
    fn broken_template_is_a_render_error() {
        let renderer = Renderer::new(&FormatterTable::standard());
        let error = renderer
            .render_source("broken", "{{#each newsletter.items}}", &newsletter(), "now")
            .expect_err("unclosed block");
        assert!(matches!(error, Error::Render { .. }));
    }
}
