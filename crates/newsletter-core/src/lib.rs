use std::path::PathBuf;

use time::{macros::format_description, OffsetDateTime};
use tracing::{debug, info};

pub mod error;
pub mod formatters;
pub mod inline;
pub mod loader;
pub mod model;
pub mod output;
pub mod render;

pub use error::{Error, Result};
pub use formatters::FormatterTable;
pub use model::{Item, Newsletter};
pub use render::{Renderer, TemplateRef};

pub const DEFAULT_INPUT: &str = "newsletter.yaml";
pub const DEFAULT_TEMPLATE: &str = "newsletter.html.hbs";
pub const DEFAULT_TEMPLATE_DIR: &str = "templates";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Inputs for one rendering run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// YAML document to render.
    pub input: PathBuf,
    pub template: TemplateRef,
    /// Explicit output file; overrides the date-derived name.
    pub output: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// Value exposed to templates as `generated_at`. Defaults to the current UTC time.
    pub generated_at: Option<String>,
    /// Skip CSS inlining and keep the rendered `<style>` blocks as-is.
    pub skip_inlining: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            template: TemplateRef::new(DEFAULT_TEMPLATE_DIR, DEFAULT_TEMPLATE),
            output: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            generated_at: None,
            skip_inlining: false,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct Generated {
    pub newsletter: Newsletter,
    pub output_path: PathBuf,
    pub bytes_written: usize,
}

/// Render a loaded newsletter to email-ready HTML without touching the filesystem
/// beyond reading the template.
pub fn render_document(
    newsletter: &Newsletter,
    template: &TemplateRef,
    formatters: &FormatterTable,
    generated_at: &str,
) -> Result<String> {
    let html = Renderer::new(formatters).render(newsletter, template, generated_at)?;
    Ok(inline::inline_css(&html))
}

/// Load, render, inline and write one newsletter issue.
pub fn generate(config: &PipelineConfig) -> Result<Generated> {
    info!(
        target: "newsletter_core",
        input = %config.input.display(),
        "loading newsletter data"
    );
    let newsletter = loader::load(&config.input)?;

    let output_path =
        output::resolve_output_path(config.output.as_deref(), &config.output_dir, newsletter.date);
    let generated_at = config.generated_at.clone().unwrap_or_else(timestamp_now);

    info!(
        target: "newsletter_core",
        template = %config.template.name,
        "rendering newsletter"
    );
    let html = if config.skip_inlining {
        Renderer::new(&FormatterTable::standard()).render(
            &newsletter,
            &config.template,
            &generated_at,
        )?
    } else {
        render_document(
            &newsletter,
            &config.template,
            &FormatterTable::standard(),
            &generated_at,
        )?
    };
    debug!(
        target: "newsletter_core",
        bytes = html.len(),
        "generated HTML"
    );

    output::write_output(&output_path, &html)?;
    info!(
        target: "newsletter_core",
        output = %output_path.display(),
        "newsletter generated"
    );

    Ok(Generated {
        newsletter,
        output_path,
        bytes_written: html.len(),
    })
}

/// Current UTC time in the form templates display, e.g. `2025-03-01 09:30:00 UTC`.
#[must_use]
pub fn timestamp_now() -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    let now = OffsetDateTime::now_utc();
    now.format(&format).unwrap_or_else(|_| now.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_bundled_layout() {
        let config = PipelineConfig::default();
        assert_eq!(config.template.path(), PathBuf::from("templates/newsletter.html.hbs"));
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert!(config.output.is_none());
    }

    #[test]
    fn timestamp_has_expected_shape() {
        let stamp = timestamp_now();
        assert_eq!(stamp.len(), "2025-03-01 09:30:00 UTC".len());
        assert!(stamp.ends_with(" UTC"));
    }
}
