use std::{fs, path::PathBuf};

use newsletter_core::{
    generate, loader, render_document, Error, FormatterTable, PipelineConfig, TemplateRef,
    DEFAULT_TEMPLATE,
};
use tempfile::tempdir;

const MINIMAL: &str = r"
newsletter:
  date: 2025-03-01
  items:
    - company: Quantexa
      title: Entity resolution goes real-time
      summary: Quantexa shipped streaming entity resolution.[1]
      why_it_matters: Screening latency drops from hours to seconds.
      next_steps: Ask the data team for a benchmark.
";

const FULL: &str = r"
newsletter:
  date: 2025-03-08
  subject: Weekly AI Brief
  items:
    - company: Fenergo
      title: Agentic onboarding
      summary: |
        Fenergo announced **agentic** onboarding.

        Pilot customers report faster reviews.[2]
      why_it_matters: Competitive pressure on onboarding time.
      next_steps: |
        - Review the demo
        - Compare with our roadmap
      teams: [Product, Sales]
      link: https://example.com/fenergo
      source: Fenergo press release
";

fn template_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../templates")
}

fn bundled_template() -> TemplateRef {
    TemplateRef::new(template_dir(), DEFAULT_TEMPLATE)
}

#[test]
fn minimal_issue_renders_end_to_end() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("issue.yaml");
    fs::write(&input, MINIMAL).expect("write input");

    let config = PipelineConfig {
        input,
        template: bundled_template(),
        output: None,
        output_dir: dir.path().join("out"),
        generated_at: Some("2025-03-01 08:00:00 UTC".to_string()),
        skip_inlining: false,
    };
    let generated = generate(&config).expect("pipeline succeeds");

    assert_eq!(
        generated.output_path,
        dir.path().join("out").join("newsletter_20250301.html")
    );
    let html = fs::read_to_string(&generated.output_path).expect("output exists");
    assert_eq!(html.len(), generated.bytes_written);
    assert!(html.contains("Entity resolution goes real-time"));
    assert!(html.contains("Quantexa"));
    assert!(html.contains("March 1, 2025"));
    assert!(!html.contains("[1]"));
}

#[test]
fn rendering_is_deterministic() {
    let newsletter = loader::load_str(FULL).expect("valid document");
    let formatters = FormatterTable::standard();
    let first = render_document(&newsletter, &bundled_template(), &formatters, "fixed")
        .expect("first render");
    let second = render_document(&newsletter, &bundled_template(), &formatters, "fixed")
        .expect("second render");
    assert_eq!(first, second);
}

#[test]
fn formatted_fields_and_optional_parts_appear() {
    let newsletter = loader::load_str(FULL).expect("valid document");
    let html = render_document(
        &newsletter,
        &bundled_template(),
        &FormatterTable::standard(),
        "fixed",
    )
    .expect("renders");

    assert!(html.contains("<strong"), "bold markup converted");
    assert!(html.contains("Review the demo</li>"));
    assert!(html.contains(">Product</span>"));
    assert!(html.contains("href=\"https://example.com/fenergo\""));
    assert!(html.contains("Fenergo press release"));
    assert!(html.contains("Weekly AI Brief"));
    assert!(!html.contains("[2]"));
}

#[test]
fn styles_are_inlined_and_media_queries_kept() {
    let newsletter = loader::load_str(FULL).expect("valid document");
    let html = render_document(
        &newsletter,
        &bundled_template(),
        &FormatterTable::standard(),
        "fixed",
    )
    .expect("renders");

    assert!(html.contains("<div class=\"card\" style=\""), "card styled inline");
    assert!(html.contains("<li style=\"margin-bottom: 5px\">"), "{html}");
    assert!(html.contains("@media only screen and (max-width: 660px)"));
    assert_eq!(html.matches("<style").count(), 1);
    assert!(!html.contains(".team-tag {"));
}

#[test]
fn unknown_template_fails() {
    let newsletter = loader::load_str(MINIMAL).expect("valid document");
    let template = TemplateRef::new(template_dir(), "missing.html.hbs");
    let error = render_document(&newsletter, &template, &FormatterTable::standard(), "fixed")
        .expect_err("template does not exist");
    assert!(matches!(error, Error::TemplateNotFound { .. }));
}

#[test]
fn malformed_input_writes_nothing() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("broken.yaml");
    fs::write(&input, "newsletter:\n  date: yesterday\n  items: []\n").expect("write input");

    let config = PipelineConfig {
        input,
        template: bundled_template(),
        output_dir: dir.path().join("out"),
        ..PipelineConfig::default()
    };
    let error = generate(&config).expect_err("date is invalid");
    assert!(matches!(error, Error::MalformedInput { .. }));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn explicit_output_and_skipped_inlining() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("issue.yaml");
    fs::write(&input, MINIMAL).expect("write input");
    let target = dir.path().join("custom").join("preview.html");

    let config = PipelineConfig {
        input,
        template: bundled_template(),
        output: Some(target.clone()),
        output_dir: dir.path().join("unused"),
        generated_at: Some("fixed".to_string()),
        skip_inlining: true,
    };
    let generated = generate(&config).expect("pipeline succeeds");
    assert_eq!(generated.output_path, target);

    let html = fs::read_to_string(&target).expect("output exists");
    assert!(html.contains(".card {"));
    assert!(!dir.path().join("unused").exists());
}
