use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use newsletter_core::{Generated, PipelineConfig, TemplateRef};
use settings::Settings;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "newsletter",
    version,
    about = "Render YAML newsletter content into an email-ready HTML file."
)]
struct Cli {
    /// Path to the YAML newsletter data.
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,
    /// Path to the YAML newsletter data (same as the positional INPUT).
    #[arg(long = "yaml", value_name = "PATH", conflicts_with = "input")]
    yaml: Option<PathBuf>,
    /// Template file name inside the template directory.
    #[arg(long)]
    template: Option<String>,
    /// Directory containing templates.
    #[arg(long)]
    template_dir: Option<PathBuf>,
    /// Output HTML file path (default: derived from the newsletter date).
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Directory for date-named output files.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Open the generated newsletter in the default browser.
    #[arg(long)]
    preview: bool,
    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
    /// Disable ANSI colors in log output.
    #[arg(long)]
    no_color: bool,
    /// Keep the rendered `<style>` blocks instead of inlining them.
    #[arg(long)]
    no_inline: bool,
    /// Settings file (default: ./newsletter.toml when present).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Print a shell completion script and exit.
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

impl Cli {
    /// Merge flags over layered settings; flags always win.
    fn pipeline_config(&self, settings: Settings) -> PipelineConfig {
        let input = self
            .input
            .clone()
            .or_else(|| self.yaml.clone())
            .unwrap_or(settings.input);
        let template = TemplateRef::new(
            self.template_dir.clone().unwrap_or(settings.template_dir),
            self.template.clone().unwrap_or(settings.template),
        );

        PipelineConfig {
            input,
            template,
            output: self.output.clone(),
            output_dir: self.output_dir.clone().unwrap_or(settings.output_dir),
            generated_at: None,
            skip_inlining: self.no_inline,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "newsletter", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(&cli)?;
    let settings = settings::load(cli.config.as_deref())?;
    let config = cli.pipeline_config(settings);

    let generated = match newsletter_core::generate(&config) {
        Ok(generated) => generated,
        Err(error) => {
            if error.is_input_error() {
                info!(target: "newsletter_cli", "Please check your YAML file structure");
            }
            return Err(anyhow::Error::new(error).context("newsletter generation failed"));
        }
    };

    if cli.preview {
        preview::open(&generated.output_path);
    }
    print_summary(&generated);
    Ok(())
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,newsletter_core={level},newsletter_cli={level}"
        ))
    });
    fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose)
        .without_time()
        .with_ansi(!cli.no_color)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize logging: {error}"))
}

fn print_summary(generated: &Generated) {
    let newsletter = &generated.newsletter;
    println!();
    println!("Newsletter Summary:");
    println!("  Date: {}", newsletter.iso_date());
    println!(
        "  Subject: {}",
        newsletter.subject.as_deref().unwrap_or("No subject")
    );
    println!("  Items: {}", newsletter.items.len());
    println!("  Output: {}", generated.output_path.display());
}

mod preview {
    use std::path::Path;

    use tracing::{info, warn};

    /// Open `path` in the default browser. Failures are logged, never fatal.
    pub fn open(path: &Path) {
        let absolute = match std::fs::canonicalize(path) {
            Ok(absolute) => absolute,
            Err(error) => {
                warn!(
                    target: "newsletter_cli",
                    error = %error,
                    path = %path.display(),
                    "unable to resolve output path for preview"
                );
                return;
            }
        };
        let url = format!("file://{}", absolute.display());
        info!(target: "newsletter_cli", url = %url, "opening newsletter in browser");
        if let Err(error) = webbrowser::open(&url) {
            warn!(
                target: "newsletter_cli",
                error = %error,
                "failed to open browser preview"
            );
        }
    }
}

mod settings {
    use std::path::{Path, PathBuf};

    use anyhow::{Context, Result};
    use config::{Config, Environment, File, FileFormat};
    use newsletter_core::{
        DEFAULT_INPUT, DEFAULT_OUTPUT_DIR, DEFAULT_TEMPLATE, DEFAULT_TEMPLATE_DIR,
    };
    use serde::Deserialize;
    use tracing::debug;

    const CONFIG_FILE: &str = "newsletter.toml";
    const ENV_PREFIX: &str = "NEWSLETTER";

    /// Defaults layered under `newsletter.toml` and `NEWSLETTER_*` variables.
    #[derive(Debug, Clone, Deserialize)]
    pub struct Settings {
        pub input: PathBuf,
        pub template: String,
        pub template_dir: PathBuf,
        pub output_dir: PathBuf,
    }

    pub fn load(explicit: Option<&Path>) -> Result<Settings> {
        let file = match explicit {
            Some(path) => File::from(path).required(true),
            None => File::new(CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let settings: Settings = Config::builder()
            .set_default("input", DEFAULT_INPUT)?
            .set_default("template", DEFAULT_TEMPLATE)?
            .set_default("template_dir", DEFAULT_TEMPLATE_DIR)?
            .set_default("output_dir", DEFAULT_OUTPUT_DIR)?
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("failed to load settings")?
            .try_deserialize()
            .context("invalid settings")?;

        debug!(target: "newsletter_cli", settings = ?settings, "settings resolved");
        Ok(settings)
    }
}
