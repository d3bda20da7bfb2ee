use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use time::{macros::format_description, Date};
use tracing::debug;

use crate::error::{Error, Result};

/// Default file name for an issue, e.g. `newsletter_20250301.html`.
#[must_use]
pub fn output_filename(date: Date) -> String {
    let format = format_description!("[year][month][day]");
    let stamp = date
        .format(&format)
        .unwrap_or_else(|_| date.to_string().replace('-', ""));
    format!("newsletter_{stamp}.html")
}

/// An explicit path wins; otherwise the date-derived name inside `output_dir`.
#[must_use]
pub fn resolve_output_path(explicit: Option<&Path>, output_dir: &Path, date: Date) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => output_dir.join(output_filename(date)),
    }
}

/// Write `html` to `path`, creating missing parent directories first.
pub fn write_output(path: &Path, html: &str) -> Result<()> {
    let failed = |source| Error::OutputWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(failed)?;
    }
    let mut file = File::create(path).map_err(failed)?;
    file.write_all(html.as_bytes()).map_err(failed)?;
    file.flush().map_err(failed)?;

    debug!(
        target: "newsletter_core",
        path = %path.display(),
        bytes = html.len(),
        "output written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn filename_uses_compact_date() {
        assert_eq!(
            output_filename(date!(2025 - 03 - 01)),
            "newsletter_20250301.html"
        );
    }

    #[test]
    fn explicit_path_wins() {
        let explicit = Path::new("custom/issue.html");
        let resolved =
            resolve_output_path(Some(explicit), Path::new("output"), date!(2025 - 03 - 01));
        assert_eq!(resolved, PathBuf::from("custom/issue.html"));

        let derived = resolve_output_path(None, Path::new("output"), date!(2025 - 03 - 01));
        assert_eq!(derived, PathBuf::from("output/newsletter_20250301.html"));
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("deeper").join("issue.html");
        write_output(&path, "<p>hi</p>").expect("write succeeds");
        assert_eq!(fs::read_to_string(&path).expect("readable"), "<p>hi</p>");
    }

    #[test]
    fn unwritable_destination_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").expect("seed file");
        let error = write_output(&blocker.join("issue.html"), "<p/>").expect_err("parent is a file");
        assert!(matches!(error, Error::OutputWrite { .. }));
    }
}
