//! Dependency manifest
//!
//! The manifest is a script of `goog.addDependency` calls the remote
//! loader evaluates to learn where every namespace lives. Paths are
//! relative to the `goog/` directory holding `base.js`.

use std::fs;
use std::path::{Path, PathBuf};

use super::{BuildResult, DependencyRecord};

/// File name of the manifest under the output directory
pub const MANIFEST_FILE: &str = "cljs_deps.js";

/// Path of a library-relative file as seen from `goog/`
pub fn path_from_goog(rel_path: &str) -> String {
    match rel_path.strip_prefix("goog/") {
        Some(inside) => inside.to_string(),
        None => format!("../{}", rel_path),
    }
}

fn js_array(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{}'", s)).collect();
    format!("[{}]", quoted.join(", "))
}

/// The `goog.addDependency(...)` call registering one unit
pub fn add_dependency_line(record: &DependencyRecord) -> String {
    format!(
        "goog.addDependency(\"{}\", {}, {});",
        path_from_goog(&record.rel_path),
        js_array(&record.provides),
        js_array(&record.requires)
    )
}

/// Render the manifest for every given unit
pub fn render<'a>(records: impl IntoIterator<Item = &'a DependencyRecord>) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&add_dependency_line(record));
        out.push('\n');
    }
    out
}

/// Write the manifest under `output_dir`
pub fn write<'a>(
    output_dir: &Path,
    records: impl IntoIterator<Item = &'a DependencyRecord>,
) -> BuildResult<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(MANIFEST_FILE);
    fs::write(&path, render(records))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::RecordKind;

    fn record(
        rel_path: &str,
        provides: &[&str],
        requires: &[&str],
    ) -> DependencyRecord {
        DependencyRecord {
            provides: provides.iter().map(|s| s.to_string()).collect(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            rel_path: rel_path.to_string(),
            url: PathBuf::from("/lib").join(rel_path),
            kind: RecordKind::Ordinary,
        }
    }

    #[test]
    fn test_add_dependency_line() {
        let line = add_dependency_line(&record(
            "app/core.js",
            &["app.core"],
            &["cljs.core", "app.util"],
        ));
        assert_eq!(
            line,
            "goog.addDependency(\"../app/core.js\", ['app.core'], ['cljs.core', 'app.util']);"
        );
    }

    #[test]
    fn test_goog_units_are_relative_to_goog() {
        let line = add_dependency_line(&record("goog/string/string.js", &["goog.string"], &[]));
        assert_eq!(
            line,
            "goog.addDependency(\"string/string.js\", ['goog.string'], []);"
        );
    }

    #[test]
    fn test_write_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let records = [record("a.js", &["a"], &[]), record("b.js", &["b"], &["a"])];
        let path = write(dir.path(), &records).unwrap();
        assert_eq!(path.file_name().unwrap(), MANIFEST_FILE);
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
