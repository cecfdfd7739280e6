//! Precompiled JavaScript library
//!
//! Indexes every `.js` file under a library root by the namespaces it
//! declares with `goog.provide` and `goog.require`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use super::{manifest, BuildError, BuildGraph, BuildResult, DependencyRecord, RecordKind};
use crate::compiler::CORE_NS;
use crate::source_map::map_file_for;

static PROVIDE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"goog\.provide\(\s*['"]([\w.$-]+)['"]\s*\)"#).expect("provide pattern")
});

static REQUIRE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"goog\.require\(\s*['"]([\w.$-]+)['"]\s*\)"#).expect("require pattern")
});

/// Location of the loader bootstrap inside a library
pub const GOOG_BASE: &str = "goog/base.js";

/// Visit state for cycle detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Done,
}

#[derive(Debug, Clone)]
struct Unit {
    rel_path: String,
    path: PathBuf,
    provides: Vec<String>,
    requires: Vec<String>,
}

/// A directory of precompiled units
#[derive(Debug, Clone)]
pub struct JsLibrary {
    root: PathBuf,
    units: Vec<Unit>,
    /// namespace -> index into `units`
    providers: HashMap<String, usize>,
}

/// Namespaces declared by a compiled unit: (provides, requires)
pub fn parse_declarations(js: &str) -> (Vec<String>, Vec<String>) {
    let collect = |re: &Regex| -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for cap in re.captures_iter(js) {
            let name = cap[1].to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    };
    (collect(&PROVIDE_RE), collect(&REQUIRE_RE))
}

impl JsLibrary {
    /// Index every unit below `root`
    pub fn scan(root: impl Into<PathBuf>) -> BuildResult<Self> {
        let root = root.into();
        let mut library = Self {
            root: root.clone(),
            units: Vec::new(),
            providers: HashMap::new(),
        };

        for entry in WalkDir::new(&root).follow_links(true).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|s| s.to_str()) != Some("js")
            {
                continue;
            }
            let (provides, requires) = parse_declarations(&fs::read_to_string(path)?);
            if provides.is_empty() {
                continue;
            }
            let rel_path = path
                .strip_prefix(&root)
                .unwrap_or(path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            library.add(Unit {
                rel_path,
                path: path.to_path_buf(),
                provides,
                requires,
            })?;
        }

        debug!(
            "Indexed {} units under {}",
            library.units.len(),
            root.display()
        );
        Ok(library)
    }

    fn add(
        &mut self,
        unit: Unit,
    ) -> BuildResult<()> {
        let idx = self.units.len();
        for ns in &unit.provides {
            if let Some(&other) = self.providers.get(ns) {
                return Err(BuildError::DuplicateProvide {
                    ns: ns.clone(),
                    first: self.units[other].rel_path.clone(),
                    second: unit.rel_path,
                });
            }
            self.providers.insert(ns.clone(), idx);
        }
        self.units.push(unit);
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether some unit provides `ns`
    pub fn provides(
        &self,
        ns: &str,
    ) -> bool {
        self.providers.contains_key(ns)
    }

    fn provider(
        &self,
        ns: &str,
    ) -> BuildResult<usize> {
        self.providers
            .get(ns)
            .copied()
            .ok_or_else(|| BuildError::UnknownNamespace(ns.to_string()))
    }

    fn record(
        &self,
        idx: usize,
        kind: RecordKind,
    ) -> DependencyRecord {
        let unit = &self.units[idx];
        DependencyRecord {
            provides: unit.provides.clone(),
            requires: unit.requires.clone(),
            rel_path: unit.rel_path.clone(),
            url: unit.path.clone(),
            kind,
        }
    }

    /// Records for every unit, in scan order
    pub fn records(&self) -> Vec<DependencyRecord> {
        (0..self.units.len())
            .map(|idx| self.record(idx, RecordKind::Ordinary))
            .collect()
    }

    fn visit(
        &self,
        idx: usize,
        states: &mut HashMap<usize, VisitState>,
        stack: &mut Vec<String>,
        order: &mut Vec<usize>,
    ) -> BuildResult<()> {
        let unit = &self.units[idx];
        match states.get(&idx) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::Visiting) => {
                let name = &unit.provides[0];
                let start = stack.iter().position(|s| s == name).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(name.clone());
                return Err(BuildError::Cycle(cycle.join(" -> ")));
            }
            None => {}
        }

        states.insert(idx, VisitState::Visiting);
        stack.push(unit.provides[0].clone());
        for req in &unit.requires {
            // `goog` itself comes from base.js
            if req == "goog" {
                continue;
            }
            let dep = self.provider(req)?;
            self.visit(dep, states, stack, order)?;
        }
        stack.pop();
        states.insert(idx, VisitState::Done);
        order.push(idx);
        Ok(())
    }
}

/// Whether two paths name the same file; `to` need not exist yet
fn same_file(
    from: &Path,
    to: &Path,
) -> bool {
    match (fs::canonicalize(from), fs::canonicalize(to)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn copy_file(
    from: &Path,
    to: &Path,
) -> BuildResult<()> {
    // fs::copy truncates the destination first
    if same_file(from, to) {
        debug!("Skipping copy of {} onto itself", from.display());
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to)?;
    Ok(())
}

impl BuildGraph for JsLibrary {
    fn closure(
        &self,
        ns: &str,
    ) -> BuildResult<Vec<DependencyRecord>> {
        let root = self.provider(ns)?;
        let mut order = Vec::new();
        self.visit(root, &mut HashMap::new(), &mut Vec::new(), &mut order)?;

        let mut records: Vec<DependencyRecord> = order
            .into_iter()
            .map(|idx| self.record(idx, RecordKind::Ordinary))
            .collect();
        let unit = &self.units[root];
        records.push(DependencyRecord {
            provides: Vec::new(),
            requires: vec![ns.to_string()],
            rel_path: unit.rel_path.clone(),
            url: unit.path.clone(),
            kind: RecordKind::Seed,
        });
        Ok(records)
    }

    fn materialize(
        &self,
        record: &DependencyRecord,
        output_dir: &Path,
    ) -> BuildResult<PathBuf> {
        let dest = output_dir.join(&record.rel_path);
        copy_file(&record.url, &dest)?;

        let map = map_file_for(&record.url);
        if map.is_file() {
            copy_file(&map, &map_file_for(&dest))?;
        }
        let source = record.url.with_extension("cljs");
        if source.is_file() {
            copy_file(&source, &dest.with_extension("cljs"))?;
        }
        debug!("Materialized {} -> {}", record.rel_path, dest.display());
        Ok(dest)
    }

    fn compile_runtime(
        &self,
        output_dir: &Path,
    ) -> BuildResult<()> {
        let base = self.root.join(GOOG_BASE);
        if !base.is_file() {
            return Err(BuildError::MissingRuntime(base));
        }
        copy_file(&base, &output_dir.join(GOOG_BASE))?;
        for record in self.closure(CORE_NS)? {
            if record.kind == RecordKind::Ordinary {
                self.materialize(&record, output_dir)?;
            }
        }
        Ok(())
    }

    fn write_manifest(
        &self,
        output_dir: &Path,
    ) -> BuildResult<PathBuf> {
        manifest::write(output_dir, &self.records())
    }
}
