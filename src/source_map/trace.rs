//! Mapped stack-trace printing
//!
//! Frames produced by a backend's trace parser carry positions in compiled
//! JavaScript. [`TraceMapper`] translates them back to the original source
//! when both a source map and the co-located original file are available.
//! Decoded maps and namespace lookups are cached for the whole session.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{decode, map_file_for, SourceMap};
use crate::compiler::demunge;
use crate::reader::read_all;
use crate::util::Position;

/// One frame of a parsed stack trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Compiled file, relative to the output directory
    pub file: String,
    /// JavaScript function name, when known
    pub function: Option<String>,
    /// 1-indexed line
    pub line: u32,
    /// 1-indexed column
    pub column: u32,
}

/// Namespace metadata of an original source file
#[derive(Debug, Clone, PartialEq, Eq)]
struct NamespaceSource {
    ns: String,
    path: PathBuf,
}

/// Remaps and prints stack frames
#[derive(Debug)]
pub struct TraceMapper {
    output_dir: PathBuf,
    maps: HashMap<PathBuf, Option<SourceMap>>,
    namespaces: HashMap<PathBuf, Option<NamespaceSource>>,
}

impl TraceMapper {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            maps: HashMap::new(),
            namespaces: HashMap::new(),
        }
    }

    fn source_map(
        &mut self,
        js: &Path,
    ) -> Option<&SourceMap> {
        self.maps
            .entry(js.to_path_buf())
            .or_insert_with(|| match decode(&map_file_for(js)) {
                Ok(map) => map,
                Err(e) => {
                    debug!("Ignoring source map for {}: {}", js.display(), e);
                    None
                }
            })
            .as_ref()
    }

    fn namespace(
        &mut self,
        js: &Path,
    ) -> Option<NamespaceSource> {
        self.namespaces
            .entry(js.to_path_buf())
            .or_insert_with(|| namespace_of(&js.with_extension("cljs")))
            .clone()
    }

    /// Render one frame, remapped when namespace metadata exists
    pub fn render_frame(
        &mut self,
        frame: &StackFrame,
    ) -> String {
        let js = self.output_dir.join(&frame.file);
        let Some(source) = self.namespace(&js) else {
            return format_frame(
                frame.function.as_deref(),
                &frame.file,
                Position::new(frame.line as usize, frame.column as usize),
            );
        };

        let pos = Position::new(frame.line as usize, frame.column as usize);
        let pos = match self.source_map(&js) {
            Some(map) => map.map_position(pos),
            None => pos,
        };
        let function = match &frame.function {
            Some(f) => format!("{}/{}", source.ns, demangle_function(f)),
            None => source.ns.clone(),
        };
        format_frame(Some(&function), &relative_to_cwd(&source.path), pos)
    }

    /// Print every frame on its own line
    pub fn print_mapped_trace(
        &mut self,
        frames: &[StackFrame],
        out: &mut dyn Write,
    ) -> io::Result<()> {
        for frame in frames {
            writeln!(out, "{}", self.render_frame(frame))?;
        }
        Ok(())
    }
}

fn format_frame(
    function: Option<&str>,
    file: &str,
    pos: Position,
) -> String {
    match function {
        Some(f) => format!("\t{} ({}:{}:{})", f, file, pos.line, pos.column),
        None => format!("\t{}:{}:{}", file, pos.line, pos.column),
    }
}

/// Last segment of a compiled function name, demunged
fn demangle_function(name: &str) -> String {
    let last = name.rsplit(['$', '.']).next().unwrap_or(name);
    demunge(last)
}

fn relative_to_cwd(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

/// The namespace declared by the first `(ns ...)` form of a source file
fn namespace_of(path: &Path) -> Option<NamespaceSource> {
    let text = fs::read_to_string(path).ok()?;
    let forms = match read_all(&text) {
        Ok(forms) => forms,
        Err(e) => {
            debug!("Cannot read {}: {}", path.display(), e);
            return None;
        }
    };
    forms
        .iter()
        .filter(|f| f.head_symbol().is_some_and(|s| s.is("ns")))
        .find_map(|f| f.as_list()?.get(1)?.as_symbol().map(|s| s.name.clone()))
        .map(|ns| NamespaceSource {
            ns,
            path: path.to_path_buf(),
        })
}
