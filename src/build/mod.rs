//! Build collaborator
//!
//! Resolves namespaces to compiled units and lays them out under the
//! compiled-output directory. The REPL depends only on [`BuildGraph`];
//! [`JsLibrary`] is the bundled implementation over a directory of
//! precompiled JavaScript.

pub mod library;
pub mod manifest;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use library::JsLibrary;
pub use manifest::{add_dependency_line, MANIFEST_FILE};

/// Build errors
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot scan library: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Unknown namespace: {0}")]
    UnknownNamespace(String),

    #[error("Circular dependency: {0}")]
    Cycle(String),

    #[error("Namespace {ns} is provided by both {first} and {second}")]
    DuplicateProvide {
        ns: String,
        first: String,
        second: String,
    },

    #[error("Runtime file not found in library: {0}")]
    MissingRuntime(PathBuf),
}

/// Result type for build operations
pub type BuildResult<T> = Result<T, BuildError>;

/// Whether a record is a compiled unit or the request that started a closure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Ordinary,
    /// Marker for the requested namespace; provides nothing, always last
    Seed,
}

/// One compiled unit in a dependency closure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    /// Namespaces the unit provides; the first is its primary name
    pub provides: Vec<String>,
    /// Namespaces the unit requires
    pub requires: Vec<String>,
    /// Path relative to the library root (`/`-separated)
    pub rel_path: String,
    /// Absolute location of the compiled unit
    pub url: PathBuf,
    pub kind: RecordKind,
}

impl DependencyRecord {
    /// Whether `ns` is the only thing this unit provides
    pub fn provides_only(
        &self,
        ns: &str,
    ) -> bool {
        self.provides.len() == 1 && self.provides[0] == ns
    }
}

/// Dependency resolution and output layout
pub trait BuildGraph {
    /// Units `ns` needs, `ns` included, dependencies first, then a seed record
    fn closure(
        &self,
        ns: &str,
    ) -> BuildResult<Vec<DependencyRecord>>;

    /// Copy one unit under `output_dir`, returning the written path
    fn materialize(
        &self,
        record: &DependencyRecord,
        output_dir: &Path,
    ) -> BuildResult<PathBuf>;

    /// Write the base runtime and the loader it needs under `output_dir`
    fn compile_runtime(
        &self,
        output_dir: &Path,
    ) -> BuildResult<()>;

    /// Write the dependency manifest, returning its path
    fn write_manifest(
        &self,
        output_dir: &Path,
    ) -> BuildResult<PathBuf>;
}
