//! cljsrepl
//!
//! An interactive REPL for a Lisp dialect compiled to JavaScript. Forms are
//! read, compiled and sent to a pluggable evaluation backend; the bundled
//! backend runs a Node.js child process over a local socket.
//!
//! # Example
//!
//! ```no_run
//! use std::io::{self, Cursor};
//!
//! use cljsrepl::backends::node::{NodeBackend, NodeOptions};
//! use cljsrepl::build::JsLibrary;
//! use cljsrepl::compiler::JsCompiler;
//! use cljsrepl::reader::BufReadSource;
//! use cljsrepl::repl::{run_session, ReplOptions};
//!
//! fn main() -> cljsrepl::Result<()> {
//!     let library = JsLibrary::scan("out")?;
//!     let backend = NodeBackend::new(NodeOptions::default(), library.clone());
//!     let input = BufReadSource::new(Cursor::new("(+ 1 2)\n:cljs/quit\n"));
//!     run_session(backend, JsCompiler::new(), library, ReplOptions::default(), input, &mut io::stdout())?;
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

// Public modules
pub mod backends;
pub mod build;
pub mod compiler;
pub mod reader;
pub mod repl;
pub mod source_map;

// Utility modules
pub mod util;

use std::io::Write;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

use tracing::debug;

use crate::backends::node::{NodeBackend, NodeOptions};
use crate::build::JsLibrary;
use crate::compiler::JsCompiler;
use crate::reader::LineSource;
use crate::repl::{ReplOptions, SessionExit};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Program name
pub const NAME: &str = "cljsrepl";

/// Run a Node.js session over the precompiled units in `lib_dir`
pub fn run_node_repl<S: LineSource>(
    node: NodeOptions,
    options: ReplOptions,
    lib_dir: &std::path::Path,
    source: S,
    out: &mut dyn Write,
) -> Result<SessionExit> {
    debug!("Scanning library {}", lib_dir.display());
    let library = JsLibrary::scan(lib_dir)
        .with_context(|| format!("Failed to scan library: {}", lib_dir.display()))?;
    let backend = NodeBackend::new(node, library.clone());
    let exit = repl::run_session(backend, JsCompiler::new(), library, options, source, out)
        .context("REPL session failed")?;
    Ok(exit)
}
