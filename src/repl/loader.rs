//! Namespace loading
//!
//! Delivers the compiled units a namespace needs, skipping anything the
//! session has already delivered. With an output directory the units are
//! written there and registered in the runtime's dependency manifest;
//! otherwise each unit goes through [`EvalBackend::load`].

use indexmap::IndexSet;
use tracing::{debug, info};

use super::{Repl, ReplError, ReplResult};
use crate::backends::EvalBackend;
use crate::build::{add_dependency_line, BuildGraph, RecordKind};
use crate::compiler::{Compiler, CORE_NS};

impl<B: EvalBackend, C: Compiler, G: BuildGraph> Repl<B, C, G> {
    /// Deliver `ns` and everything it depends on
    ///
    /// Returns the number of units delivered by this call.
    pub fn load_namespace(
        &mut self,
        ns: &str,
    ) -> ReplResult<usize> {
        let records = self.graph.closure(ns)?;
        let output_dir = self.options.output_dir().map(|p| p.to_path_buf());

        let mut delivered = 0;
        for record in &records {
            if record.kind == RecordKind::Seed || record.provides_only(CORE_NS) {
                continue;
            }
            if record.provides.iter().all(|p| self.loaded.contains(p)) {
                continue;
            }

            match &output_dir {
                Some(dir) => {
                    let written = self.graph.materialize(record, dir)?;
                    debug!("Wrote {}", written.display());
                    let line = add_dependency_line(record);
                    let result = self.backend.evaluate(&record.rel_path, 1, &line)?;
                    if !result.is_success() {
                        return Err(ReplError::LoadFailed {
                            ns: record.provides.first().cloned().unwrap_or_default(),
                            message: result.value().to_string(),
                        });
                    }
                }
                None => self.backend.load(&record.provides, &record.url)?,
            }

            self.loaded.extend(record.provides.iter().cloned());
            delivered += 1;
        }

        if delivered > 0 {
            info!("Loaded {} unit(s) for {}", delivered, ns);
        }
        Ok(delivered)
    }

    /// Deliver several namespaces, each at most once
    pub fn load_dependencies(
        &mut self,
        namespaces: &[String],
    ) -> ReplResult<usize> {
        let unique: IndexSet<&String> = namespaces.iter().collect();
        let mut delivered = 0;
        for ns in unique {
            delivered += self.load_namespace(ns)?;
        }
        Ok(delivered)
    }

    /// Whether `ns` was delivered during this session
    pub fn is_loaded(
        &self,
        ns: &str,
    ) -> bool {
        self.loaded.contains(ns)
    }
}
