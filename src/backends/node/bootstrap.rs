//! Bootstrap scripts and sequencing
//!
//! The server script is written to disk and fed to the interpreter. Once
//! connected, the initializer and runtime loader are rewritten to point at
//! the output directory and evaluated, followed by the steps that patch
//! the remote Closure loader:
//!
//! 1. evaluate the initializer, which loads `goog/base.js`
//! 2. evaluate the runtime loader (`CLOSURE_IMPORT_SCRIPT`)
//! 3. require the dependency manifest
//! 4. make `goog.isProvided_` always answer false
//! 5. make `goog.require` import straight from the name -> path table
//! 6. require `cljs.core` and enable console printing
//! 7. track loaded namespaces, seeded with `cljs.core`
//!
//! Remote paths are `path.join` expressions over the path components so
//! they hold on any separator convention.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::backends::{BackendError, BackendResult, EvalResult};
use crate::compiler::CORE_NS;

const SERVER_TEMPLATE: &str = include_str!("scripts/server.js");
const INIT_TEMPLATE: &str = include_str!("scripts/init.js");
const LOADER_TEMPLATE: &str = include_str!("scripts/loader.js");

const PORT_PLACEHOLDER: &str = "__PORT__";
const ROOT_PLACEHOLDER: &str = r#"var CLJS_ROOT = ".";"#;
const BASE_PLACEHOLDER: &str = "path.resolve(__dirname, '..', 'base.js')";
const IMPORT_PLACEHOLDER: &str = r#"path.join(".", "..", src)"#;

/// File name of the generated server script
pub const SERVER_SCRIPT: &str = "node_repl.js";

/// One named bootstrap evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapStep {
    pub name: &'static str,
    pub code: String,
}

/// A JavaScript expression evaluating to `path` on the remote side
pub fn path_expr(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| match c {
            Component::RootDir => std::path::MAIN_SEPARATOR.to_string(),
            other => other.as_os_str().to_string_lossy().into_owned(),
        })
        .collect();
    let json = serde_json::to_string(&parts).unwrap_or_else(|_| "[]".to_string());
    format!("path.join.apply(null, {})", json)
}

/// The server script with the port substituted
pub fn server_script(port: u16) -> String {
    SERVER_TEMPLATE.replace(PORT_PLACEHOLDER, &port.to_string())
}

/// Write the server script under `output_dir`
pub fn write_server_script(
    output_dir: &Path,
    port: u16,
) -> BackendResult<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(SERVER_SCRIPT);
    fs::write(&path, server_script(port))?;
    Ok(path)
}

/// The initializer and runtime loader rewritten for `output_dir`
pub fn render_scripts(output_dir: &Path) -> (String, String) {
    let goog_dir = output_dir.join("goog");
    let init = INIT_TEMPLATE
        .replace(
            ROOT_PLACEHOLDER,
            &format!("var CLJS_ROOT = {};", path_expr(output_dir)),
        )
        .replace(BASE_PLACEHOLDER, &path_expr(&goog_dir.join("base.js")));
    let loader = LOADER_TEMPLATE.replace(
        IMPORT_PLACEHOLDER,
        &format!("path.join({}, src)", path_expr(&goog_dir)),
    );
    (init, loader)
}

/// Every bootstrap evaluation, in order
pub fn steps(
    output_dir: &Path,
    manifest: &Path,
) -> Vec<BootstrapStep> {
    let (init, loader) = render_scripts(output_dir);
    let step = |name, code: String| BootstrapStep { name, code };
    vec![
        step("initializer", init),
        step("runtime loader", loader),
        step(
            "dependency manifest",
            format!("require({});", path_expr(manifest)),
        ),
        step(
            "provided predicate",
            "goog.isProvided_ = function(x) { return false; };".to_string(),
        ),
        step(
            "direct require",
            concat!(
                "goog.require = function(name) {\n",
                "  return CLOSURE_IMPORT_SCRIPT(goog.dependencies_.nameToPath[name]);\n",
                "};"
            )
            .to_string(),
        ),
        step(
            "base runtime",
            format!(
                "goog.require(\"{}\");\ncljs.core.enable_console_print_BANG_();",
                CORE_NS
            ),
        ),
        step(
            "loaded-module tracking",
            format!(
                concat!(
                    "goog.cljsReloadAll_ = false;\n",
                    "goog.loadedLibs_ = {{\"{}\": true}};\n",
                    "goog.require = function(name, reload) {{\n",
                    "  if (!goog.loadedLibs_[name] || reload || goog.cljsReloadAll_) {{\n",
                    "    goog.loadedLibs_[name] = true;\n",
                    "    return CLOSURE_IMPORT_SCRIPT(goog.dependencies_.nameToPath[name]);\n",
                    "  }}\n",
                    "}};"
                ),
                CORE_NS
            ),
        ),
    ]
}

/// Run `steps` through `evaluate`, stopping at the first failure
pub fn run(
    steps: &[BootstrapStep],
    mut evaluate: impl FnMut(&str) -> BackendResult<EvalResult>,
) -> BackendResult<()> {
    for step in steps {
        debug!("Bootstrap: {}", step.name);
        let result = evaluate(&step.code)?;
        if !result.is_success() {
            return Err(BackendError::Bootstrap {
                step: step.name,
                message: result.value().to_string(),
            });
        }
    }
    Ok(())
}
