//! cljsrepl - CLI

use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use cljsrepl::backends::node::NodeOptions;
use cljsrepl::reader::{BufReadSource, EditorSource};
use cljsrepl::repl::{ReplOptions, SessionExit};
use cljsrepl::util::config::load_user_config;
use cljsrepl::util::logger::{self, LogLevel};
use cljsrepl::{run_node_repl, NAME, VERSION};

/// Interactive REPL evaluating in a Node.js process
#[derive(Parser, Debug)]
#[command(name = NAME)]
#[command(version = VERSION)]
#[command(about, long_about = None)]
struct Args {
    /// Host the runtime listens on
    #[arg(long)]
    host: Option<String>,

    /// Port the runtime listens on
    #[arg(long)]
    port: Option<u16>,

    /// JavaScript interpreter command
    #[arg(long, value_name = "COMMAND")]
    node: Option<String>,

    /// Directory for compiled output and generated scripts
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Directory of precompiled units (defaults to the output directory)
    #[arg(long, value_name = "DIR")]
    lib_dir: Option<PathBuf>,

    /// Attach inline source maps to evaluated code
    #[arg(long)]
    source_map: bool,

    /// Print generated JavaScript and debug logs
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored error output
    #[arg(long)]
    no_color: bool,
}

impl Args {
    fn repl_options(&self) -> ReplOptions {
        ReplOptions {
            output_dir: self.output_dir.clone(),
            source_map: self.source_map.then_some(true),
            verbose: self.verbose.then_some(true),
            colors: self.no_color.then_some(false),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_user_config().context("Failed to load user config")?;

    let options = args
        .repl_options()
        .merge_under(ReplOptions::from_config(&config.repl));
    logger::init_with_level(LogLevel::for_verbosity(options.verbose()));

    let mut node = NodeOptions::from_config(&config.node);
    if let Some(host) = args.host.clone() {
        node.host = host;
    }
    if let Some(port) = args.port {
        node.port = port;
    }
    if let Some(command) = args.node.clone() {
        node.command = command;
    }
    if let Some(dir) = options.output_dir() {
        node.output_dir = dir.to_path_buf();
    }

    let lib_dir = args
        .lib_dir
        .clone()
        .or_else(|| config.node.lib_dir.clone())
        .unwrap_or_else(|| node.output_dir.clone());

    let mut stdout = io::stdout();
    let exit = if io::stdin().is_terminal() {
        let editor = EditorSource::new().context("Failed to start line editor")?;
        run_node_repl(node, options, &lib_dir, editor, &mut stdout)?
    } else {
        let input = BufReadSource::new(io::stdin().lock());
        run_node_repl(node, options, &lib_dir, input, &mut stdout)?
    };

    if exit == SessionExit::EndOfInput {
        println!();
    }
    Ok(())
}
