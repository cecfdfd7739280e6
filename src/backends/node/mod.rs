//! Node.js process/socket backend
//!
//! Spawns a Node.js interpreter running a small socket server, connects to
//! it and evaluates fragments over the framing protocol in [`protocol`].
//!
//! # State machine
//!
//! ```text
//! Unstarted --setup--> Starting --connected--> Ready --tear_down--> TornDown
//!                          |                     |
//!                          +------> Failed <-----+ (bootstrap failure)
//! ```
//!
//! Traces are not parsed here: an exception's stack text arrives inside its
//! value, so failures always print the raw trace.

pub mod bootstrap;
pub mod process;
pub mod protocol;

use std::collections::HashSet;
use std::io::{self, ErrorKind, Write};
use std::mem;
use std::net::{Shutdown, TcpStream};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backends::{absolute, BackendError, BackendResult, EvalBackend, EvalResult};
use crate::build::BuildGraph;
use crate::repl::ReplOptions;
use crate::util::config::NodeConfig;

pub use process::RetryPolicy;
pub use protocol::{write_frame, FrameReader};

/// Node backend settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOptions {
    pub host: String,
    pub port: u16,
    /// Interpreter command, resolved on `PATH`
    pub command: String,
    /// Where compiled units and generated scripts go
    pub output_dir: PathBuf,
    pub retry: RetryPolicy,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5001,
            command: "node".to_string(),
            output_dir: PathBuf::from(".cljs_node_repl"),
            retry: RetryPolicy::default(),
        }
    }
}

impl NodeOptions {
    /// Defaults overridden by the `[node]` table of the user config
    pub fn from_config(config: &NodeConfig) -> Self {
        let defaults = Self::default();
        Self {
            host: config.host.clone().unwrap_or(defaults.host),
            port: config.port.unwrap_or(defaults.port),
            command: config.command.clone().unwrap_or(defaults.command),
            output_dir: defaults.output_dir,
            retry: RetryPolicy {
                attempts: config.connect_attempts.unwrap_or(defaults.retry.attempts),
                interval: config
                    .connect_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.interval),
            },
        }
    }
}

/// Open connection to a running runtime
struct Connection {
    child: Option<Child>,
    reader: FrameReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn new(
        child: Option<Child>,
        stream: TcpStream,
    ) -> io::Result<Self> {
        Ok(Self {
            child,
            writer: stream.try_clone()?,
            reader: FrameReader::new(stream),
        })
    }

    /// Stop the child, then close the socket, attempting both regardless
    fn close(mut self) -> BackendResult<()> {
        let mut first_error = None;
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = process::terminate(child) {
                warn!("Failed to stop JavaScript process: {}", e);
                first_error = Some(e);
            }
        }
        if let Err(e) = self.writer.shutdown(Shutdown::Both) {
            if e.kind() != ErrorKind::NotConnected {
                warn!("Failed to close connection: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

enum State {
    Unstarted,
    Starting,
    Ready(Connection),
    TornDown,
    Failed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Unstarted => "unstarted",
            State::Starting => "starting",
            State::Ready(_) => "ready",
            State::TornDown => "torn down",
            State::Failed => "failed",
        }
    }
}

fn stdout_sink(text: &str) {
    let mut out = io::stdout().lock();
    if out.write_all(text.as_bytes()).and_then(|_| out.flush()).is_err() {
        debug!("Dropped {} bytes of runtime output", text.len());
    }
}

/// Backend evaluating in a Node.js child process
pub struct NodeBackend<G> {
    options: NodeOptions,
    graph: G,
    state: State,
    /// Primary namespaces delivered through `load`
    delivered: HashSet<String>,
    flush: Box<dyn FnMut(&str)>,
}

impl<G: BuildGraph> NodeBackend<G> {
    pub fn new(
        options: NodeOptions,
        graph: G,
    ) -> Self {
        Self {
            options,
            graph,
            state: State::Unstarted,
            delivered: HashSet::new(),
            flush: Box::new(stdout_sink),
        }
    }

    /// Use an already running runtime, skipping process start and bootstrap
    pub fn attach(
        options: NodeOptions,
        graph: G,
        stream: TcpStream,
    ) -> BackendResult<Self> {
        let mut backend = Self::new(options, graph);
        backend.state = State::Ready(Connection::new(None, stream)?);
        Ok(backend)
    }

    /// Send side-channel output somewhere other than stdout
    pub fn with_flush_sink(
        mut self,
        sink: impl FnMut(&str) + 'static,
    ) -> Self {
        self.flush = Box::new(sink);
        self
    }

    /// Name of the current lifecycle state
    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    fn start(
        &mut self,
        output_dir: &Path,
    ) -> BackendResult<()> {
        let interpreter = process::resolve_interpreter(&self.options.command)?;
        let script = bootstrap::write_server_script(output_dir, self.options.port)?;
        let mut child = process::spawn(&interpreter, &script)?;

        let stream = match process::connect_with_retry(
            &self.options.host,
            self.options.port,
            self.options.retry,
            Some(&mut child),
        ) {
            Ok(stream) => stream,
            Err(e) => {
                if let Err(kill) = process::terminate(&mut child) {
                    warn!("Failed to stop JavaScript process: {}", kill);
                }
                return Err(e);
            }
        };
        self.state = State::Ready(Connection::new(Some(child), stream)?);

        self.graph.compile_runtime(output_dir)?;
        let manifest = self.graph.write_manifest(output_dir)?;
        let steps = bootstrap::steps(output_dir, &manifest);
        bootstrap::run(&steps, |code| self.round_trip(code))?;

        info!("Node.js runtime ready on port {}", self.options.port);
        Ok(())
    }

    /// Move to `Failed`, releasing whatever was acquired
    fn fail(&mut self) {
        if let State::Ready(conn) = mem::replace(&mut self.state, State::Failed) {
            if let Err(e) = conn.close() {
                debug!("Cleanup after failed start: {}", e);
            }
        }
    }

    fn round_trip(
        &mut self,
        code: &str,
    ) -> BackendResult<EvalResult> {
        let actual = self.state.name();
        let State::Ready(conn) = &mut self.state else {
            return Err(BackendError::InvalidState {
                expected: "ready",
                actual,
            });
        };
        write_frame(&mut conn.writer, code)?;
        let payload = conn.reader.read_frame(&mut *self.flush)?;
        protocol::decode_response(&payload)
    }
}

impl<G: BuildGraph> EvalBackend for NodeBackend<G> {
    fn setup(
        &mut self,
        options: &ReplOptions,
    ) -> BackendResult<()> {
        if !matches!(self.state, State::Unstarted) {
            return Err(BackendError::InvalidState {
                expected: "unstarted",
                actual: self.state.name(),
            });
        }
        self.state = State::Starting;

        let output_dir = absolute(
            options
                .output_dir()
                .unwrap_or(self.options.output_dir.as_path()),
        );
        let result = self.start(&output_dir);
        if result.is_err() {
            self.fail();
        }
        result
    }

    fn evaluate(
        &mut self,
        filename: &str,
        line: u32,
        code: &str,
    ) -> BackendResult<EvalResult> {
        debug!("Evaluating {}:{}", filename, line);
        self.round_trip(code)
    }

    fn load(
        &mut self,
        provides: &[String],
        url: &Path,
    ) -> BackendResult<()> {
        let Some(primary) = provides.first() else {
            return Ok(());
        };
        if self.delivered.contains(primary) {
            debug!("Skipping {}, already loaded", primary);
            return Ok(());
        }

        debug!("Loading {} from {}", primary, url.display());
        let result = self.round_trip(&format!("goog.require('{}');", primary))?;
        if !result.is_success() {
            return Err(BackendError::LoadFailed {
                module: primary.clone(),
                message: result.value().to_string(),
            });
        }
        self.delivered.extend(provides.iter().cloned());
        Ok(())
    }

    fn tear_down(&mut self) -> BackendResult<()> {
        match mem::replace(&mut self.state, State::TornDown) {
            State::Ready(conn) => {
                info!("Shutting down Node.js runtime");
                conn.close()
            }
            State::TornDown => Err(BackendError::InvalidState {
                expected: "set up",
                actual: "torn down",
            }),
            State::Unstarted | State::Starting | State::Failed => Ok(()),
        }
    }

    fn repl_options(&self) -> Option<ReplOptions> {
        Some(ReplOptions {
            output_dir: Some(self.options.output_dir.clone()),
            source_map: Some(false),
            ..ReplOptions::default()
        })
    }
}
