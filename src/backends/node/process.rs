//! Child process and connection handling
//!
//! The interpreter reads the bootstrap server script on stdin and shares
//! the REPL's stdout/stderr. Readiness is observed by dialing the port
//! until it answers, giving up early if the child exits.

use std::fs::File;
use std::io;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::backends::{describe_addr, BackendError, BackendResult};

/// How long to keep dialing a starting runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 40,
            interval: Duration::from_millis(250),
        }
    }
}

/// Find the interpreter on `PATH` (or accept an explicit path)
pub fn resolve_interpreter(command: &str) -> BackendResult<PathBuf> {
    which::which(command).map_err(|source| BackendError::InterpreterNotFound {
        command: command.to_string(),
        source,
    })
}

/// Start `interpreter` with `script` as its standard input
pub fn spawn(
    interpreter: &Path,
    script: &Path,
) -> BackendResult<Child> {
    let command = interpreter.display().to_string();
    let stdin = File::open(script).map_err(|source| BackendError::Spawn {
        command: command.clone(),
        source,
    })?;

    let child = Command::new(interpreter)
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| BackendError::Spawn {
            command: command.clone(),
            source,
        })?;

    info!("Started {} (pid {})", command, child.id());
    Ok(child)
}

/// Dial `host:port` until it accepts or the policy runs out
///
/// When `child` is given, its early exit aborts the wait.
pub fn connect_with_retry(
    host: &str,
    port: u16,
    policy: RetryPolicy,
    mut child: Option<&mut Child>,
) -> BackendResult<TcpStream> {
    let addr = describe_addr(host, port);
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match TcpStream::connect((host, port)) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                info!("Connected to {} after {} attempt(s)", addr, attempt);
                return Ok(stream);
            }
            Err(e) => {
                debug!("Connect attempt {} to {} failed: {}", attempt, addr, e);
                last_error = Some(e);
            }
        }

        if let Some(child) = child.as_mut() {
            if let Some(status) = child.try_wait()? {
                return Err(BackendError::ProcessExited {
                    status: status.to_string(),
                });
            }
        }
        if attempt < attempts {
            thread::sleep(policy.interval);
        }
    }

    Err(BackendError::Connect {
        addr,
        attempts,
        source: last_error.unwrap_or_else(|| io::Error::other("no connection attempt made")),
    })
}

/// Kill and reap the child
pub fn terminate(child: &mut Child) -> io::Result<()> {
    if child.try_wait()?.is_none() {
        child.kill()?;
    }
    let status = child.wait()?;
    debug!("JavaScript process ended: {}", status);
    Ok(())
}
