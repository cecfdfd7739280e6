//! Output helpers for failures

use std::error::Error;
use std::io::{self, Write};

use owo_colors::OwoColorize;

use super::{ReplError, TRACE_DEPTH};

/// Print an error line, red when colors are on
pub fn print_error(
    out: &mut dyn Write,
    message: &str,
    colors: bool,
) -> io::Result<()> {
    if colors {
        writeln!(out, "{}", message.red())
    } else {
        writeln!(out, "{}", message)
    }
}

/// Print a failed special form with at most [`TRACE_DEPTH`] causes
pub fn print_special_failure(
    out: &mut dyn Write,
    error: &ReplError,
    colors: bool,
) -> io::Result<()> {
    print_error(out, &error.to_string(), colors)?;
    let mut cause = error.source();
    let mut depth = 0;
    while let Some(e) = cause {
        if depth == TRACE_DEPTH {
            writeln!(out, "\t...")?;
            break;
        }
        writeln!(out, "\tcaused by: {}", e)?;
        cause = e.source();
        depth += 1;
    }
    Ok(())
}
