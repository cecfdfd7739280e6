//! Line sources for the reader
//!
//! The reader pulls input one line at a time. Interactive sessions use a
//! rustyline editor; piped input, files and tests use any `BufRead`.

use std::io::{self, BufRead};

use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, EditMode, Editor};

/// A source of input lines
pub trait LineSource {
    /// Read the next line, including a trailing `\n`
    ///
    /// `prompt` is shown by interactive sources before waiting for input.
    /// Returns `Ok(None)` at end of input.
    fn read_line(
        &mut self,
        prompt: &str,
    ) -> io::Result<Option<String>>;
}

/// Line source over any buffered reader; prompts are not shown
#[derive(Debug)]
pub struct BufReadSource<R> {
    inner: R,
}

impl<R: BufRead> BufReadSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: BufRead> LineSource for BufReadSource<R> {
    fn read_line(
        &mut self,
        _prompt: &str,
    ) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.inner.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.ends_with('\n') {
            line.push('\n');
        }
        Ok(Some(line))
    }
}

/// Interactive line source backed by rustyline
///
/// History is kept in memory for the session only.
pub struct EditorSource {
    editor: Editor<(), DefaultHistory>,
}

impl EditorSource {
    /// Create an editor with Emacs key bindings
    pub fn new() -> rustyline::Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .build();

        Ok(Self {
            editor: Editor::with_config(config)?,
        })
    }
}

impl LineSource for EditorSource {
    fn read_line(
        &mut self,
        prompt: &str,
    ) -> io::Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(mut line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                line.push('\n');
                Ok(Some(line))
            }
            Err(ReadlineError::Eof) => Ok(None),
            // Ctrl-C abandons the current line
            Err(ReadlineError::Interrupted) => Ok(Some("\n".to_string())),
            Err(ReadlineError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_bufread_source_appends_newline() {
        let mut source = BufReadSource::new(Cursor::new("a\nb"));
        assert_eq!(source.read_line("> ").unwrap(), Some("a\n".to_string()));
        assert_eq!(source.read_line("> ").unwrap(), Some("b\n".to_string()));
        assert_eq!(source.read_line("> ").unwrap(), None);
    }
}
