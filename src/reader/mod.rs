//! Form reader
//!
//! Reads forms from a [`LineSource`] one line at a time. Each call to
//! [`FormReader::read`] ends in one of three lexer outcomes:
//!
//! - [`ReadOutcome::LineStart`]: only whitespace or a comment was consumed
//!   up to the end of a line, so the caller should prompt again
//! - [`ReadOutcome::StreamEnd`]: input is exhausted
//! - [`ReadOutcome::Form`]: a form was read
//!
//! Commas are whitespace and `;` starts a comment running to end of line.

pub mod form;
pub mod line;

use std::io::{self, Cursor};

use thiserror::Error;

use crate::util::Position;

pub use form::{Form, FormKind, Symbol};
pub use line::{BufReadSource, EditorSource, LineSource};

/// Prompt shown while a form spans several lines
pub const CONTINUATION_PROMPT: &str = "#_=> ";

/// Reader errors
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("EOF while reading form starting at {0}")]
    UnexpectedEof(Position),

    #[error("Unmatched delimiter {delim} at {pos}")]
    Unmatched { delim: char, pos: Position },

    #[error("Map literal must contain an even number of forms at {0}")]
    OddMap(Position),

    #[error("Invalid token {token} at {pos}")]
    InvalidToken { token: String, pos: Position },

    #[error("Unsupported escape character \\{escape} at {pos}")]
    InvalidEscape { escape: char, pos: Position },

    #[error("No dispatch macro for #{dispatch} at {pos}")]
    UnsupportedDispatch { dispatch: char, pos: Position },

    #[error("I/O error while reading input: {0}")]
    Io(#[from] io::Error),
}

/// Result type for reader operations
pub type ReadResult<T> = Result<T, ReadError>;

/// Outcome of one top-level read
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    LineStart,
    StreamEnd,
    Form(Form),
}

enum Lex {
    LineStart,
    StreamEnd,
    Body,
}

fn is_whitespace(c: char) -> bool {
    c.is_whitespace() || c == ','
}

fn is_terminator(c: char) -> bool {
    is_whitespace(c) || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';')
}

/// Reader over a line source
pub struct FormReader<S> {
    source: S,
    line: Vec<char>,
    pos: usize,
    line_no: usize,
    eof: bool,
}

impl<S: LineSource> FormReader<S> {
    /// Create a reader
    pub fn new(source: S) -> Self {
        Self {
            source,
            line: Vec::new(),
            pos: 0,
            line_no: 0,
            eof: false,
        }
    }

    /// Read the next top-level form
    ///
    /// `prompt` is passed to the line source when a fresh line is needed
    /// before a form starts. On a read error the rest of the current line
    /// is discarded.
    pub fn read(
        &mut self,
        prompt: &str,
    ) -> ReadResult<ReadOutcome> {
        match self.skip_whitespace(prompt)? {
            Lex::LineStart => Ok(ReadOutcome::LineStart),
            Lex::StreamEnd => Ok(ReadOutcome::StreamEnd),
            Lex::Body => match self.read_form() {
                Ok(form) => {
                    self.skip_if_eol();
                    Ok(ReadOutcome::Form(form))
                }
                Err(e) => {
                    self.discard_line();
                    Err(e)
                }
            },
        }
    }

    fn fetch(
        &mut self,
        prompt: &str,
    ) -> ReadResult<bool> {
        if self.eof {
            return Ok(false);
        }
        match self.source.read_line(prompt)? {
            Some(text) => {
                self.line = text.chars().collect();
                self.pos = 0;
                self.line_no += 1;
                Ok(true)
            }
            None => {
                self.eof = true;
                Ok(false)
            }
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line_no, self.pos + 1)
    }

    fn peek(&mut self) -> ReadResult<Option<char>> {
        if self.pos >= self.line.len() && !self.fetch(CONTINUATION_PROMPT)? {
            return Ok(None);
        }
        Ok(self.line.get(self.pos).copied())
    }

    fn next(&mut self) -> ReadResult<Option<char>> {
        let c = self.peek()?;
        if c.is_some() {
            self.pos += 1;
        }
        Ok(c)
    }

    fn discard_line(&mut self) {
        self.pos = self.line.len();
    }

    fn skip_whitespace(
        &mut self,
        prompt: &str,
    ) -> ReadResult<Lex> {
        loop {
            if self.pos >= self.line.len() && !self.fetch(prompt)? {
                return Ok(Lex::StreamEnd);
            }
            match self.line[self.pos] {
                '\n' => {
                    self.pos += 1;
                    return Ok(Lex::LineStart);
                }
                ';' => {
                    self.discard_line();
                    return Ok(Lex::LineStart);
                }
                c if is_whitespace(c) => self.pos += 1,
                _ => return Ok(Lex::Body),
            }
        }
    }

    /// After a form, swallow the rest of the line if it is only whitespace
    fn skip_if_eol(&mut self) {
        let mut i = self.pos;
        while i < self.line.len() && self.line[i] != '\n' && is_whitespace(self.line[i]) {
            i += 1;
        }
        if i < self.line.len() && self.line[i] == '\n' {
            self.pos = i + 1;
        }
    }

    /// Skip whitespace, comments and `#_` discards inside a form
    fn skip_insignificant(&mut self) -> ReadResult<()> {
        loop {
            match self.peek()? {
                Some(c) if is_whitespace(c) => self.pos += 1,
                Some(';') => self.discard_line(),
                Some('#') if self.line.get(self.pos + 1) == Some(&'_') => {
                    self.pos += 2;
                    self.read_form()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_form(&mut self) -> ReadResult<Form> {
        self.skip_insignificant()?;
        let start = self.position();
        let c = self.next()?.ok_or(ReadError::UnexpectedEof(start))?;

        let kind = match c {
            '(' => FormKind::List(self.read_delimited(')', start)?),
            '[' => FormKind::Vector(self.read_delimited(']', start)?),
            '{' => {
                let items = self.read_delimited('}', start)?;
                if items.len() % 2 != 0 {
                    return Err(ReadError::OddMap(start));
                }
                let mut entries = Vec::with_capacity(items.len() / 2);
                let mut iter = items.into_iter();
                while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                    entries.push((k, v));
                }
                FormKind::Map(entries)
            }
            ')' | ']' | '}' => return Err(ReadError::Unmatched { delim: c, pos: start }),
            '"' => FormKind::Str(self.read_string(start)?),
            '\'' => return self.read_wrapped("quote", start),
            '@' => return self.read_wrapped("deref", start),
            '^' => {
                // metadata is read and dropped
                self.read_form()?;
                return self.read_form();
            }
            '\\' => FormKind::Char(self.read_char(start)?),
            '#' => match self.next()? {
                Some('{') => FormKind::Set(self.read_delimited('}', start)?),
                Some(d) => return Err(ReadError::UnsupportedDispatch { dispatch: d, pos: start }),
                None => return Err(ReadError::UnexpectedEof(start)),
            },
            c => {
                let mut token = String::from(c);
                self.read_token_into(&mut token);
                parse_token(token, start)?
            }
        };

        Ok(Form::new(kind, start))
    }

    fn read_wrapped(
        &mut self,
        head: &str,
        start: Position,
    ) -> ReadResult<Form> {
        let inner = self.read_form()?;
        Ok(Form::list(vec![Form::symbol(head, start), inner], start))
    }

    fn read_delimited(
        &mut self,
        close: char,
        start: Position,
    ) -> ReadResult<Vec<Form>> {
        let mut items = Vec::new();
        loop {
            self.skip_insignificant()?;
            match self.peek()? {
                None => return Err(ReadError::UnexpectedEof(start)),
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(_) => items.push(self.read_form()?),
            }
        }
    }

    fn read_token_into(
        &mut self,
        token: &mut String,
    ) {
        while let Some(&c) = self.line.get(self.pos) {
            if is_terminator(c) {
                break;
            }
            token.push(c);
            self.pos += 1;
        }
    }

    fn read_string(
        &mut self,
        start: Position,
    ) -> ReadResult<String> {
        let mut out = String::new();
        loop {
            let c = self.next()?.ok_or(ReadError::UnexpectedEof(start))?;
            match c {
                '"' => return Ok(out),
                '\\' => {
                    let pos = self.position();
                    let escape = self.next()?.ok_or(ReadError::UnexpectedEof(start))?;
                    match escape {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        '"' => out.push('"'),
                        '\\' => out.push('\\'),
                        'u' => {
                            let mut hex = String::new();
                            for _ in 0..4 {
                                hex.push(self.next()?.ok_or(ReadError::UnexpectedEof(start))?);
                            }
                            let decoded = u32::from_str_radix(&hex, 16)
                                .ok()
                                .and_then(char::from_u32)
                                .ok_or(ReadError::InvalidEscape { escape: 'u', pos })?;
                            out.push(decoded);
                        }
                        other => return Err(ReadError::InvalidEscape { escape: other, pos }),
                    }
                }
                c => out.push(c),
            }
        }
    }

    fn read_char(
        &mut self,
        start: Position,
    ) -> ReadResult<char> {
        let first = self.next()?.ok_or(ReadError::UnexpectedEof(start))?;
        let mut token = String::from(first);
        self.read_token_into(&mut token);

        if token.chars().count() == 1 {
            return Ok(first);
        }
        let named = match token.as_str() {
            "newline" => Some('\n'),
            "space" => Some(' '),
            "tab" => Some('\t'),
            "return" => Some('\r'),
            "backspace" => Some('\u{8}'),
            "formfeed" => Some('\u{c}'),
            t if t.len() == 5 && t.starts_with('u') => {
                u32::from_str_radix(&t[1..], 16).ok().and_then(char::from_u32)
            }
            _ => None,
        };
        named.ok_or(ReadError::InvalidToken {
            token: format!("\\{}", token),
            pos: start,
        })
    }
}

fn parse_token(
    token: String,
    pos: Position,
) -> ReadResult<FormKind> {
    match token.as_str() {
        "nil" => return Ok(FormKind::Nil),
        "true" => return Ok(FormKind::Bool(true)),
        "false" => return Ok(FormKind::Bool(false)),
        _ => {}
    }

    let mut chars = token.chars();
    let first = chars.next().unwrap_or(' ');
    let second = chars.next();
    let numeric = first.is_ascii_digit()
        || (matches!(first, '+' | '-') && second.is_some_and(|c| c.is_ascii_digit()));

    if numeric {
        if let Ok(n) = token.parse::<i64>() {
            return Ok(FormKind::Int(n));
        }
        if let Ok(x) = token.parse::<f64>() {
            return Ok(FormKind::Float(x));
        }
        return Err(ReadError::InvalidToken { token, pos });
    }

    if let Some(rest) = token.strip_prefix(':') {
        if rest.is_empty() || rest.starts_with(':') || rest.ends_with('/') {
            return Err(ReadError::InvalidToken { token, pos });
        }
        return Ok(FormKind::Keyword(Symbol::parse(rest)));
    }

    Ok(FormKind::Symbol(Symbol::parse(&token)))
}

/// Read every form of a source text
pub fn read_all(text: &str) -> ReadResult<Vec<Form>> {
    let mut reader = FormReader::new(BufReadSource::new(Cursor::new(text)));
    let mut forms = Vec::new();
    loop {
        match reader.read("")? {
            ReadOutcome::Form(form) => forms.push(form),
            ReadOutcome::LineStart => {}
            ReadOutcome::StreamEnd => return Ok(forms),
        }
    }
}
