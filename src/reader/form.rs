//! Form data model
//!
//! The values produced by the reader. Every form remembers the position of
//! its first character so the compiler can record source-map entries.

use std::fmt;

use crate::util::Position;

/// A possibly namespace-qualified name, used by symbols and keywords
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    /// Namespace part (`foo.bar` in `foo.bar/baz`)
    pub ns: Option<String>,
    /// Name part
    pub name: String,
}

impl Symbol {
    /// Create an unqualified symbol
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            ns: None,
            name: name.into(),
        }
    }

    /// Create a namespace-qualified symbol
    pub fn qualified(
        ns: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            ns: Some(ns.into()),
            name: name.into(),
        }
    }

    /// Split a token at its first `/` (a lone `/` is a plain name)
    pub fn parse(token: &str) -> Self {
        match token.find('/') {
            Some(idx) if idx > 0 && idx + 1 < token.len() => {
                Self::qualified(&token[..idx], &token[idx + 1..])
            }
            _ => Self::new(token),
        }
    }

    /// Check for an unqualified symbol with the given name
    pub fn is(
        &self,
        name: &str,
    ) -> bool {
        self.ns.is_none() && self.name == name
    }
}

impl fmt::Display for Symbol {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match &self.ns {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Form variants
#[derive(Debug, Clone, PartialEq)]
pub enum FormKind {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Char(char),
    Keyword(Symbol),
    Symbol(Symbol),
    List(Vec<Form>),
    Vector(Vec<Form>),
    Map(Vec<(Form, Form)>),
    Set(Vec<Form>),
}

/// A form read from source text
#[derive(Debug, Clone)]
pub struct Form {
    /// What was read
    pub kind: FormKind,
    /// Where its first character was
    pub pos: Position,
}

/// Positions never take part in equality.
impl PartialEq for Form {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.kind == other.kind
    }
}

impl Form {
    /// Create a new form
    pub fn new(
        kind: FormKind,
        pos: Position,
    ) -> Self {
        Self { kind, pos }
    }

    /// Unqualified symbol form
    pub fn symbol(
        name: &str,
        pos: Position,
    ) -> Self {
        Self::new(FormKind::Symbol(Symbol::parse(name)), pos)
    }

    /// List form
    pub fn list(
        items: Vec<Form>,
        pos: Position,
    ) -> Self {
        Self::new(FormKind::List(items), pos)
    }

    /// Vector form
    pub fn vector(
        items: Vec<Form>,
        pos: Position,
    ) -> Self {
        Self::new(FormKind::Vector(items), pos)
    }

    /// Keyword form
    pub fn keyword(
        sym: Symbol,
        pos: Position,
    ) -> Self {
        Self::new(FormKind::Keyword(sym), pos)
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match &self.kind {
            FormKind::Symbol(sym) => Some(sym),
            _ => None,
        }
    }

    pub fn as_keyword(&self) -> Option<&Symbol> {
        match &self.kind {
            FormKind::Keyword(kw) => Some(kw),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Form]> {
        match &self.kind {
            FormKind::List(items) => Some(items),
            _ => None,
        }
    }

    /// Items of a list or vector
    pub fn as_seq(&self) -> Option<&[Form]> {
        match &self.kind {
            FormKind::List(items) | FormKind::Vector(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            FormKind::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The head symbol of a non-empty list
    pub fn head_symbol(&self) -> Option<&Symbol> {
        self.as_list()?.first()?.as_symbol()
    }

    /// Check for the keyword `:ns/name` (or `:name` when `ns` is `None`)
    pub fn is_keyword(
        &self,
        ns: Option<&str>,
        name: &str,
    ) -> bool {
        matches!(&self.kind, FormKind::Keyword(kw) if kw.ns.as_deref() == ns && kw.name == name)
    }

    /// Strip one level of `(quote x)`
    pub fn unquote(&self) -> &Form {
        match self.as_list() {
            Some([head, quoted]) if head.as_symbol().is_some_and(|s| s.is("quote")) => quoted,
            _ => self,
        }
    }
}

fn write_seq(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    items: &[Form],
    close: &str,
) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_str(close)
}

fn write_char(
    f: &mut fmt::Formatter<'_>,
    c: char,
) -> fmt::Result {
    match c {
        '\n' => f.write_str("\\newline"),
        ' ' => f.write_str("\\space"),
        '\t' => f.write_str("\\tab"),
        '\r' => f.write_str("\\return"),
        c => write!(f, "\\{}", c),
    }
}

fn write_float(
    f: &mut fmt::Formatter<'_>,
    x: f64,
) -> fmt::Result {
    if x.is_nan() {
        f.write_str("##NaN")
    } else if x.is_infinite() {
        f.write_str(if x > 0.0 { "##Inf" } else { "##-Inf" })
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        write!(f, "{:.1}", x)
    } else {
        write!(f, "{}", x)
    }
}

/// Escape a string the way the printer reads it back
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl fmt::Display for Form {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match &self.kind {
            FormKind::Nil => f.write_str("nil"),
            FormKind::Bool(b) => write!(f, "{}", b),
            FormKind::Int(n) => write!(f, "{}", n),
            FormKind::Float(x) => write_float(f, *x),
            FormKind::Str(s) => f.write_str(&escape_string(s)),
            FormKind::Char(c) => write_char(f, *c),
            FormKind::Keyword(kw) => write!(f, ":{}", kw),
            FormKind::Symbol(sym) => write!(f, "{}", sym),
            FormKind::List(items) => write_seq(f, "(", items, ")"),
            FormKind::Vector(items) => write_seq(f, "[", items, "]"),
            FormKind::Set(items) => write_seq(f, "#{", items, "}"),
            FormKind::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> Position {
        Position::start()
    }

    #[test]
    fn test_symbol_parse() {
        assert_eq!(Symbol::parse("foo"), Symbol::new("foo"));
        assert_eq!(Symbol::parse("a.b/c"), Symbol::qualified("a.b", "c"));
        assert_eq!(Symbol::parse("/"), Symbol::new("/"));
        assert_eq!(Symbol::parse("cljs.core//"), Symbol::qualified("cljs.core", "/"));
    }

    #[test]
    fn test_equality_ignores_position() {
        let a = Form::symbol("x", Position::new(1, 1));
        let b = Form::symbol("x", Position::new(9, 9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_unquote() {
        let quoted = Form::list(vec![Form::symbol("quote", at()), Form::symbol("foo.bar", at())], at());
        assert_eq!(quoted.unquote(), &Form::symbol("foo.bar", at()));

        let plain = Form::symbol("foo", at());
        assert_eq!(plain.unquote(), &plain);
    }

    #[test]
    fn test_display() {
        let form = Form::list(
            vec![
                Form::symbol("str", at()),
                Form::new(FormKind::Str("a\"b\n".into()), at()),
                Form::new(FormKind::Float(2.0), at()),
                Form::new(FormKind::Char(' '), at()),
                Form::keyword(Symbol::qualified("cljs", "quit"), at()),
                Form::vector(vec![Form::new(FormKind::Nil, at())], at()),
            ],
            at(),
        );
        assert_eq!(form.to_string(), r#"(str "a\"b\n" 2.0 \space :cljs/quit [nil])"#);
    }

    #[test]
    fn test_map_display() {
        let map = Form::new(
            FormKind::Map(vec![(
                Form::keyword(Symbol::new("a"), at()),
                Form::new(FormKind::Int(1), at()),
            ), (
                Form::keyword(Symbol::new("b"), at()),
                Form::new(FormKind::Int(2), at()),
            )]),
            at(),
        );
        assert_eq!(map.to_string(), "{:a 1, :b 2}");
    }

    #[test]
    fn test_is_keyword() {
        let quit = Form::keyword(Symbol::qualified("cljs", "quit"), at());
        assert!(quit.is_keyword(Some("cljs"), "quit"));
        assert!(!quit.is_keyword(None, "quit"));
    }
}
