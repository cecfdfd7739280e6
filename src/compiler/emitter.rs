//! JavaScript generation
//!
//! Every expression is emitted as a JavaScript expression; constructs that
//! need statements (`let`, `try`, `throw`) are wrapped in an immediately
//! invoked function. When source maps are requested, each node records the
//! generated position it starts at.

use super::{munge, munge_ns, Ast, EmitOptions, Emitted, Node, NsDecl, CORE_NS};
use crate::reader::{Form, FormKind, Symbol};
use crate::source_map::Mapping;
use crate::util::Position;

/// Emit one top-level form
pub fn emit_top(
    ast: &Ast,
    options: &EmitOptions,
) -> Emitted {
    let mut writer = JsWriter::new(options.source_map);
    match &ast.node {
        Node::Ns(decl) => writer.emit_ns(decl, ast.pos),
        _ => {
            writer.emit(ast);
            writer.write(";");
        }
    }
    writer.finish()
}

/// Munged JavaScript path of a var
pub fn var_path(
    ns: &str,
    name: &str,
) -> String {
    format!("{}.{}", munge_ns(ns), munge(name))
}

struct JsWriter {
    out: String,
    line: u32,
    column: u32,
    source_map: bool,
    mappings: Vec<Mapping>,
}

impl JsWriter {
    fn new(source_map: bool) -> Self {
        Self {
            out: String::new(),
            line: 0,
            column: 0,
            source_map,
            mappings: Vec::new(),
        }
    }

    fn finish(self) -> Emitted {
        Emitted {
            lines: self.line + 1,
            js: self.out,
            mappings: self.mappings,
        }
    }

    fn write(
        &mut self,
        s: &str,
    ) {
        for c in s.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += c.len_utf16() as u32;
            }
        }
        self.out.push_str(s);
    }

    fn mark(
        &mut self,
        pos: Position,
        name: Option<&str>,
    ) {
        if !self.source_map {
            return;
        }
        let (src_line, src_column) = pos.to_zero_based();
        self.mappings.push(Mapping {
            gen_line: self.line,
            gen_column: self.column,
            src_line,
            src_column,
            name: name.map(str::to_string),
        });
    }

    fn emit_ns(
        &mut self,
        decl: &NsDecl,
        pos: Position,
    ) {
        self.mark(pos, None);
        self.write(&format!("goog.provide('{}');", munge_ns(&decl.name)));
        if decl.name != CORE_NS {
            self.write(&format!("\ngoog.require('{}');", CORE_NS));
        }
        for dep in decl.runtime_deps() {
            if dep != CORE_NS {
                self.write(&format!("\ngoog.require('{}');", munge_ns(&dep)));
            }
        }
    }

    fn emit_comma_list(
        &mut self,
        items: &[Ast],
    ) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.emit(item);
        }
    }

    /// `return` the last of `body`, evaluating the rest as statements
    fn emit_body(
        &mut self,
        body: &[Ast],
    ) {
        match body.split_last() {
            Some((last, init)) => {
                for stmt in init {
                    self.emit(stmt);
                    self.write(";\n");
                }
                self.write("return ");
                self.emit(last);
                self.write(";");
            }
            None => self.write("return null;"),
        }
    }

    fn emit(
        &mut self,
        ast: &Ast,
    ) {
        let name = match &ast.node {
            Node::Var { name, .. } => Some(name.as_str()),
            Node::Local(name) | Node::JsGlobal(name) => Some(name.as_str()),
            _ => None,
        };
        self.mark(ast.pos, name);

        match &ast.node {
            Node::Const(kind) => self.emit_const(kind),
            Node::Quote(form) => self.emit_quoted(form),
            Node::Var { ns, name } => self.write(&var_path(ns, name)),
            Node::Local(name) | Node::JsGlobal(name) => self.write(name),
            Node::Vector(items) => {
                self.write("cljs.core.PersistentVector.fromArray([");
                self.emit_comma_list(items);
                self.write("], true)");
            }
            Node::Set(items) => {
                self.write("cljs.core.PersistentHashSet.fromArray([");
                self.emit_comma_list(items);
                self.write("], true)");
            }
            Node::Map(entries) => {
                self.write("cljs.core.PersistentArrayMap.fromArray([");
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.emit(k);
                    self.write(", ");
                    self.emit(v);
                }
                self.write("], true, false)");
            }
            Node::Ns(decl) => {
                // Only reachable when a caller emits a nested ns node directly.
                self.write("(function (){\n");
                self.emit_ns(decl, ast.pos);
                self.write("\nreturn null;\n})()");
            }
            Node::Def { ns, name, init } => {
                self.write("(");
                self.write(&var_path(ns, name));
                self.write(" = ");
                match init {
                    Some(init) => self.emit(init),
                    None => self.write("null"),
                }
                self.write(")");
            }
            Node::Do(body) => match body.as_slice() {
                [] => self.write("null"),
                [only] => self.emit(only),
                _ => {
                    self.write("(");
                    self.emit_comma_list(body);
                    self.write(")");
                }
            },
            Node::If {
                test,
                then,
                otherwise,
            } => {
                self.write("(cljs.core.truth_(");
                self.emit(test);
                self.write(") ? ");
                self.emit(then);
                self.write(" : ");
                match otherwise {
                    Some(otherwise) => self.emit(otherwise),
                    None => self.write("null"),
                }
                self.write(")");
            }
            Node::Let { bindings, body } => {
                self.write("(function (){\n");
                for (name, init) in bindings {
                    self.write(&format!("var {} = ", name));
                    self.emit(init);
                    self.write(";\n");
                }
                self.emit_body(body);
                self.write("\n})()");
            }
            Node::Fn {
                name,
                params,
                rest,
                body,
            } => {
                self.write("(function ");
                if let Some(name) = name {
                    self.write(name);
                }
                self.write(&format!("({}){{\n", params.join(", ")));
                if let Some(rest) = rest {
                    self.write(&format!(
                        "var {} = cljs.core.array_seq(Array.prototype.slice.call(arguments, {}));\n",
                        rest,
                        params.len()
                    ));
                }
                self.emit_body(body);
                self.write("\n})");
            }
            Node::SetBang { target, value } => {
                self.write("(");
                self.emit(target);
                self.write(" = ");
                self.emit(value);
                self.write(")");
            }
            Node::Throw(value) => {
                self.write("(function (){throw ");
                self.emit(value);
                self.write("})()");
            }
            Node::Try {
                body,
                catch,
                finally,
            } => {
                self.write("(function (){try{\n");
                self.emit_body(body);
                self.write("\n}");
                if let Some((name, handler)) = catch {
                    self.write(&format!("catch ({}){{\n", name));
                    self.emit_body(handler);
                    self.write("\n}");
                }
                if !finally.is_empty() || catch.is_none() {
                    self.write("finally {\n");
                    for stmt in finally {
                        self.emit(stmt);
                        self.write(";\n");
                    }
                    self.write("}");
                }
                self.write("})()");
            }
            Node::New { ctor, args } => {
                self.write("(new ");
                self.emit(ctor);
                self.write("(");
                self.emit_comma_list(args);
                self.write("))");
            }
            Node::Method {
                target,
                method,
                args,
            } => {
                self.emit(target);
                self.write(&format!(".{}(", method));
                self.emit_comma_list(args);
                self.write(")");
            }
            Node::Field { target, field } => {
                self.emit(target);
                self.write(&format!(".{}", field));
            }
            Node::Invoke { f, args } => {
                self.emit(f);
                self.write(".call(null");
                for arg in args {
                    self.write(", ");
                    self.emit(arg);
                }
                self.write(")");
            }
        }
    }

    fn emit_const(
        &mut self,
        kind: &FormKind,
    ) {
        let text = match kind {
            FormKind::Nil => "null".to_string(),
            FormKind::Bool(b) => b.to_string(),
            FormKind::Int(n) => n.to_string(),
            FormKind::Float(x) if x.is_nan() => "NaN".to_string(),
            FormKind::Float(x) if x.is_infinite() => {
                String::from(if *x > 0.0 { "Infinity" } else { "(-Infinity)" })
            }
            FormKind::Float(x) => x.to_string(),
            FormKind::Str(s) => js_string(s),
            FormKind::Char(c) => js_string(&c.to_string()),
            FormKind::Keyword(kw) => name_call("cljs.core.keyword", kw),
            other => {
                let form = Form::new(other.clone(), Position::default());
                return self.emit_quoted(&form);
            }
        };
        self.write(&text);
    }

    fn emit_quoted(
        &mut self,
        form: &Form,
    ) {
        let items = |w: &mut Self, items: &[Form]| {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    w.write(", ");
                }
                w.emit_quoted(item);
            }
        };
        match &form.kind {
            FormKind::Symbol(sym) => self.write(&name_call("cljs.core.symbol", sym)),
            FormKind::List(list) if list.is_empty() => self.write("cljs.core.List.EMPTY"),
            FormKind::List(list) => {
                self.write("cljs.core.list(");
                items(self, list);
                self.write(")");
            }
            FormKind::Vector(vec) => {
                self.write("cljs.core.PersistentVector.fromArray([");
                items(self, vec);
                self.write("], true)");
            }
            FormKind::Set(set) => {
                self.write("cljs.core.PersistentHashSet.fromArray([");
                items(self, set);
                self.write("], true)");
            }
            FormKind::Map(entries) => {
                self.write("cljs.core.PersistentArrayMap.fromArray([");
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.emit_quoted(k);
                    self.write(", ");
                    self.emit_quoted(v);
                }
                self.write("], true, false)");
            }
            scalar => self.emit_const(scalar),
        }
    }
}

/// A JavaScript string literal
fn js_string(s: &str) -> String {
    serde_json::to_string(s)
        .unwrap_or_default()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

fn name_call(
    ctor: &str,
    sym: &Symbol,
) -> String {
    match &sym.ns {
        Some(ns) => format!("{}({}, {})", ctor, js_string(ns), js_string(&sym.name)),
        None => format!("{}({})", ctor, js_string(&sym.name)),
    }
}
