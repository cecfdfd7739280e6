//! Name munging between source symbols and JavaScript identifiers

/// Characters that cannot appear in a JavaScript identifier and their
/// replacements. `-` is handled separately.
const CHAR_MAP: &[(char, &str)] = &[
    (':', "_COLON_"),
    ('+', "_PLUS_"),
    ('>', "_GT_"),
    ('<', "_LT_"),
    ('=', "_EQ_"),
    ('~', "_TILDE_"),
    ('!', "_BANG_"),
    ('@', "_CIRCA_"),
    ('#', "_SHARP_"),
    ('\'', "_SINGLEQUOTE_"),
    ('"', "_DOUBLEQUOTE_"),
    ('%', "_PERCENT_"),
    ('^', "_CARET_"),
    ('&', "_AMPERSAND_"),
    ('*', "_STAR_"),
    ('|', "_BAR_"),
    ('{', "_LBRACE_"),
    ('}', "_RBRACE_"),
    ('[', "_LBRACK_"),
    (']', "_RBRACK_"),
    ('/', "_SLASH_"),
    ('\\', "_BSLASH_"),
    ('?', "_QMARK_"),
];

const JS_RESERVED: &[&str] = &[
    "arguments", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally", "for",
    "function", "if", "implements", "import", "in", "instanceof", "interface", "let", "new",
    "null", "package", "private", "protected", "public", "return", "static", "super", "switch",
    "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Munge a single name segment (`foo-bar?` -> `foo_bar_QMARK_`)
pub fn munge(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '-' {
            out.push('_');
        } else if let Some((_, rep)) = CHAR_MAP.iter().find(|(k, _)| *k == c) {
            out.push_str(rep);
        } else {
            out.push(c);
        }
    }
    if JS_RESERVED.contains(&out.as_str()) {
        out.push('$');
    }
    out
}

/// Munge a dotted namespace name segment by segment
pub fn munge_ns(ns: &str) -> String {
    ns.split('.').map(munge).collect::<Vec<_>>().join(".")
}

/// Reverse [`munge`]
pub fn demunge(name: &str) -> String {
    let name = match name.strip_suffix('$') {
        Some(stripped) if JS_RESERVED.contains(&stripped) => stripped,
        _ => name,
    };

    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(c) = rest.chars().next() {
        if c == '_' {
            if let Some((ch, rep)) = CHAR_MAP.iter().find(|(_, rep)| rest.starts_with(rep)) {
                out.push(*ch);
                rest = &rest[rep.len()..];
                continue;
            }
            out.push('-');
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_munge() {
        assert_eq!(munge("foo-bar"), "foo_bar");
        assert_eq!(munge("empty?"), "empty_QMARK_");
        assert_eq!(munge("swap!"), "swap_BANG_");
        assert_eq!(munge("+"), "_PLUS_");
        assert_eq!(munge("*1"), "_STAR_1");
        assert_eq!(munge("->x"), "__GT_x");
        assert_eq!(munge("default"), "default$");
    }

    #[test]
    fn test_munge_ns() {
        assert_eq!(munge_ns("my-app.core"), "my_app.core");
    }

    #[test]
    fn test_demunge() {
        assert_eq!(demunge("foo_bar"), "foo-bar");
        assert_eq!(demunge("empty_QMARK_"), "empty?");
        assert_eq!(demunge("_STAR_loaded_libs_STAR_"), "*loaded-libs*");
        assert_eq!(demunge("__GT_x"), "->x");
        assert_eq!(demunge("default$"), "default");
    }

    #[test]
    fn test_demunge_inverts_munge() {
        for name in ["map-indexed", "not=", "<=", "reset!", "pr-str", "*e", "swap-vals!"] {
            assert_eq!(demunge(&munge(name)), name);
        }
    }
}
