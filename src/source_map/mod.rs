//! Source-map translation
//!
//! Decodes V3 source maps into a generated line -> generated column ->
//! candidate table and answers position lookups against it. Lines and
//! columns are 0-indexed inside the table and 1-indexed at the API surface.
//!
//! Also encodes the inline maps attached to forms evaluated with source-map
//! instrumentation.

pub mod trace;
pub mod vlq;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::util::Position;

pub use trace::{StackFrame, TraceMapper};

/// Source-map errors
#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid source map JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported source map version {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid mapping segment {segment:?}: {message}")]
    Vlq { segment: String, message: String },
}

/// Result type for source-map operations
pub type SourceMapResult<T> = Result<T, SourceMapError>;

/// A generated -> original position pair, 0-indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub gen_line: u32,
    pub gen_column: u32,
    pub src_line: u32,
    pub src_column: u32,
    /// Original symbol name
    pub name: Option<String>,
}

/// One candidate original position, 0-indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    /// Index into [`SourceMap::sources`]
    pub source: u32,
    pub line: u32,
    pub column: u32,
    pub name: Option<String>,
}

type Candidates = SmallVec<[OriginalPosition; 1]>;

/// Decoded source map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMap {
    /// Generated file name
    pub file: Option<String>,
    /// Original source names
    pub sources: Vec<String>,
    lines: BTreeMap<u32, BTreeMap<u32, Candidates>>,
}

/// On-disk V3 layout
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lines: Option<u32>,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    names: Vec<String>,
    mappings: String,
}

impl SourceMap {
    /// Parse a V3 source map from JSON text
    pub fn from_json(json: &str) -> SourceMapResult<Self> {
        let raw: RawSourceMap = serde_json::from_str(json)?;
        if raw.version != 3 {
            return Err(SourceMapError::UnsupportedVersion(raw.version));
        }

        let mut map = SourceMap {
            file: raw.file,
            sources: raw.sources,
            lines: BTreeMap::new(),
        };

        // Everything but the generated column is relative to the previous
        // segment of the whole file.
        let (mut source, mut src_line, mut src_column, mut name) = (0i64, 0i64, 0i64, 0i64);
        for (gen_line, line) in raw.mappings.split(';').enumerate() {
            let mut gen_column = 0i64;
            for segment in line.split(',').filter(|s| !s.is_empty()) {
                let values = vlq::decode_segment(segment)?;
                let invalid = |message: &str| SourceMapError::Vlq {
                    segment: segment.to_string(),
                    message: message.to_string(),
                };
                match values.len() {
                    1 => {
                        gen_column += values[0];
                        continue;
                    }
                    4 | 5 => {}
                    _ => return Err(invalid("expected 1, 4 or 5 fields")),
                }
                gen_column += values[0];
                source += values[1];
                src_line += values[2];
                src_column += values[3];
                let symbol = if values.len() == 5 {
                    name += values[4];
                    Some(
                        raw.names
                            .get(name as usize)
                            .cloned()
                            .ok_or_else(|| invalid("name index out of range"))?,
                    )
                } else {
                    None
                };
                if gen_column < 0 || source < 0 || src_line < 0 || src_column < 0 {
                    return Err(invalid("negative position"));
                }
                map.insert(
                    gen_line as u32,
                    gen_column as u32,
                    OriginalPosition {
                        source: source as u32,
                        line: src_line as u32,
                        column: src_column as u32,
                        name: symbol,
                    },
                );
            }
        }
        Ok(map)
    }

    fn insert(
        &mut self,
        gen_line: u32,
        gen_column: u32,
        original: OriginalPosition,
    ) {
        self.lines
            .entry(gen_line)
            .or_default()
            .entry(gen_column)
            .or_default()
            .push(original);
    }

    /// Build a single-source map from emitted mappings
    pub fn from_mappings(
        source: &str,
        mappings: &[Mapping],
    ) -> Self {
        let mut map = SourceMap {
            file: None,
            sources: vec![source.to_string()],
            lines: BTreeMap::new(),
        };
        for m in mappings {
            map.insert(
                m.gen_line,
                m.gen_column,
                OriginalPosition {
                    source: 0,
                    line: m.src_line,
                    column: m.src_column,
                    name: m.name.clone(),
                },
            );
        }
        map
    }

    /// Whether any mapping exists for the 1-indexed generated line
    pub fn has_line(
        &self,
        line: u32,
    ) -> bool {
        line > 0 && self.lines.contains_key(&(line - 1))
    }

    /// Translate a 1-indexed generated position to its original position
    ///
    /// An exact column match wins; otherwise the first column recorded on
    /// that line is used. The last candidate of the chosen column is
    /// authoritative. Lines without any mapping come back unchanged.
    pub fn map_position(
        &self,
        pos: Position,
    ) -> Position {
        let (line, column) = pos.to_zero_based();
        let Some(columns) = self.lines.get(&line) else {
            return pos;
        };
        let candidates = columns
            .get(&column)
            .or_else(|| columns.values().next());
        match candidates.and_then(|c| c.last()) {
            Some(original) => Position::from_zero_based(original.line, original.column),
            None => pos,
        }
    }

    /// Encode as V3 JSON
    ///
    /// `lines` and `sourcesContent` are included for inline maps.
    pub fn to_json(
        &self,
        lines: Option<u32>,
        sources_content: Option<Vec<Option<String>>>,
    ) -> SourceMapResult<String> {
        let mut names: Vec<String> = Vec::new();
        let mut mappings = String::new();
        let (mut prev_source, mut prev_line, mut prev_column, mut prev_name) =
            (0i64, 0i64, 0i64, 0i64);

        let last_line = self.lines.keys().next_back().copied();
        for gen_line in 0..=last_line.unwrap_or(0) {
            if gen_line > 0 {
                mappings.push(';');
            }
            let Some(columns) = self.lines.get(&gen_line) else {
                continue;
            };
            let mut prev_gen_column = 0i64;
            let mut first = true;
            for (&gen_column, candidates) in columns {
                for original in candidates {
                    if !first {
                        mappings.push(',');
                    }
                    first = false;
                    vlq::encode(gen_column as i64 - prev_gen_column, &mut mappings);
                    vlq::encode(original.source as i64 - prev_source, &mut mappings);
                    vlq::encode(original.line as i64 - prev_line, &mut mappings);
                    vlq::encode(original.column as i64 - prev_column, &mut mappings);
                    if let Some(name) = &original.name {
                        let idx = match names.iter().position(|n| n == name) {
                            Some(idx) => idx,
                            None => {
                                names.push(name.clone());
                                names.len() - 1
                            }
                        } as i64;
                        vlq::encode(idx - prev_name, &mut mappings);
                        prev_name = idx;
                    }
                    prev_gen_column = gen_column as i64;
                    prev_source = original.source as i64;
                    prev_line = original.line as i64;
                    prev_column = original.column as i64;
                }
            }
        }
        if last_line.is_none() {
            mappings.clear();
        }

        let raw = RawSourceMap {
            version: 3,
            file: self.file.clone(),
            lines,
            sources: self.sources.clone(),
            sources_content,
            names,
            mappings,
        };
        Ok(serde_json::to_string(&raw)?)
    }
}

/// The sibling map file of a compiled output (`foo.js` -> `foo.js.map`)
pub fn map_file_for(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".map");
    PathBuf::from(name)
}

/// Decode a source map file; an absent file means no mapping is available
pub fn decode(map_file: &Path) -> SourceMapResult<Option<SourceMap>> {
    match fs::read_to_string(map_file) {
        Ok(json) => SourceMap::from_json(&json).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Inline map comment for one evaluated form
///
/// Produces the `sourceURL` marker for the generated `file_name` plus a
/// base64 `data:` URL carrying the map. The map names `source_name` as its
/// only source, with the original form text as its content. `form_line` is
/// the 1-indexed line the form started on.
pub fn inline_map_comment(
    file_name: &str,
    source_name: &str,
    source_text: &str,
    mappings: &[Mapping],
    form_line: u32,
) -> SourceMapResult<String> {
    let mut map = SourceMap::from_mappings(source_name, mappings);
    map.file = Some(file_name.to_string());
    let json = map.to_json(
        Some(form_line + 3),
        Some(vec![Some(source_text.to_string())]),
    )?;
    Ok(format!(
        "\n//# sourceURL={}\n//# sourceMappingURL=data:application/json;base64,{}",
        file_name,
        STANDARD.encode(json)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mapping(
        gen: (u32, u32),
        src: (u32, u32),
    ) -> Mapping {
        Mapping {
            gen_line: gen.0,
            gen_column: gen.1,
            src_line: src.0,
            src_column: src.1,
            name: None,
        }
    }

    #[test]
    fn test_decode_simple_map() {
        let json = r#"{"version":3,"file":"out.js","sources":["in.cljs"],"names":["foo"],"mappings":"AAAA,IAACA;AACA"}"#;
        let map = SourceMap::from_json(json).unwrap();
        assert_eq!(map.sources, vec!["in.cljs"]);
        assert_eq!(map.map_position(Position::new(1, 1)), Position::new(1, 1));
        assert_eq!(map.map_position(Position::new(1, 5)), Position::new(1, 2));
        assert_eq!(map.map_position(Position::new(2, 1)), Position::new(2, 2));
    }

    #[test]
    fn test_missing_column_falls_back_to_first_entry() {
        let map = SourceMap::from_mappings("a", &[mapping((0, 4), (7, 2)), mapping((0, 9), (8, 0))]);
        assert_eq!(map.map_position(Position::new(1, 1)), Position::new(8, 3));
    }

    #[test]
    fn test_last_candidate_wins() {
        let map = SourceMap::from_mappings("a", &[mapping((0, 0), (1, 1)), mapping((0, 0), (3, 3))]);
        assert_eq!(map.map_position(Position::new(1, 1)), Position::new(4, 4));
    }

    #[test]
    fn test_round_trip_through_json() {
        let line: u32 = 6;
        let map = SourceMap::from_mappings("repl.cljs", &[mapping((line, 2), (0, 0)), mapping((line, 10), (1, 4))]);
        let json = map.to_json(None, None).unwrap();
        let decoded = SourceMap::from_json(&json).unwrap();
        assert_eq!(
            decoded.map_position(Position::new(line as usize + 1, 11)),
            Position::new(2, 5)
        );
        assert_eq!(
            decoded.map_position(Position::new(line as usize + 1, 3)),
            Position::new(1, 1)
        );
    }

    #[test]
    fn test_names_survive_round_trip() {
        let mut m = mapping((0, 3), (0, 1));
        m.name = Some("inc".into());
        let json = SourceMap::from_mappings("x", &[m]).to_json(None, None).unwrap();
        let raw: RawSourceMap = serde_json::from_str(&json).unwrap();
        assert_eq!(raw.names, vec!["inc"]);
        assert_eq!(raw.mappings, "GAACA");
    }

    #[test]
    fn test_rejects_other_versions() {
        let json = r#"{"version":2,"sources":[],"names":[],"mappings":""}"#;
        assert!(matches!(
            SourceMap::from_json(json),
            Err(SourceMapError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_decode_absent_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(decode(&dir.path().join("missing.js.map")).unwrap().is_none());
    }

    #[test]
    fn test_decode_file() {
        let dir = tempfile::tempdir().unwrap();
        let js = dir.path().join("core.js");
        fs::write(
            map_file_for(&js),
            r#"{"version":3,"sources":["core.cljs"],"names":[],"mappings":"AAAA"}"#,
        )
        .unwrap();
        let map = decode(&map_file_for(&js)).unwrap().unwrap();
        assert!(map.has_line(1));
        assert!(!map.has_line(2));
    }

    #[test]
    fn test_inline_comment_embeds_form() {
        let comment = inline_map_comment(
            "repl-1.js",
            "repl-1.cljs",
            "(+ 1 2)",
            &[mapping((0, 0), (0, 0))],
            5,
        )
        .unwrap();
        let (_, b64) = comment.rsplit_once("base64,").unwrap();
        let json = String::from_utf8(STANDARD.decode(b64).unwrap()).unwrap();
        let raw: RawSourceMap = serde_json::from_str(&json).unwrap();
        assert_eq!(raw.lines, Some(8));
        assert_eq!(raw.file.as_deref(), Some("repl-1.js"));
        assert_eq!(raw.sources, vec!["repl-1.cljs".to_string()]);
        assert_eq!(raw.sources_content, Some(vec![Some("(+ 1 2)".to_string())]));
        assert!(comment.starts_with("\n//# sourceURL=repl-1.js\n"));
    }

    proptest! {
        #[test]
        fn prop_unmapped_lines_are_identity(line in 1usize..1000, column in 1usize..1000) {
            let map = SourceMap::from_mappings("a", &[mapping((2000, 0), (0, 0))]);
            let pos = Position::new(line, column);
            prop_assert_eq!(map.map_position(pos), pos);
        }

        #[test]
        fn prop_vlq_round_trip(value in -1_000_000i64..1_000_000) {
            let mut s = String::new();
            vlq::encode(value, &mut s);
            prop_assert_eq!(vlq::decode_segment(&s).unwrap(), vec![value]);
        }
    }
}
