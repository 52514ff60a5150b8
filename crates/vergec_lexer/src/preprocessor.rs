//! The macro preprocessor: `#define`/`#undef`/`#ifdef`/`#ifndef`/`#endif`/
//! `#include`/`#line`/`#column`/`#file`/`#str`.
//!
//! Filesystem access for `#include` is out of scope for this crate (spec.md
//! §1 lists filesystem I/O as an external collaborator), so file resolution
//! is injected through [`IncludeResolver`] rather than this module touching
//! disk itself.

use std::collections::HashMap;
use std::sync::Arc;

use vergec_foundation::{Diagnostic, DiagnosticKind, FileResolutionMap};

/// Supplies the contents of an `#include`d file.
///
/// Grounded on `original_source/floral/src/Lexer.hpp`'s `Preprocessor`,
/// which keeps `_fileStack`/`_fileResolutionMap` itself but delegates actual
/// reading to the driver.
pub trait IncludeResolver {
    /// Resolves `path` (angle-bracketed against a configured library root,
    /// or quoted and taken verbatim) to its contents and a canonical file
    /// name to record in the resolution map.
    fn resolve(&self, path: &str, angled: bool) -> Option<(String, String)>;
}

/// An `IncludeResolver` that never finds anything; useful for tests and for
/// translation units known not to use `#include`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIncludes;

impl IncludeResolver for NoIncludes {
    fn resolve(&self, _path: &str, _angled: bool) -> Option<(String, String)> {
        None
    }
}

#[derive(Debug, Clone)]
struct MacroDef {
    /// Parameter name, if this macro takes one. `None` for a plain
    /// `#define NAME VALUE`.
    param: Option<String>,
    body: String,
}

const MAX_EXPANSION_DEPTH: usize = 64;

/// Cursor-based macro preprocessor. One instance handles one translation
/// unit, recursing into itself for each `#include`.
pub struct Preprocessor<'a> {
    macros: HashMap<String, MacroDef>,
    resolver: &'a dyn IncludeResolver,
    output: String,
    resolution_map: FileResolutionMap,
    diagnostics: Vec<Diagnostic>,
}

/// The result of a successful preprocessing run.
pub struct Preprocessed {
    /// The fully expanded source text.
    pub source: String,
    /// Maps byte ranges of `source` back to originating files.
    pub resolution_map: FileResolutionMap,
}

impl<'a> Preprocessor<'a> {
    /// Creates a new preprocessor using `resolver` to satisfy `#include`s.
    #[must_use]
    pub fn new(resolver: &'a dyn IncludeResolver) -> Self {
        Self {
            macros: HashMap::new(),
            resolver,
            output: String::new(),
            resolution_map: FileResolutionMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Preprocesses `source`, which came from `file`, producing expanded
    /// source and a file resolution map, or a list of diagnostics.
    pub fn preprocess(
        mut self,
        source: &str,
        file: impl Into<Arc<str>>,
    ) -> Result<Preprocessed, Vec<Diagnostic>> {
        let file = file.into();
        let mut conditional_stack = Vec::new();
        self.process_file(source, &file, &mut conditional_stack, 0);
        if !conditional_stack.is_empty() {
            self.diagnostics
                .push(Diagnostic::error(DiagnosticKind::UnterminatedConditional));
        }
        if self.diagnostics.iter().any(|d| !d.is_warning()) {
            Err(self.diagnostics)
        } else {
            Ok(Preprocessed {
                source: self.output,
                resolution_map: self.resolution_map,
            })
        }
    }

    fn accepting(stack: &[bool]) -> bool {
        stack.iter().all(|&a| a)
    }

    fn process_file(
        &mut self,
        source: &str,
        file: &Arc<str>,
        conditional_stack: &mut Vec<bool>,
        depth: usize,
    ) {
        let range_start = self.output.len();
        let mut cursor = Cursor::new(source);
        let mut at_line_start = true;

        while let Some(c) = cursor.peek() {
            if c == '\n' {
                cursor.advance();
                if Self::accepting(conditional_stack) {
                    self.output.push('\n');
                }
                at_line_start = true;
                continue;
            }
            if c.is_whitespace() {
                cursor.advance();
                if Self::accepting(conditional_stack) {
                    self.output.push(c);
                }
                continue;
            }
            if c == '#' && at_line_start && self.try_block_directive(&mut cursor, file, conditional_stack, depth)
            {
                at_line_start = true;
                continue;
            }
            if c == '#' && Self::accepting(conditional_stack) && self.try_inline_expansion(&mut cursor, file) {
                at_line_start = false;
                continue;
            }
            if is_identifier_start(c) && Self::accepting(conditional_stack) {
                let name = cursor.scan_identifier();
                self.expand_identifier(&name, &mut cursor, 0);
                at_line_start = false;
                continue;
            }
            cursor.advance();
            if Self::accepting(conditional_stack) {
                self.output.push(c);
            }
            at_line_start = false;
        }

        let range_end = self.output.len();
        self.resolution_map.push(range_start, range_end, file.clone());
    }

    /// Attempts to parse a block directive (`#define`, `#undef`, `#ifdef`,
    /// `#ifndef`, `#endif`, `#include`) starting at `cursor`'s current `#`.
    /// Returns `true` if one was recognized and consumed (through its
    /// terminating newline, except `#include` which recurses).
    fn try_block_directive(
        &mut self,
        cursor: &mut Cursor,
        file: &Arc<str>,
        conditional_stack: &mut Vec<bool>,
        depth: usize,
    ) -> bool {
        let checkpoint = cursor.clone();
        cursor.advance(); // '#'
        let word = cursor.scan_identifier();
        match word.as_str() {
            "define" => {
                if Self::accepting(conditional_stack) {
                    self.directive_define(cursor);
                } else {
                    cursor.skip_to_newline();
                }
                true
            }
            "undef" => {
                cursor.skip_whitespace_in_line();
                let name = cursor.scan_identifier();
                if Self::accepting(conditional_stack) {
                    self.macros.remove(&name);
                }
                cursor.skip_to_newline();
                true
            }
            "ifdef" | "ifndef" => {
                cursor.skip_whitespace_in_line();
                let name = cursor.scan_identifier();
                let wants_defined = word == "ifdef";
                let defined = self.macros.contains_key(&name);
                conditional_stack.push(defined == wants_defined);
                cursor.skip_to_newline();
                true
            }
            "endif" => {
                if conditional_stack.pop().is_none() {
                    self.diagnostics
                        .push(Diagnostic::error(DiagnosticKind::UnmatchedEndif));
                }
                cursor.skip_to_newline();
                true
            }
            "include" => {
                if Self::accepting(conditional_stack) {
                    self.directive_include(cursor, file, conditional_stack, depth);
                } else {
                    cursor.skip_to_newline();
                }
                true
            }
            _ => {
                *cursor = checkpoint;
                false
            }
        }
    }

    fn directive_define(&mut self, cursor: &mut Cursor) {
        cursor.skip_whitespace_in_line();
        let name = cursor.scan_identifier();
        if name.is_empty() {
            self.diagnostics
                .push(Diagnostic::error(DiagnosticKind::ExpectedIdentifierAfterDirective {
                    directive: "#define".into(),
                }));
            cursor.skip_to_newline();
            return;
        }
        let param = if cursor.peek() == Some('(') {
            cursor.advance();
            cursor.skip_whitespace_in_line();
            let arg = cursor.scan_identifier();
            cursor.skip_whitespace_in_line();
            if cursor.peek() == Some(')') {
                cursor.advance();
            }
            Some(arg)
        } else {
            None
        };
        cursor.skip_whitespace_in_line();
        let body = cursor.scan_to_newline().trim().to_string();
        self.macros.insert(name, MacroDef { param, body });
    }

    fn directive_include(
        &mut self,
        cursor: &mut Cursor,
        including_file: &Arc<str>,
        conditional_stack: &mut Vec<bool>,
        depth: usize,
    ) {
        cursor.skip_whitespace_in_line();
        let (path, angled) = match cursor.peek() {
            Some('<') => {
                cursor.advance();
                let text = cursor.scan_while(|c| c != '>');
                if cursor.peek() == Some('>') {
                    cursor.advance();
                }
                (text, true)
            }
            Some('"') => {
                cursor.advance();
                let text = cursor.scan_while(|c| c != '"');
                if cursor.peek() == Some('"') {
                    cursor.advance();
                }
                (text, false)
            }
            _ => {
                self.diagnostics
                    .push(Diagnostic::error(DiagnosticKind::UnexpectedCharacterAfterInclude));
                cursor.skip_to_newline();
                return;
            }
        };
        cursor.skip_to_newline();

        if depth >= MAX_EXPANSION_DEPTH {
            self.diagnostics.push(Diagnostic::error(DiagnosticKind::Internal {
                message: format!("#include nesting exceeds {MAX_EXPANSION_DEPTH} (from {including_file})"),
            }));
            return;
        }

        match self.resolver.resolve(&path, angled) {
            Some((contents, canonical_name)) => {
                self.process_file(&contents, &Arc::from(canonical_name), conditional_stack, depth + 1);
            }
            None => self
                .diagnostics
                .push(Diagnostic::error(DiagnosticKind::UnknownIncludePath { path })),
        }
    }

    /// Attempts `#line`, `#column`, `#file`, `#str(...)`. Returns `true` if
    /// one was recognized and its expansion was appended to `self.output`.
    fn try_inline_expansion(&mut self, cursor: &mut Cursor, file: &Arc<str>) -> bool {
        let checkpoint = cursor.clone();
        cursor.advance(); // '#'
        let word = cursor.scan_identifier();
        match word.as_str() {
            "line" => {
                self.output.push_str(&cursor.line.to_string());
                true
            }
            "column" => {
                self.output.push_str(&cursor.column.to_string());
                true
            }
            "file" => {
                self.output.push('"');
                self.output.push_str(file);
                self.output.push('"');
                true
            }
            "str" if cursor.peek() == Some('(') => {
                cursor.advance();
                let text = cursor.scan_balanced_parens();
                self.output.push('"');
                self.output.push_str(&text);
                self.output.push('"');
                true
            }
            _ => {
                *cursor = checkpoint;
                false
            }
        }
    }

    /// Expands `name` if it names a macro (splicing its body and a
    /// recursive expansion of that body), otherwise emits it unchanged.
    fn expand_identifier(&mut self, name: &str, cursor: &mut Cursor, depth: usize) {
        if depth >= MAX_EXPANSION_DEPTH {
            self.output.push_str(name);
            return;
        }
        let Some(def) = self.macros.get(name).cloned() else {
            self.output.push_str(name);
            return;
        };
        let mut body = def.body.clone();
        if let Some(param) = &def.param {
            if cursor.peek() == Some('(') {
                cursor.advance();
                let arg = cursor.scan_balanced_parens();
                body = substitute_param(&body, param, &arg);
            }
        }
        let expanded = self.expand_text(&body, depth + 1);
        self.output.push_str(&expanded);
    }

    /// Re-scans `text` for further macro references (the "also re-scanned"
    /// rule) and returns the fully expanded string, without touching
    /// `self.output`.
    fn expand_text(&mut self, text: &str, depth: usize) -> String {
        let mut result = String::new();
        let mut cursor = Cursor::new(text);
        while let Some(c) = cursor.peek() {
            if is_identifier_start(c) {
                let name = cursor.scan_identifier();
                let saved = std::mem::take(&mut self.output);
                self.expand_identifier(&name, &mut cursor, depth);
                let piece = std::mem::replace(&mut self.output, saved);
                result.push_str(&piece);
            } else {
                cursor.advance();
                result.push(c);
            }
        }
        result
    }
}

fn substitute_param(body: &str, param: &str, arg: &str) -> String {
    let mut result = String::new();
    let mut cursor = Cursor::new(body);
    while let Some(c) = cursor.peek() {
        if is_identifier_start(c) {
            let name = cursor.scan_identifier();
            if name == param {
                result.push_str(arg);
            } else {
                result.push_str(&name);
            }
        } else {
            cursor.advance();
            result.push(c);
        }
    }
    result
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A minimal byte-position/line/column cursor over a `&str`, mirroring the
/// lexer's own cursor so both stages track location the same way.
#[derive(Clone)]
struct Cursor<'s> {
    rest: &'s str,
    line: u32,
    column: u32,
}

impl<'s> Cursor<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            rest: source,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.rest.chars().next()?;
        self.rest = &self.rest[c.len_utf8()..];
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn scan_while(&mut self, mut pred: impl FnMut(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if pred(c) {
                out.push(c);
                self.advance();
            } else {
                break;
            }
        }
        out
    }

    fn scan_identifier(&mut self) -> String {
        self.scan_while(is_identifier_char)
    }

    fn skip_whitespace_in_line(&mut self) {
        self.scan_while(|c| c.is_whitespace() && c != '\n');
    }

    fn skip_to_newline(&mut self) {
        self.scan_while(|c| c != '\n');
        if self.peek() == Some('\n') {
            self.advance();
        }
    }

    fn scan_to_newline(&mut self) -> String {
        self.scan_while(|c| c != '\n')
    }

    fn scan_balanced_parens(&mut self) -> String {
        let mut depth = 1usize;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            match c {
                '(' => {
                    depth += 1;
                    out.push(c);
                    self.advance();
                }
                ')' => {
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        break;
                    }
                    out.push(c);
                }
                _ => {
                    out.push(c);
                    self.advance();
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_plain_source() {
        let pp = Preprocessor::new(&NoIncludes);
        let out = pp.preprocess("func main(): Int { return 0; }", "a.vg").unwrap();
        assert_eq!(out.source, "func main(): Int { return 0; }");
    }

    #[test]
    fn define_and_expand_simple_macro() {
        let pp = Preprocessor::new(&NoIncludes);
        let out = pp
            .preprocess("#define WIDTH 80\nglobal w: Int = WIDTH;", "a.vg")
            .unwrap();
        assert!(out.source.contains("global w: Int = 80;"));
        assert!(!out.source.contains("WIDTH"));
    }

    #[test]
    fn define_with_argument() {
        let pp = Preprocessor::new(&NoIncludes);
        let out = pp
            .preprocess("#define SQUARE(x) ((x) * (x))\nlet y: Int = SQUARE(3);", "a.vg")
            .unwrap();
        assert!(out.source.contains("((3) * (3))"));
    }

    #[test]
    fn undef_removes_macro() {
        let pp = Preprocessor::new(&NoIncludes);
        let out = pp
            .preprocess("#define X 1\n#undef X\nlet y: Int = X;", "a.vg")
            .unwrap();
        assert!(out.source.contains("let y: Int = X;"));
    }

    #[test]
    fn ifdef_suppresses_when_undefined() {
        let pp = Preprocessor::new(&NoIncludes);
        let out = pp
            .preprocess("#ifdef FEATURE\nlet x: Int = 1;\n#endif\nlet y: Int = 2;", "a.vg")
            .unwrap();
        assert!(!out.source.contains("let x"));
        assert!(out.source.contains("let y: Int = 2;"));
    }

    #[test]
    fn ifndef_includes_when_undefined() {
        let pp = Preprocessor::new(&NoIncludes);
        let out = pp
            .preprocess("#ifndef FEATURE\nlet x: Int = 1;\n#endif", "a.vg")
            .unwrap();
        assert!(out.source.contains("let x: Int = 1;"));
    }

    #[test]
    fn nested_conditionals_track_depth() {
        let pp = Preprocessor::new(&NoIncludes);
        let out = pp
            .preprocess(
                "#ifdef OUTER\n#ifdef INNER\nlet a: Int = 1;\n#endif\n#endif\nlet b: Int = 2;",
                "a.vg",
            )
            .unwrap();
        assert!(!out.source.contains("let a"));
        assert!(out.source.contains("let b"));
    }

    #[test]
    fn unmatched_endif_is_an_error() {
        let pp = Preprocessor::new(&NoIncludes);
        let result = pp.preprocess("#endif\n", "a.vg");
        assert!(result.is_err());
    }

    #[test]
    fn unterminated_conditional_is_an_error() {
        let pp = Preprocessor::new(&NoIncludes);
        let result = pp.preprocess("#ifdef X\nlet a: Int = 1;", "a.vg");
        assert!(result.is_err());
    }

    #[test]
    fn str_directive_wraps_in_quotes() {
        let pp = Preprocessor::new(&NoIncludes);
        let out = pp.preprocess("let s: &Char = #str(hello);", "a.vg").unwrap();
        assert!(out.source.contains("\"hello\""));
    }

    #[test]
    fn file_directive_expands_to_filename() {
        let pp = Preprocessor::new(&NoIncludes);
        let out = pp.preprocess("let f: &Char = #file;", "main.vg").unwrap();
        assert!(out.source.contains("\"main.vg\""));
    }

    struct MapResolver(HashMap<&'static str, &'static str>);
    impl IncludeResolver for MapResolver {
        fn resolve(&self, path: &str, _angled: bool) -> Option<(String, String)> {
            self.0.get(path).map(|body| (body.to_string(), path.to_string()))
        }
    }

    #[test]
    fn include_splices_and_tracks_resolution_map() {
        let mut files = HashMap::new();
        files.insert("lib.vg", "global shared: Int = 1;");
        let resolver = MapResolver(files);
        let pp = Preprocessor::new(&resolver);
        let out = pp
            .preprocess("#include \"lib.vg\"\nlet x: Int = shared;", "main.vg")
            .unwrap();
        assert!(out.source.contains("global shared: Int = 1;"));
        assert!(out.resolution_map.resolve(0).map(Arc::as_ref) == Some("lib.vg"));
    }

    #[test]
    fn unknown_include_path_is_an_error() {
        let pp = Preprocessor::new(&NoIncludes);
        let result = pp.preprocess("#include \"missing.vg\"\n", "main.vg");
        assert!(result.is_err());
    }
}
