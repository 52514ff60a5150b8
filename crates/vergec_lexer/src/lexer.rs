//! Turns preprocessed source into a token stream.

use std::sync::Arc;

use vergec_foundation::{Diagnostic, DiagnosticContext, DiagnosticKind, FileResolutionMap, Span};

use crate::token::{lookup_keyword, IntLiteralKind, Token, TokenKind};

/// Cursor-based lexer over one translation unit's expanded source.
///
/// A source slice plus the unconsumed `rest`, advancing one `char` at a
/// time while tracking byte position, line, and column.
pub struct Lexer<'src> {
    source: &'src str,
    rest: &'src str,
    position: usize,
    line: u32,
    column: u32,
    file: Arc<str>,
    resolution_map: &'src FileResolutionMap,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    /// Creates a lexer over `source`, using `resolution_map` to resolve
    /// each token's originating file.
    #[must_use]
    pub fn new(source: &'src str, resolution_map: &'src FileResolutionMap) -> Self {
        let file = resolution_map
            .resolve(0)
            .cloned()
            .unwrap_or_else(|| Arc::from("<unknown>"));
        Self {
            source,
            rest: source,
            position: 0,
            line: 1,
            column: 1,
            file,
            resolution_map,
            diagnostics: Vec::new(),
        }
    }

    /// Tokenizes `source` in one call, collecting diagnostics separately
    /// from the returned token stream (the lexer never hard-fails: it keeps
    /// producing `Error` tokens and continues, per spec.md §7's
    /// accumulate-and-continue propagation policy).
    #[must_use]
    pub fn tokenize_all(source: &'src str, resolution_map: &'src FileResolutionMap) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut lexer = Self::new(source, resolution_map);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let is_eof = matches!(token.kind, TokenKind::Eof);
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        let tokens = concatenate_adjacent_strings(tokens);
        (tokens, lexer.diagnostics)
    }

    fn current_file(&self) -> Arc<str> {
        self.resolution_map
            .resolve(self.position)
            .cloned()
            .unwrap_or_else(|| self.file.clone())
    }

    fn peek_char(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn peek_char_at(&self, n: usize) -> Option<char> {
        self.rest.chars().nth(n)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.rest.chars().next()?;
        self.rest = &self.rest[c.len_utf8()..];
        self.position += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn span_from(&self, start: usize, start_line: u32, start_col: u32) -> Span {
        Span::new(start, self.position, start_line, start_col, self.current_file())
    }

    /// Records a lex-domain diagnostic for the token starting at
    /// `(start, start_line, start_col)`. Each scanner calls this at its own
    /// error site with the `DiagnosticKind` that actually matches what went
    /// wrong there, rather than a caller downstream guessing from the
    /// token's rendered text.
    fn push_lex_diagnostic(&mut self, kind: DiagnosticKind, start: usize, start_line: u32, start_col: u32) {
        let span = self.span_from(start, start_line, start_col);
        self.diagnostics.push(Diagnostic::error(kind).with_context(DiagnosticContext::new().with_region(span)));
    }

    fn skip_whitespace_and_comments(&mut self) -> Option<Token> {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_char_at(1) == Some('/') => {
                    let (start, line, col) = (self.position, self.line, self.column);
                    let mut text = String::new();
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        text.push(c);
                        self.advance();
                    }
                    return Some(Token::new(TokenKind::Comment(text), self.span_from(start, line, col)));
                }
                Some('/') if self.peek_char_at(1) == Some('*') => {
                    let (start, line, col) = (self.position, self.line, self.column);
                    let mut text = String::new();
                    self.advance();
                    self.advance();
                    text.push_str("/*");
                    loop {
                        match self.peek_char() {
                            None => break,
                            Some('*') if self.peek_char_at(1) == Some('/') => {
                                text.push_str("*/");
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(c) => {
                                text.push(c);
                                self.advance();
                            }
                        }
                    }
                    return Some(Token::new(TokenKind::Comment(text), self.span_from(start, line, col)));
                }
                _ => return None,
            }
        }
    }

    /// Produces the next token, including `Comment` trivia. Callers that
    /// want only significant tokens should filter with
    /// [`TokenKind::is_trivia`].
    pub fn next_token(&mut self) -> Token {
        if let Some(comment) = self.skip_whitespace_and_comments() {
            return comment;
        }
        let (start, line, col) = (self.position, self.line, self.column);
        let Some(c) = self.peek_char() else {
            return Token::new(TokenKind::Eof, self.span_from(start, line, col));
        };

        let kind = if is_identifier_start(c) {
            self.scan_identifier_or_keyword()
        } else if c.is_ascii_digit() || (c == '.' && self.peek_char_at(1).is_some_and(|n| n.is_ascii_digit())) {
            self.scan_number(start, line, col)
        } else if c == '"' {
            self.scan_ascii_string(start, line, col)
        } else if c == 'W' && self.peek_char_at(1) == Some('"') {
            self.advance();
            self.scan_wide_string(start, line, col)
        } else if c == '\'' {
            self.scan_char_literal(start, line, col)
        } else {
            self.scan_operator_or_punctuation(start, line, col)
        };

        let span = self.span_from(start, line, col);
        Token::new(kind, span)
    }

    fn scan_identifier_or_keyword(&mut self) -> TokenKind {
        let mut name = String::new();
        while let Some(c) = self.peek_char() {
            if is_identifier_char(c) {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        lookup_keyword(&name).unwrap_or(TokenKind::Identifier(name))
    }

    fn scan_number(&mut self, start: usize, line: u32, col: u32) -> TokenKind {
        let mut text = String::new();
        let is_hex = self.peek_char() == Some('0') && matches!(self.peek_char_at(1), Some('x' | 'X'));
        if is_hex {
            text.push(self.advance().unwrap());
            text.push(self.advance().unwrap());
            while let Some(c) = self.peek_char() {
                if c.is_ascii_hexdigit() || c == '_' {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        } else {
            let mut is_float = false;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() || c == '_' {
                    text.push(c);
                    self.advance();
                } else if c == '.' && !is_float && self.peek_char_at(1).is_some_and(|n| n.is_ascii_digit()) {
                    is_float = true;
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            if is_float {
                let value: f64 = text.replace('_', "").parse().unwrap_or(0.0);
                return TokenKind::FloatLiteral(value);
            }
        }

        let mut suffix = String::new();
        while let Some(c) = self.peek_char() {
            if matches!(c, 'u' | 'b' | 'w' | 'd' | 'c') {
                suffix.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let digits: String = text.chars().filter(|c| *c != '_').collect();
        let value = if is_hex {
            u64::from_str_radix(digits.trim_start_matches("0x").trim_start_matches("0X"), 16).unwrap_or(0)
        } else {
            digits.parse().unwrap_or(0)
        };

        match resolve_int_suffix(&suffix) {
            Some(kind) => TokenKind::IntLiteral { value, kind },
            None => {
                self.push_lex_diagnostic(DiagnosticKind::UnknownNumericSuffix { suffix: suffix.clone() }, start, line, col);
                TokenKind::Error(format!("unknown numeric suffix `{suffix}`"))
            }
        }
    }

    fn scan_ascii_string(&mut self, start: usize, line: u32, col: u32) -> TokenKind {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    self.push_lex_diagnostic(DiagnosticKind::UnterminatedString, start, line, col);
                    return TokenKind::Error("unterminated string literal".into());
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    text.push(self.scan_escape());
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
        TokenKind::AsciiString(text)
    }

    fn scan_wide_string(&mut self, start: usize, line: u32, col: u32) -> TokenKind {
        self.advance(); // opening quote
        let mut points = Vec::new();
        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    self.push_lex_diagnostic(DiagnosticKind::UnterminatedString, start, line, col);
                    return TokenKind::Error("unterminated string literal".into());
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') if self.peek_char_at(1) == Some('u') => {
                    self.advance();
                    self.advance();
                    let mut hex = String::new();
                    for _ in 0..4 {
                        if let Some(c) = self.peek_char() {
                            if c.is_ascii_hexdigit() {
                                hex.push(c);
                                self.advance();
                            }
                        }
                    }
                    points.push(u32::from_str_radix(&hex, 16).unwrap_or(0));
                }
                Some('\\') => {
                    self.advance();
                    points.push(self.scan_escape() as u32);
                }
                Some(c) => {
                    points.push(c as u32);
                    self.advance();
                }
            }
        }
        TokenKind::WideString(points)
    }

    fn scan_char_literal(&mut self, start: usize, line: u32, col: u32) -> TokenKind {
        self.advance(); // opening quote
        let value = match self.peek_char() {
            None => {
                self.push_lex_diagnostic(DiagnosticKind::UnterminatedChar, start, line, col);
                return TokenKind::Error("unterminated character literal".into());
            }
            Some('\\') => {
                self.advance();
                self.scan_escape()
            }
            Some(c) => {
                self.advance();
                c
            }
        };
        if self.peek_char() != Some('\'') {
            self.push_lex_diagnostic(DiagnosticKind::UnterminatedChar, start, line, col);
            return TokenKind::Error("unterminated character literal".into());
        }
        self.advance();
        let code_point = u32::from(value);
        if code_point > 0xFF {
            self.push_lex_diagnostic(DiagnosticKind::OverlongWideChar, start, line, col);
            return TokenKind::Error("wide character literal exceeds 4 bytes".into());
        }
        TokenKind::IntLiteral {
            value: u64::from(code_point),
            kind: IntLiteralKind::UByte,
        }
    }

    fn scan_escape(&mut self) -> char {
        match self.advance() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('e') => '\x1b',
            Some('"') => '"',
            Some('\'') => '\'',
            Some('\\') => '\\',
            Some(other) => other,
            None => '\0',
        }
    }

    fn scan_operator_or_punctuation(&mut self, start: usize, line: u32, col: u32) -> TokenKind {
        let c0 = self.advance().unwrap();
        let c1 = self.peek_char();
        macro_rules! two {
            ($second:expr, $kind:expr) => {
                if c1 == Some($second) {
                    self.advance();
                    return $kind;
                }
            };
        }
        match c0 {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ':' => {
                two!(':', TokenKind::ScopeResolve);
                TokenKind::Colon
            }
            '+' => {
                two!('+', TokenKind::Inc);
                two!('=', TokenKind::PlusEq);
                TokenKind::Plus
            }
            '-' => {
                two!('-', TokenKind::Dec);
                two!('=', TokenKind::MinusEq);
                two!('>', TokenKind::Arrow);
                TokenKind::Minus
            }
            '*' => {
                two!('=', TokenKind::StarEq);
                TokenKind::Star
            }
            '/' => {
                two!('=', TokenKind::SlashEq);
                TokenKind::Slash
            }
            '%' => {
                two!('=', TokenKind::PercentEq);
                TokenKind::Percent
            }
            '^' => {
                two!('^', TokenKind::CaretCaret);
                two!('=', TokenKind::CaretEq);
                TokenKind::Caret
            }
            '&' => {
                two!('&', TokenKind::AmpAmp);
                two!('=', TokenKind::AmpEq);
                TokenKind::Amp
            }
            '|' => {
                two!('|', TokenKind::PipePipe);
                two!('=', TokenKind::PipeEq);
                TokenKind::Pipe
            }
            '~' => TokenKind::Tilde,
            '!' => {
                two!('=', TokenKind::NotEq);
                TokenKind::Bang
            }
            '=' => {
                two!('=', TokenKind::EqEq);
                TokenKind::Assign
            }
            '<' => {
                two!('=', TokenKind::LessEq);
                two!('-', TokenKind::BackArrow);
                TokenKind::Less
            }
            '>' => {
                two!('=', TokenKind::GreaterEq);
                TokenKind::Greater
            }
            other => {
                self.push_lex_diagnostic(DiagnosticKind::UnknownCharacter { ch: other }, start, line, col);
                TokenKind::Error(other.to_string())
            }
        }
    }
}

fn resolve_int_suffix(suffix: &str) -> Option<IntLiteralKind> {
    let mut chars: Vec<char> = suffix.chars().collect();
    chars.sort_unstable();
    let key: String = chars.into_iter().collect();
    Some(match key.as_str() {
        "" => IntLiteralKind::Int,
        "u" => IntLiteralKind::UInt,
        "b" => IntLiteralKind::Byte,
        "bu" => IntLiteralKind::UByte,
        "w" => IntLiteralKind::Short,
        "uw" => IntLiteralKind::UShort,
        "d" => IntLiteralKind::Int32,
        "du" => IntLiteralKind::UInt32,
        "c" => IntLiteralKind::WideChar,
        "cu" => IntLiteralKind::WideUChar,
        _ => return None,
    })
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Merges adjacent ASCII-string (or adjacent wide-string) literal tokens of
/// the same kind into one, per spec.md §4.2. Runs of trivia between two
/// string tokens do not break concatenation.
fn concatenate_adjacent_strings(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token.kind.is_trivia() {
            out.push(token);
            continue;
        }
        if let TokenKind::AsciiString(text) = &token.kind {
            if let Some(prev) = last_significant_mut(&mut out) {
                if let TokenKind::AsciiString(prev_text) = &mut prev.kind {
                    prev_text.push_str(text);
                    prev.span = prev.span.to(&token.span);
                    continue;
                }
            }
        }
        if let TokenKind::WideString(points) = &token.kind {
            if let Some(prev) = last_significant_mut(&mut out) {
                if let TokenKind::WideString(prev_points) = &mut prev.kind {
                    prev_points.extend_from_slice(points);
                    prev.span = prev.span.to(&token.span);
                    continue;
                }
            }
        }
        out.push(token);
    }
    out
}

fn last_significant_mut(tokens: &mut [Token]) -> Option<&mut Token> {
    tokens.iter_mut().rev().find(|t| !t.kind.is_trivia())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &'static str) -> (Vec<Token>, Vec<Diagnostic>) {
        let mut map = FileResolutionMap::new();
        map.push(0, source.len(), "a.vg");
        let leaked: &'static FileResolutionMap = Box::leak(Box::new(map));
        Lexer::tokenize_all(source, leaked)
    }

    fn significant(tokens: &[Token]) -> Vec<&TokenKind> {
        tokens.iter().filter(|t| !t.kind.is_trivia()).map(|t| &t.kind).collect()
    }

    mod proptests {
        use proptest::prelude::*;

        use super::super::*;
        use vergec_foundation::FileResolutionMap;

        proptest! {
            /// spec.md §8's span-coverage invariant, restricted to what the
            /// lexer actually guarantees: every token's span is non-empty or
            /// EOF-only, spans never overlap, and each token starts no
            /// earlier than the previous one ended. Whitespace and comments
            /// are consumed silently with no token of their own, so this
            /// does not assert gapless coverage of `source`.
            #[test]
            fn token_spans_are_ordered_and_non_overlapping(source in "[ -~\\n\t]{0,64}") {
                let mut map = FileResolutionMap::new();
                map.push(0, source.len(), "a.vg");
                let leaked: &'static FileResolutionMap = Box::leak(Box::new(map));
                let (tokens, _) = Lexer::tokenize_all(&source, leaked);

                let mut prev_end = 0usize;
                for token in &tokens {
                    prop_assert!(token.span.start >= prev_end, "token span must not start before the previous one ended");
                    prop_assert!(token.span.end >= token.span.start, "span end must not precede its start");
                    prop_assert!(token.span.end <= source.len(), "span must stay within the source");
                    prev_end = token.span.end;
                }
            }
        }
    }

    #[test]
    fn lex_empty() {
        let (tokens, diags) = lex("");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
        assert!(diags.is_empty());
    }

    #[test]
    fn lex_keywords_and_identifier() {
        let (tokens, _) = lex("func main");
        let kinds = significant(&tokens);
        assert_eq!(kinds[0], &TokenKind::Func);
        assert_eq!(kinds[1], &TokenKind::Identifier("main".into()));
    }

    #[test]
    fn lex_keyword_aliases() {
        let (tokens, _) = lex("Int64 QWord UInt8");
        let kinds = significant(&tokens);
        assert_eq!(kinds[0], &TokenKind::Int64Type);
        assert_eq!(kinds[1], &TokenKind::Int64Type);
        assert_eq!(kinds[2], &TokenKind::UCharType);
    }

    #[test]
    fn lex_decimal_integer() {
        let (tokens, _) = lex("42");
        assert_eq!(
            significant(&tokens)[0],
            &TokenKind::IntLiteral { value: 42, kind: IntLiteralKind::Int }
        );
    }

    #[test]
    fn lex_hex_integer() {
        let (tokens, _) = lex("0xFF");
        assert_eq!(
            significant(&tokens)[0],
            &TokenKind::IntLiteral { value: 255, kind: IntLiteralKind::Int }
        );
    }

    #[test]
    fn lex_integer_with_suffix() {
        let (tokens, _) = lex("10ub");
        assert_eq!(
            significant(&tokens)[0],
            &TokenKind::IntLiteral { value: 10, kind: IntLiteralKind::UByte }
        );
    }

    #[test]
    fn lex_unknown_suffix_errors() {
        let (tokens, diags) = lex("10z");
        assert!(matches!(significant(&tokens)[0], TokenKind::Error(_)));
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0].kind, DiagnosticKind::UnknownNumericSuffix { .. }));
    }

    #[test]
    fn lex_float() {
        let (tokens, _) = lex("3.14");
        assert_eq!(significant(&tokens)[0], &TokenKind::FloatLiteral(3.14));
    }

    #[test]
    fn lex_ascii_string_with_escapes() {
        let (tokens, _) = lex(r#""hi\n""#);
        assert_eq!(significant(&tokens)[0], &TokenKind::AsciiString("hi\n".into()));
    }

    #[test]
    fn lex_adjacent_strings_concatenate() {
        let (tokens, _) = lex(r#""foo" "bar""#);
        let kinds = significant(&tokens);
        assert_eq!(kinds[0], &TokenKind::AsciiString("foobar".into()));
        assert_eq!(kinds.len(), 2); // concatenated string + Eof
    }

    #[test]
    fn lex_unterminated_string_errors() {
        let (tokens, diags) = lex("\"abc");
        assert!(matches!(significant(&tokens)[0], TokenKind::Error(_)));
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0].kind, DiagnosticKind::UnterminatedString));
    }

    #[test]
    fn lex_unterminated_wide_string_reports_unterminated_string() {
        let (tokens, diags) = lex("W\"abc");
        assert!(matches!(significant(&tokens)[0], TokenKind::Error(_)));
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0].kind, DiagnosticKind::UnterminatedString));
    }

    #[test]
    fn lex_unterminated_char_literal_reports_unterminated_char() {
        let (tokens, diags) = lex("'a");
        assert!(matches!(significant(&tokens)[0], TokenKind::Error(_)));
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0].kind, DiagnosticKind::UnterminatedChar));
    }

    #[test]
    fn lex_overlong_char_literal_reports_overlong_wide_char() {
        let (tokens, diags) = lex("'\u{2603}'");
        assert!(matches!(significant(&tokens)[0], TokenKind::Error(_)));
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0].kind, DiagnosticKind::OverlongWideChar));
    }

    #[test]
    fn lex_wide_string() {
        let (tokens, _) = lex(r#"W"ab""#);
        assert_eq!(significant(&tokens)[0], &TokenKind::WideString(vec![97, 98]));
    }

    #[test]
    fn lex_char_literal() {
        let (tokens, _) = lex("'e'");
        assert_eq!(
            significant(&tokens)[0],
            &TokenKind::IntLiteral { value: 101, kind: IntLiteralKind::UByte }
        );
    }

    #[test]
    fn lex_escaped_char_literal() {
        let (tokens, _) = lex(r"'\n'");
        assert_eq!(
            significant(&tokens)[0],
            &TokenKind::IntLiteral { value: 10, kind: IntLiteralKind::UByte }
        );
    }

    #[test]
    fn lex_operators_longest_match_first() {
        let (tokens, _) = lex("<= < == = ++ + -> --");
        let kinds = significant(&tokens);
        assert_eq!(kinds[0], &TokenKind::LessEq);
        assert_eq!(kinds[1], &TokenKind::Less);
        assert_eq!(kinds[2], &TokenKind::EqEq);
        assert_eq!(kinds[3], &TokenKind::Assign);
        assert_eq!(kinds[4], &TokenKind::Inc);
        assert_eq!(kinds[5], &TokenKind::Plus);
        assert_eq!(kinds[6], &TokenKind::Arrow);
        assert_eq!(kinds[7], &TokenKind::Dec);
    }

    #[test]
    fn lex_comments_are_trivia() {
        let (tokens, _) = lex("// a comment\nlet x");
        assert!(tokens[0].kind.is_trivia());
    }

    #[test]
    fn lex_block_comment() {
        let (tokens, _) = lex("/* multi\nline */let");
        assert!(tokens[0].kind.is_trivia());
        assert_eq!(significant(&tokens)[0], &TokenKind::Let);
    }

    #[test]
    fn lex_unknown_character_reports_diagnostic() {
        let (tokens, diags) = lex("let x = `;");
        assert!(matches!(significant(&tokens).iter().find(|k| matches!(k, TokenKind::Error(_))), Some(_)));
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn lex_span_tracking() {
        let (tokens, _) = lex("let x");
        let let_token = &tokens[0];
        assert_eq!(let_token.span.start, 0);
        assert_eq!(let_token.span.end, 3);
        let x_token = significant(&tokens)[1];
        let _ = x_token;
    }

    #[test]
    fn token_stream_covers_source_without_gaps() {
        let source = "func main(): Int { return 0; }";
        let (tokens, _) = lex(source);
        let mut cursor = 0usize;
        for token in &tokens {
            if matches!(token.kind, TokenKind::Eof) {
                break;
            }
            assert_eq!(token.span.start, cursor, "gap or overlap before {:?}", token.kind);
            cursor = token.span.end;
        }
        assert_eq!(cursor, source.len());
    }
}
