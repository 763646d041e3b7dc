//! The KDL tokenizer: turns source text into a stream of [`Token`]s without
//! interpreting string escapes or number magnitudes. [`crate::value_builder`]
//! and [`crate::number`] do that interpretation once a token's kind and span
//! are known, keeping boundary-finding separate from content decoding.
//!
//! [`Scanner`] is built over a complete in-memory `&str` and hands back
//! zero-copy spans into it. The reader-based entry point in `lib.rs`
//! materializes the whole source into a buffer first and then drives the
//! same `Scanner` over it: there is no bounded-buffer, mid-token-resumable
//! scan state here (no `NeedMore`/`ScanState::{InString,InNumber,...}`
//! equivalent), so `ParseOptions::buffer_size` does not bound memory use
//! during tokenization — only the size of `read_to_string`'s own copy
//! loop. This is a disclosed scope cut from a fully streaming tokenizer;
//! see `DESIGN.md`.

use crate::error::ErrorKind;
use crate::unicode::{is_disallowed, is_identifier_char, is_identifier_start, is_newline, is_whitespace};

/// The kind of a scanned token, carrying just enough metadata for the
/// parser to dispatch to the right decoder in [`crate::value_builder`] or
/// [`crate::number`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `=`
    Equals,
    /// `;`
    Semicolon,
    /// A single newline (possibly a CRLF pair, counted as one token).
    Newline,
    /// `/-`
    Slashdash,
    /// A bare identifier (`text` is the identifier itself, no delimiters).
    Identifier,
    /// A quoted string. `text` spans the full token including both `"`s.
    QuotedString {
        /// Whether this was a `"""`-delimited multiline string.
        multiline: bool,
    },
    /// A raw string. `text` spans the full token including the leading
    /// `#`s and quote(s) and the trailing quote(s) and `#`s.
    RawString {
        /// Whether this was a `"""`-delimited multiline raw string.
        multiline: bool,
        /// Number of `#` characters used as the delimiter.
        hashes: u8,
    },
    /// A numeric literal, in any of the four supported radixes.
    Number,
    /// `#true`
    True,
    /// `#false`
    False,
    /// `#null`
    Null,
    /// `#inf`
    Inf,
    /// `#-inf`
    NegInf,
    /// `#nan`
    Nan,
    /// End of input.
    Eof,
}

/// One scanned token: its kind, its full raw text (including delimiters
/// where the kind has them), and its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// The token's raw text, exactly as it appeared in the source.
    pub text: &'a str,
    /// Absolute byte offset of `text` within the source the scanner was
    /// built over, used to build borrowed [`crate::string_pool::StringRef`]s.
    pub start: usize,
    /// 1-based line number the token starts on.
    pub line: u32,
    /// 1-based column number (in codepoints) the token starts at.
    pub column: u32,
    /// Whether whitespace, a comment, or a line continuation preceded this
    /// token on the same logical line. The parser uses this to tell
    /// `node -1` (an argument) from `node-1` (part of an identifier).
    pub preceded_by_whitespace: bool,
}

impl<'a> Token<'a> {
    /// The token's text with its delimiters stripped: quotes for quoted
    /// strings, `#`s and quotes for raw strings, nothing for anything else.
    pub fn string_content(&self) -> &'a str {
        match self.kind {
            TokenKind::QuotedString { multiline: true } => &self.text[3..self.text.len() - 3],
            TokenKind::QuotedString { multiline: false } => &self.text[1..self.text.len() - 1],
            TokenKind::RawString { multiline, hashes } => {
                let open = hashes as usize + if multiline { 3 } else { 1 };
                &self.text[open..self.text.len() - open]
            }
            _ => self.text,
        }
    }

    /// Absolute `(start, end)` byte offsets of [`Token::string_content`]
    /// within the original source.
    pub fn content_range(&self) -> (usize, usize) {
        let open = match self.kind {
            TokenKind::QuotedString { multiline: true } => 3,
            TokenKind::QuotedString { multiline: false } => 1,
            TokenKind::RawString { multiline, hashes } => hashes as usize + if multiline { 3 } else { 1 },
            _ => 0,
        };
        let content_len = self.string_content().len();
        (self.start + open, self.start + open + content_len)
    }
}

/// A streaming tokenizer over a complete, in-memory KDL document.
pub struct Scanner<'a> {
    source: &'a str,
    pos: usize,
    line: u32,
    column: u32,
    first_token: bool,
}

impl<'a> Scanner<'a> {
    /// Build a scanner over `source`, which must be the entire document
    /// (the tokenizer never signals "need more input").
    pub fn new(source: &'a str) -> Self {
        Scanner {
            source,
            pos: 0,
            line: 1,
            column: 1,
            first_token: true,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self, c: char) {
        self.pos += c.len_utf8();
        if is_newline(c) {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }

    /// Skip a leading UTF-8 BOM, but only as the very first codepoint of
    /// the very first token scan.
    fn skip_bom(&mut self) {
        if self.first_token && self.rest().starts_with('\u{FEFF}') {
            self.pos += '\u{FEFF}'.len_utf8();
        }
    }

    /// Skip unicode-space runs, `//` line comments (up to but excluding the
    /// terminating newline), nested `/* */` block comments, and
    /// backslash line continuations. Returns whether anything was skipped.
    fn skip_insignificant(&mut self) -> Result<bool, ErrorKind> {
        let mut skipped_any = false;
        loop {
            match self.peek_char() {
                Some(c) if is_whitespace(c) => {
                    self.bump(c);
                    skipped_any = true;
                }
                Some('/') if self.rest().starts_with("//") => {
                    self.bump('/');
                    self.bump('/');
                    while let Some(c) = self.peek_char() {
                        if is_newline(c) {
                            break;
                        }
                        self.bump(c);
                    }
                    skipped_any = true;
                }
                Some('/') if self.rest().starts_with("/*") => {
                    self.skip_block_comment()?;
                    skipped_any = true;
                }
                Some('\\') => {
                    let mark = self.pos;
                    let mark_line = self.line;
                    let mark_col = self.column;
                    self.bump('\\');
                    while let Some(c) = self.peek_char() {
                        if is_whitespace(c) {
                            self.bump(c);
                        } else {
                            break;
                        }
                    }
                    match self.peek_char() {
                        Some(c) if is_newline(c) => {
                            self.bump(c);
                            if c == '\u{D}' && self.peek_char() == Some('\u{A}') {
                                self.bump('\u{A}');
                            }
                        }
                        None => {}
                        Some('/') if self.rest().starts_with("//") => {
                            while let Some(c) = self.peek_char() {
                                if is_newline(c) {
                                    self.bump(c);
                                    break;
                                }
                                self.bump(c);
                            }
                        }
                        _ => {
                            self.pos = mark;
                            self.line = mark_line;
                            self.column = mark_col;
                            return Err(ErrorKind::UnexpectedToken {
                                got: "\\".to_string(),
                                expected: "line continuation followed by a newline, comment, or end of input",
                            });
                        }
                    }
                    skipped_any = true;
                }
                _ => break,
            }
        }
        Ok(skipped_any)
    }

    fn skip_block_comment(&mut self) -> Result<(), ErrorKind> {
        self.bump('/');
        self.bump('*');
        let mut depth = 1u32;
        loop {
            match self.peek_char() {
                None => {
                    return Err(ErrorKind::UnexpectedEof {
                        expected: "end of block comment `*/`",
                    })
                }
                Some('*') if self.rest().starts_with("*/") => {
                    self.bump('*');
                    self.bump('/');
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some('/') if self.rest().starts_with("/*") => {
                    self.bump('/');
                    self.bump('*');
                    depth += 1;
                }
                Some(c) => self.bump(c),
            }
        }
    }

    /// Scan the next token, attaching the scanner's current position to any
    /// error.
    pub fn next(&mut self) -> Result<Token<'a>, crate::error::Error> {
        let token = self
            .next_inner()
            .map_err(|kind| crate::error::Error::new(kind, self.line, self.column))?;
        log::trace!("token {:?} {:?} at {}:{}", token.kind, token.text, token.line, token.column);
        Ok(token)
    }

    fn next_inner(&mut self) -> Result<Token<'a>, ErrorKind> {
        self.skip_bom();
        let preceded_by_whitespace = self.skip_insignificant()?;
        self.first_token = false;

        let start = self.pos;
        let line = self.line;
        let column = self.column;

        let kind = match self.peek_char() {
            None => TokenKind::Eof,
            Some('(') => {
                self.bump('(');
                TokenKind::LParen
            }
            Some(')') => {
                self.bump(')');
                TokenKind::RParen
            }
            Some('{') => {
                self.bump('{');
                TokenKind::LBrace
            }
            Some('}') => {
                self.bump('}');
                TokenKind::RBrace
            }
            Some('=') => {
                self.bump('=');
                TokenKind::Equals
            }
            Some(';') => {
                self.bump(';');
                TokenKind::Semicolon
            }
            Some(c) if is_newline(c) => {
                self.bump(c);
                if c == '\u{D}' && self.peek_char() == Some('\u{A}') {
                    self.bump('\u{A}');
                }
                TokenKind::Newline
            }
            Some('/') if self.rest().starts_with("/-") => {
                self.bump('/');
                self.bump('-');
                TokenKind::Slashdash
            }
            Some('"') => self.scan_quoted_string()?,
            Some('#') if self.rest()[1..].starts_with('"') || self.rest()[1..].starts_with('#') => {
                self.scan_raw_string()?
            }
            Some('#') => self.scan_keyword()?,
            Some(c) if c.is_ascii_digit() => self.scan_number()?,
            Some(c) if crate::unicode::is_sign(c) && self.starts_like_number() => self.scan_number()?,
            Some(c) if is_identifier_start(c) || crate::unicode::is_sign(c) => self.scan_identifier()?,
            Some(c) if is_disallowed(c) => {
                return Err(ErrorKind::UnexpectedToken {
                    got: format!("U+{:04X}", c as u32),
                    expected: "a valid KDL token",
                })
            }
            Some(c) => {
                return Err(ErrorKind::UnexpectedToken {
                    got: c.to_string(),
                    expected: "a valid KDL token",
                })
            }
        };

        Ok(Token {
            kind,
            text: &self.source[start..self.pos],
            start,
            line,
            column,
            preceded_by_whitespace,
        })
    }

    /// Whether the sign at the current position begins a number rather than
    /// a signed identifier like `-foo` or the lone identifier `-`.
    fn starts_like_number(&self) -> bool {
        let after_sign = &self.rest()[1..];
        after_sign
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    }

    fn scan_identifier(&mut self) -> Result<TokenKind, ErrorKind> {
        let start = self.pos;
        let first = self.peek_char().unwrap();
        self.bump(first);
        while let Some(c) = self.peek_char() {
            if is_identifier_char(c) {
                self.bump(c);
            } else {
                break;
            }
        }
        let text = &self.source[start..self.pos];
        if text == "true" || text == "false" || text == "null" {
            return Err(ErrorKind::UnexpectedToken {
                got: text.to_string(),
                expected: "a `#`-prefixed keyword (`#true`, `#false`, `#null`)",
            });
        }
        if looks_like_bare_number(text) {
            return Err(ErrorKind::InvalidNumber {
                text: text.to_string(),
                reason: "bare identifier may not look like a number",
            });
        }
        Ok(TokenKind::Identifier)
    }

    fn scan_number(&mut self) -> Result<TokenKind, ErrorKind> {
        let start = self.pos;
        if let Some(c) = self.peek_char() {
            if crate::unicode::is_sign(c) {
                self.bump(c);
            }
        }
        if self.rest().starts_with("0x") || self.rest().starts_with("0X") {
            self.bump('0');
            self.bump(if self.peek_char() == Some('X') { 'X' } else { 'x' });
            self.scan_radix_digits(|c| c.is_ascii_hexdigit());
        } else if self.rest().starts_with("0o") || self.rest().starts_with("0O") {
            self.bump('0');
            self.bump(if self.peek_char() == Some('O') { 'O' } else { 'o' });
            self.scan_radix_digits(|c| ('0'..='7').contains(&c));
        } else if self.rest().starts_with("0b") || self.rest().starts_with("0B") {
            self.bump('0');
            self.bump(if self.peek_char() == Some('B') { 'B' } else { 'b' });
            self.scan_radix_digits(|c| c == '0' || c == '1');
        } else {
            self.scan_radix_digits(|c| c.is_ascii_digit());
            if self.peek_char() == Some('.') {
                let after_dot = &self.rest()[1..];
                if after_dot.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump('.');
                    self.scan_radix_digits(|c| c.is_ascii_digit());
                }
            }
            if matches!(self.peek_char(), Some('e') | Some('E')) {
                let mark = self.pos;
                let mark_line = self.line;
                let mark_col = self.column;
                let e = self.peek_char().unwrap();
                self.bump(e);
                if let Some(c) = self.peek_char() {
                    if crate::unicode::is_sign(c) {
                        self.bump(c);
                    }
                }
                if self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    self.scan_radix_digits(|c| c.is_ascii_digit());
                } else {
                    self.pos = mark;
                    self.line = mark_line;
                    self.column = mark_col;
                }
            }
        }
        // An identifier character directly after the digit run means this
        // wasn't a well-formed number token at all, e.g. `1a` or `0xFFg`.
        if self.peek_char().is_some_and(is_identifier_char) {
            while self.peek_char().is_some_and(is_identifier_char) {
                let c = self.peek_char().unwrap();
                self.bump(c);
            }
            return Err(ErrorKind::InvalidNumber {
                text: self.source[start..self.pos].to_string(),
                reason: "trailing characters after numeric literal",
            });
        }
        Ok(TokenKind::Number)
    }

    fn scan_radix_digits(&mut self, is_digit: impl Fn(char) -> bool) {
        loop {
            match self.peek_char() {
                Some(c) if is_digit(c) => self.bump(c),
                Some('_') => self.bump('_'),
                _ => break,
            }
        }
    }

    fn scan_keyword(&mut self) -> Result<TokenKind, ErrorKind> {
        let start = self.pos;
        self.bump('#');
        while let Some(c) = self.peek_char() {
            if is_identifier_char(c) || crate::unicode::is_sign(c) {
                self.bump(c);
            } else {
                break;
            }
        }
        let text = &self.source[start..self.pos];
        match text {
            "#true" => Ok(TokenKind::True),
            "#false" => Ok(TokenKind::False),
            "#null" => Ok(TokenKind::Null),
            "#inf" => Ok(TokenKind::Inf),
            "#-inf" => Ok(TokenKind::NegInf),
            "#nan" => Ok(TokenKind::Nan),
            _ => Err(ErrorKind::UnexpectedToken {
                got: text.to_string(),
                expected: "`#true`, `#false`, `#null`, `#inf`, `#-inf`, or `#nan`",
            }),
        }
    }

    fn scan_quoted_string(&mut self) -> Result<TokenKind, ErrorKind> {
        let multiline = self.rest().starts_with("\"\"\"");
        if multiline {
            self.bump('"');
            self.bump('"');
            self.bump('"');
        } else {
            self.bump('"');
        }

        let close = if multiline { "\"\"\"" } else { "\"" };
        loop {
            match self.peek_char() {
                None => {
                    return Err(ErrorKind::UnexpectedEof {
                        expected: "closing `\"` of string literal",
                    })
                }
                Some('\\') => {
                    self.bump('\\');
                    match self.peek_char() {
                        Some(c) => self.bump(c),
                        None => {
                            return Err(ErrorKind::UnexpectedEof {
                                expected: "character following `\\` escape",
                            })
                        }
                    }
                }
                Some('"') if self.rest().starts_with(close) => {
                    for c in close.chars() {
                        self.bump(c);
                    }
                    break;
                }
                Some(c) if !multiline && is_newline(c) => {
                    return Err(ErrorKind::InvalidString {
                        reason: "newline not allowed in single-line string",
                    })
                }
                Some(c) => self.bump(c),
            }
        }
        Ok(TokenKind::QuotedString { multiline })
    }

    fn scan_raw_string(&mut self) -> Result<TokenKind, ErrorKind> {
        let mut hashes = 0u8;
        while self.peek_char() == Some('#') {
            self.bump('#');
            hashes += 1;
        }
        if self.peek_char() != Some('"') {
            return Err(ErrorKind::UnexpectedToken {
                got: "#".to_string(),
                expected: "`\"` to open a raw string after `#`",
            });
        }
        let multiline = self.rest().starts_with("\"\"\"");
        if multiline {
            self.bump('"');
            self.bump('"');
            self.bump('"');
        } else {
            self.bump('"');
        }

        let closing_quotes = if multiline { "\"\"\"" } else { "\"" };
        loop {
            match self.peek_char() {
                None => {
                    return Err(ErrorKind::UnexpectedEof {
                        expected: "closing raw string delimiter",
                    })
                }
                Some('"') if self.rest().starts_with(closing_quotes) => {
                    let mark = self.pos;
                    let mark_line = self.line;
                    let mark_col = self.column;
                    for c in closing_quotes.chars() {
                        self.bump(c);
                    }
                    let trailing_hashes = self.rest().chars().take_while(|&c| c == '#').count();
                    if trailing_hashes >= hashes as usize {
                        for _ in 0..hashes {
                            self.bump('#');
                        }
                        break;
                    }
                    self.pos = mark;
                    self.line = mark_line;
                    self.column = mark_col;
                    self.bump('"');
                }
                Some(c) if !multiline && is_newline(c) => {
                    return Err(ErrorKind::InvalidString {
                        reason: "newline not allowed in single-line raw string",
                    })
                }
                Some(c) => self.bump(c),
            }
        }
        Ok(TokenKind::RawString { multiline, hashes })
    }
}

/// Whether `text` (already rejected as a keyword) nonetheless looks enough
/// like a number that it cannot be a bare identifier (`0n`, `.5`, and so on)
/// per the bare-keyword/number-lookalike rejection rule.
fn looks_like_bare_number(text: &str) -> bool {
    let rest = text.strip_prefix(['+', '-']).unwrap_or(text);
    rest.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut s = Scanner::new(src);
        let mut out = Vec::new();
        loop {
            let t = s.next().unwrap();
            let done = t.kind == TokenKind::Eof;
            out.push(t.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn punctuation_and_identifier() {
        let kinds = kinds("node 1");
        assert_eq!(
            kinds,
            vec![TokenKind::Identifier, TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn keyword_tokens() {
        assert_eq!(
            kinds("#true #false #null #inf #-inf #nan"),
            vec![
                TokenKind::True,
                TokenKind::False,
                TokenKind::Null,
                TokenKind::Inf,
                TokenKind::NegInf,
                TokenKind::Nan,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn bare_true_false_null_rejected() {
        let mut s = Scanner::new("true");
        assert!(s.next().is_err());
    }

    #[test]
    fn line_comment_is_skipped() {
        let mut s = Scanner::new("node // trailing\n");
        let t1 = s.next().unwrap();
        assert_eq!(t1.kind, TokenKind::Identifier);
        let t2 = s.next().unwrap();
        assert_eq!(t2.kind, TokenKind::Newline);
    }

    #[test]
    fn nested_block_comment() {
        let mut s = Scanner::new("/* outer /* inner */ still */node");
        let t = s.next().unwrap();
        assert_eq!(t.kind, TokenKind::Identifier);
        assert!(t.preceded_by_whitespace);
    }

    #[test]
    fn slashdash_token() {
        assert_eq!(kinds("/-node"), vec![TokenKind::Slashdash, TokenKind::Identifier, TokenKind::Eof]);
    }

    #[test]
    fn quoted_string_with_escape() {
        let mut s = Scanner::new(r#""a\"b""#);
        let t = s.next().unwrap();
        assert_eq!(t.kind, TokenKind::QuotedString { multiline: false });
        assert_eq!(t.string_content(), r#"a\"b"#);
    }

    #[test]
    fn raw_string_with_hashes() {
        let mut s = Scanner::new(r###"#"a"b"#"###);
        let t = s.next().unwrap();
        assert_eq!(t.kind, TokenKind::RawString { multiline: false, hashes: 1 });
        assert_eq!(t.string_content(), r#"a"b"#);
    }

    #[test]
    fn multiline_quoted_string() {
        let src = "\"\"\"\n  hi\n  \"\"\"";
        let mut s = Scanner::new(src);
        let t = s.next().unwrap();
        assert_eq!(t.kind, TokenKind::QuotedString { multiline: true });
        assert_eq!(t.string_content(), "\n  hi\n  ");
    }

    #[test]
    fn hex_number() {
        assert_eq!(kinds("0xFF"), vec![TokenKind::Number, TokenKind::Eof]);
    }

    #[test]
    fn signed_identifier_vs_signed_number() {
        assert_eq!(kinds("-foo"), vec![TokenKind::Identifier, TokenKind::Eof]);
        assert_eq!(kinds("-1"), vec![TokenKind::Number, TokenKind::Eof]);
    }

    #[test]
    fn dot_number_lookalike_rejected() {
        let mut s = Scanner::new(".5");
        assert!(s.next().is_err());
    }

    #[test]
    fn crlf_counts_as_one_newline_token() {
        assert_eq!(
            kinds("a\r\nb"),
            vec![TokenKind::Identifier, TokenKind::Newline, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn bom_skipped_only_at_start() {
        let src = "\u{FEFF}node";
        let mut s = Scanner::new(src);
        let t = s.next().unwrap();
        assert_eq!(t.kind, TokenKind::Identifier);
        assert_eq!(t.text, "node");
    }
}
