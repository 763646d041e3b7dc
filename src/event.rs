//! The event-based pull parser: drives the same [`Scanner`] token stream
//! as [`crate::parser`] but surfaces each grammar construct as an
//! [`Event`] instead of building a [`crate::document::Document`]. Useful
//! for callers that want to project a document into their own structure
//! without paying for the SoA IR.
//!
//! `EndNode` is emitted exactly once per node, at whichever comes later:
//! the node's own header terminator (`;`/newline) when it has no children
//! block, or the closing `}` of its children block when it does.

use crate::error::{Error, ErrorKind, Result};
use crate::options::ParseOptions;
use crate::scanner::{Scanner, Token, TokenKind};
use crate::string_pool::{StringPool, StringRef};
use crate::value::{Property, TypedValue, Value};
use crate::value_builder::{self, Decoded};

/// One unit of a KDL document's grammar, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A node's header has started: its type annotation (if any) and name
    /// are known, but its arguments, properties, and children are not yet.
    StartNode {
        /// `(name)` preceding the node name, or [`StringRef::EMPTY`].
        type_annotation: StringRef,
        /// The node's name.
        name: StringRef,
    },
    /// A positional argument on the currently open node.
    Argument(TypedValue),
    /// A `key=value` property on the currently open node.
    Property(Property),
    /// The currently open node (the most recent unmatched [`Event::StartNode`])
    /// is finished, including any children it had.
    EndNode,
}

/// Pulls [`Event`]s from a KDL source one at a time.
pub struct EventParser<'a> {
    source: &'a str,
    scanner: Scanner<'a>,
    peeked: Option<Token<'a>>,
    options: ParseOptions,
    depth: u32,
    /// One entry per node currently open with a children block, so a
    /// closing `}` knows it must emit exactly one [`Event::EndNode`].
    open_with_children: Vec<()>,
    /// Whether the node most recently started is still having its
    /// arguments/properties/children-or-terminator read.
    in_entries: bool,
    /// Owned storage for strings that needed escape processing; borrowed
    /// strings resolve directly against `source` instead.
    pool: StringPool,
}

impl<'a> EventParser<'a> {
    /// Build a pull parser over `source`.
    pub fn new(source: &'a str, options: ParseOptions) -> Self {
        EventParser {
            source,
            scanner: Scanner::new(source),
            peeked: None,
            options,
            depth: 0,
            open_with_children: Vec::new(),
            in_entries: false,
            pool: StringPool::new(),
        }
    }

    /// Resolve an [`Event`]'s [`StringRef`] to its bytes.
    pub fn resolve(&self, r: StringRef) -> &[u8] {
        crate::string_pool::resolve(r, &self.pool, self.source.as_bytes())
    }

    fn peek(&mut self) -> Result<Token<'a>> {
        if self.peeked.is_none() {
            self.peeked = Some(self.scanner.next()?);
        }
        Ok(self.peeked.unwrap())
    }

    fn advance(&mut self) -> Result<Token<'a>> {
        match self.peeked.take() {
            Some(t) => Ok(t),
            None => self.scanner.next(),
        }
    }

    fn err_at(&self, token: &Token<'a>, kind: ErrorKind) -> Error {
        Error::new(kind, token.line, token.column)
    }

    /// Pull the next event, or `None` at the end of the document.
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        loop {
            if self.in_entries {
                if let Some(event) = self.step_entries()? {
                    return Ok(Some(event));
                }
                continue;
            }
            if let Some(event) = self.step_boundary()? {
                return Ok(Some(event));
            }
            if self.peek()?.kind == TokenKind::Eof && self.open_with_children.is_empty() {
                return Ok(None);
            }
        }
    }

    /// Advance while scanning for the next node, a scope-closing `}`, or
    /// EOF. Returns `Some(EndNode)` when a `}` closes a children scope,
    /// `Some(StartNode)` when a new node header is read, or `None` to keep
    /// looping (separators consumed, or a slashdashed construct discarded).
    fn step_boundary(&mut self) -> Result<Option<Event>> {
        let t = self.peek()?;
        match t.kind {
            TokenKind::Newline | TokenKind::Semicolon => {
                self.advance()?;
                Ok(None)
            }
            TokenKind::RBrace => {
                self.advance()?;
                self.depth -= 1;
                if self.open_with_children.pop().is_none() {
                    return Err(self.err_at(&t, ErrorKind::UnexpectedToken {
                        got: t.text.to_string(),
                        expected: "a node, not a stray `}`",
                    }));
                }
                Ok(Some(Event::EndNode))
            }
            TokenKind::Eof => Ok(None),
            TokenKind::Slashdash => {
                self.advance()?;
                self.skip_slashdashed()?;
                Ok(None)
            }
            _ => self.start_node().map(Some),
        }
    }

    fn start_node(&mut self) -> Result<Event> {
        let type_annotation = self.try_parse_type_annotation()?;
        let name_token = self.advance()?;
        let name = match name_token.kind {
            TokenKind::Identifier | TokenKind::QuotedString { .. } | TokenKind::RawString { .. } => {
                self.decode_string_like(name_token)?
            }
            _ => {
                return Err(self.err_at(&name_token, ErrorKind::UnexpectedToken {
                    got: name_token.text.to_string(),
                    expected: "a node name",
                }))
            }
        };
        self.in_entries = true;
        Ok(Event::StartNode { type_annotation, name })
    }

    /// Advance while reading the currently open node's arguments,
    /// properties, a children block open, or its terminator.
    fn step_entries(&mut self) -> Result<Option<Event>> {
        let t = self.peek()?;
        match t.kind {
            TokenKind::Newline | TokenKind::Semicolon => {
                self.advance()?;
                self.in_entries = false;
                Ok(Some(Event::EndNode))
            }
            TokenKind::Eof | TokenKind::RBrace => {
                self.in_entries = false;
                Ok(Some(Event::EndNode))
            }
            TokenKind::LBrace => {
                self.advance()?;
                self.depth += 1;
                if self.depth > self.options.max_depth {
                    return Err(self.err_at(&t, ErrorKind::NestingTooDeep { limit: self.options.max_depth }));
                }
                self.open_with_children.push(());
                self.in_entries = false;
                Ok(None)
            }
            TokenKind::Slashdash => {
                self.advance()?;
                let after = self.peek()?;
                if after.kind == TokenKind::LBrace {
                    self.advance()?;
                    self.skip_children_block()?;
                    self.in_entries = false;
                    Ok(Some(Event::EndNode))
                } else {
                    self.skip_one_entry()?;
                    Ok(None)
                }
            }
            _ => {
                if !t.preceded_by_whitespace {
                    return Err(self.err_at(&t, ErrorKind::UnexpectedToken {
                        got: t.text.to_string(),
                        expected: "whitespace before the next entry",
                    }));
                }
                self.parse_one_entry().map(Some)
            }
        }
    }

    fn parse_one_entry(&mut self) -> Result<Event> {
        let t = self.peek()?;
        let is_name_like = matches!(
            t.kind,
            TokenKind::Identifier | TokenKind::QuotedString { .. } | TokenKind::RawString { .. }
        );
        if is_name_like {
            let name_token = self.advance()?;
            let eq = self.peek()?;
            if eq.kind == TokenKind::Equals && !eq.preceded_by_whitespace {
                self.advance()?;
                let name = self.decode_string_like(name_token)?;
                let value_token = self.advance()?;
                if value_token.preceded_by_whitespace {
                    return Err(self.err_at(&value_token, ErrorKind::UnexpectedToken {
                        got: value_token.text.to_string(),
                        expected: "a value immediately after `=`",
                    }));
                }
                let type_annotation = if value_token.kind == TokenKind::LParen {
                    self.peeked = Some(value_token);
                    self.try_parse_type_annotation()?
                } else {
                    self.peeked = Some(value_token);
                    StringRef::EMPTY
                };
                let value_token = self.advance()?;
                let value = self.parse_value_token(value_token)?;
                return Ok(Event::Property(Property { name, value, type_annotation }));
            }
            let value = self.parse_value_token(name_token)?;
            return Ok(Event::Argument(TypedValue::plain(value)));
        }
        let type_annotation = self.try_parse_type_annotation()?;
        let value_token = self.advance()?;
        let value = self.parse_value_token(value_token)?;
        Ok(Event::Argument(TypedValue { value, type_annotation }))
    }

    fn try_parse_type_annotation(&mut self) -> Result<StringRef> {
        if self.peek()?.kind != TokenKind::LParen {
            return Ok(StringRef::EMPTY);
        }
        self.advance()?;
        let name_token = self.advance()?;
        let name = match name_token.kind {
            TokenKind::Identifier | TokenKind::QuotedString { .. } | TokenKind::RawString { .. } => {
                self.decode_string_like(name_token)?
            }
            _ => {
                return Err(self.err_at(&name_token, ErrorKind::UnexpectedToken {
                    got: name_token.text.to_string(),
                    expected: "a type annotation name",
                }))
            }
        };
        let close = self.advance()?;
        if close.kind != TokenKind::RParen {
            return Err(self.err_at(&close, ErrorKind::UnexpectedToken {
                got: close.text.to_string(),
                expected: "`)`",
            }));
        }
        Ok(name)
    }

    fn parse_value_token(&mut self, token: Token<'a>) -> Result<Value> {
        match token.kind {
            TokenKind::True => Ok(Value::Boolean(true)),
            TokenKind::False => Ok(Value::Boolean(false)),
            TokenKind::Null => Ok(Value::Null),
            TokenKind::Inf => Ok(Value::PositiveInf),
            TokenKind::NegInf => Ok(Value::NegativeInf),
            TokenKind::Nan => Ok(Value::Nan),
            TokenKind::Number => {
                let parsed = crate::number::parse_number(token.text).map_err(|e| {
                    self.err_at(&token, ErrorKind::InvalidNumber {
                        text: token.text.to_string(),
                        reason: number_error_reason(e),
                    })
                })?;
                match parsed {
                    crate::number::ParsedNumber::Integer(v) => Ok(Value::Integer(v)),
                    crate::number::ParsedNumber::Float { value, keep_original } => {
                        let original = if keep_original {
                            self.intern_verbatim(token.start, token.text)?
                        } else {
                            StringRef::EMPTY
                        };
                        Ok(Value::Float { value, original })
                    }
                }
            }
            TokenKind::Identifier | TokenKind::QuotedString { .. } | TokenKind::RawString { .. } => {
                Ok(Value::String(self.decode_string_like(token)?))
            }
            _ => Err(self.err_at(&token, ErrorKind::UnexpectedToken {
                got: token.text.to_string(),
                expected: "a value",
            })),
        }
    }

    fn decode_string_like(&mut self, token: Token<'a>) -> Result<StringRef> {
        let kind_err = |reason: ErrorKind, t: &Token<'a>| Error::new(reason, t.line, t.column);
        match token.kind {
            TokenKind::Identifier => self.intern_verbatim(token.start, token.text),
            TokenKind::QuotedString { multiline: false } => {
                let content = token.string_content();
                let decoded = value_builder::decode_single_line_quoted(content)
                    .map_err(|e| kind_err(e, &token))?;
                self.intern_decoded(decoded, token.content_range())
            }
            TokenKind::QuotedString { multiline: true } => {
                let content = token.string_content();
                let s = value_builder::decode_multiline_escaped(content)
                    .map_err(|e| kind_err(e, &token))?;
                self.intern_owned(s)
            }
            TokenKind::RawString { multiline: false, .. } => {
                let content = token.string_content();
                let s = value_builder::decode_raw_single_line(content)
                    .map_err(|e| kind_err(e, &token))?;
                self.intern_decoded(Decoded::Borrowed(s), token.content_range())
            }
            TokenKind::RawString { multiline: true, .. } => {
                let content = token.string_content();
                let s = value_builder::decode_raw_multiline(content)
                    .map_err(|e| kind_err(e, &token))?;
                self.intern_owned(s)
            }
            _ => unreachable!("decode_string_like called on non-string token"),
        }
    }

    fn intern_verbatim(&mut self, start: usize, text: &str) -> Result<StringRef> {
        if !self.options.copy_strings {
            return Ok(StringRef::borrowed(start as u64, text.len()));
        }
        self.pool
            .add(text.as_bytes())
            .ok_or_else(|| Error::without_span(ErrorKind::OutOfMemory { what: "string pool" }))
    }

    fn intern_owned(&mut self, s: String) -> Result<StringRef> {
        self.pool
            .add(s.as_bytes())
            .ok_or_else(|| Error::without_span(ErrorKind::OutOfMemory { what: "string pool" }))
    }

    fn intern_decoded(&mut self, decoded: Decoded<'a>, range: (usize, usize)) -> Result<StringRef> {
        match decoded {
            Decoded::Borrowed(s) => self.intern_verbatim(range.0, s),
            Decoded::Owned(s) => self.intern_owned(s),
        }
    }

    /// Discard one slashdashed construct: either a whole node (header,
    /// entries, and children block) or a single entry, without surfacing
    /// any events for it. Grammar is checked for balance (braces, string
    /// terminators already guaranteed by the scanner) but content is not
    /// semantically decoded, since nothing discarded is ever observed.
    fn skip_slashdashed(&mut self) -> Result<()> {
        let t = self.peek()?;
        if t.kind == TokenKind::LBrace {
            self.advance()?;
            self.skip_children_block()
        } else {
            self.skip_one_node()
        }
    }

    fn skip_one_node(&mut self) -> Result<()> {
        if self.peek()?.kind == TokenKind::LParen {
            self.skip_type_annotation()?;
        }
        let name = self.advance()?;
        if !matches!(
            name.kind,
            TokenKind::Identifier | TokenKind::QuotedString { .. } | TokenKind::RawString { .. }
        ) {
            return Err(self.err_at(&name, ErrorKind::UnexpectedToken {
                got: name.text.to_string(),
                expected: "a node name",
            }));
        }
        loop {
            match self.peek()?.kind {
                TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof | TokenKind::RBrace => break,
                TokenKind::LBrace => {
                    self.advance()?;
                    self.skip_children_block()?;
                    break;
                }
                TokenKind::Slashdash => {
                    self.advance()?;
                    self.skip_slashdashed()?;
                }
                _ => self.skip_one_entry()?,
            }
        }
        if self.peek()?.kind == TokenKind::Semicolon {
            self.advance()?;
        }
        Ok(())
    }

    fn skip_one_entry(&mut self) -> Result<()> {
        if self.peek()?.kind == TokenKind::LParen {
            self.skip_type_annotation()?;
        }
        let t = self.advance()?;
        if t.kind == TokenKind::Equals {
            // Shouldn't happen on a well-formed entry start; surface as an error.
            return Err(self.err_at(&t, ErrorKind::UnexpectedToken {
                got: t.text.to_string(),
                expected: "an entry",
            }));
        }
        if self.peek()?.kind == TokenKind::Equals {
            self.advance()?;
            if self.peek()?.kind == TokenKind::LParen {
                self.skip_type_annotation()?;
            }
            self.advance()?;
        }
        Ok(())
    }

    fn skip_type_annotation(&mut self) -> Result<()> {
        self.advance()?;
        self.advance()?;
        let close = self.advance()?;
        if close.kind != TokenKind::RParen {
            return Err(self.err_at(&close, ErrorKind::UnexpectedToken {
                got: close.text.to_string(),
                expected: "`)`",
            }));
        }
        Ok(())
    }

    fn skip_children_block(&mut self) -> Result<()> {
        let mut depth = 1u32;
        loop {
            let t = self.advance()?;
            match t.kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                TokenKind::Eof => {
                    return Err(self.err_at(&t, ErrorKind::UnexpectedEof {
                        expected: "closing `}` of children block",
                    }))
                }
                _ => {}
            }
        }
    }
}

fn number_error_reason(e: crate::number::NumberError) -> &'static str {
    use crate::number::NumberError::*;
    match e {
        LeadingUnderscore => "underscore not allowed here",
        EmptyDigits => "no digits in numeric literal",
        InvalidDigit => "digit out of range for its radix",
        IntegerOverflow => "magnitude does not fit in a 128-bit integer",
        InvalidFloat => "could not be parsed as a floating-point literal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(src: &str) -> Vec<Event> {
        let mut p = EventParser::new(src, ParseOptions::default());
        let mut out = Vec::new();
        while let Some(e) = p.next_event().unwrap() {
            out.push(e);
        }
        out
    }

    #[test]
    fn bare_node_start_and_end() {
        let events = collect("node\n");
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::StartNode { .. }));
        assert_eq!(events[1], Event::EndNode);
    }

    #[test]
    fn node_with_children_emits_end_after_closing_brace() {
        let src = "a {\n  b\n}\n";
        let mut p = EventParser::new(src, ParseOptions::default());
        let mut events = Vec::new();
        while let Some(e) = p.next_event().unwrap() {
            events.push(e);
        }
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], Event::StartNode { .. }));
        assert!(matches!(events[1], Event::StartNode { .. }));
        assert_eq!(events[2], Event::EndNode);
        assert_eq!(events[3], Event::EndNode);

        assert_eq!(p.resolve(events_name(&events, 0)), b"a");
        assert_eq!(p.resolve(events_name(&events, 1)), b"b");
    }

    fn events_name(events: &[Event], i: usize) -> StringRef {
        match events[i] {
            Event::StartNode { name, .. } => name,
            _ => panic!("expected StartNode"),
        }
    }

    #[test]
    fn arguments_and_properties_surface_between_start_and_end() {
        let events = collect("node 1 key=2\n");
        assert!(matches!(events[1], Event::Argument(_)));
        assert!(matches!(events[2], Event::Property(_)));
        assert_eq!(events[3], Event::EndNode);
    }

    #[test]
    fn slashdashed_node_produces_no_events() {
        let mut p = EventParser::new("/-node\nkept\n", ParseOptions::default());
        let mut events = Vec::new();
        while let Some(e) = p.next_event().unwrap() {
            events.push(e);
        }
        assert_eq!(events.len(), 2);
        assert_eq!(p.resolve(events_name(&events, 0)), b"kept");
    }

    #[test]
    fn stray_closing_brace_is_an_error() {
        let mut p = EventParser::new("}\n", ParseOptions::default());
        assert!(p.next_event().is_err());
    }

    #[test]
    fn depth_limit_enforced_during_pull() {
        let opts = ParseOptions::default().with_max_depth(1);
        let mut p = EventParser::new("a {\n  b {\n    c\n  }\n}\n", opts);
        let mut saw_error = false;
        loop {
            match p.next_event() {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => {
                    saw_error = true;
                    break;
                }
            }
        }
        assert!(saw_error);
    }
}
