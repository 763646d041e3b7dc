//! The tree-building parser: drives a [`Scanner`] token stream into a
//! [`Document`], handling node headers, entries, children blocks, and
//! slashdash discarding. [`crate::event`] drives the identical grammar but
//! surfaces each construct as an [`crate::event::Event`] instead of
//! building the IR directly.

use crate::document::Document;
use crate::error::{Error, ErrorKind, Result};
use crate::number::{parse_number, ParsedNumber};
use crate::options::ParseOptions;
use crate::scanner::{Scanner, Token, TokenKind};
use crate::string_pool::StringRef;
use crate::value::{NodeHandle, Property, TypedValue, Value};
use crate::value_builder::{self, Decoded};

/// Parse a complete KDL document from `source` with `options`.
pub fn parse(source: &str, options: ParseOptions) -> Result<Document> {
    Parser::new(source, options).parse_document()
}

/// Drives a [`Scanner`] into a [`Document`].
pub struct Parser<'a> {
    source: &'a str,
    scanner: Scanner<'a>,
    peeked: Option<Token<'a>>,
    doc: Document,
    depth: u32,
    options: ParseOptions,
}

impl<'a> Parser<'a> {
    /// Build a parser over `source`.
    pub fn new(source: &'a str, options: ParseOptions) -> Self {
        Parser {
            source,
            scanner: Scanner::new(source),
            peeked: None,
            doc: Document::new(),
            depth: 0,
            options,
        }
    }

    /// Parse the whole document, consuming the parser.
    pub fn parse_document(mut self) -> Result<Document> {
        log::debug!("parsing document of {} bytes", self.source.len());
        self.parse_nodes(None, true)?;
        let eof = self.advance()?;
        if eof.kind != TokenKind::Eof {
            return Err(self.err_at(&eof, ErrorKind::UnexpectedToken {
                got: eof.text.to_string(),
                expected: "end of input",
            }));
        }
        log::debug!("document parsed: {} nodes", self.doc.node_count());
        Ok(self.doc)
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

    /// Parse a run of top-level or children-block nodes, separated by
    /// newlines and/or semicolons, until `}` or EOF. `emit` is `false`
    /// inside a slashdashed node or children block: grammar is still fully
    /// validated, but nothing is added to the document.
    fn parse_nodes(&mut self, parent: Option<NodeHandle>, emit: bool) -> Result<()> {
        loop {
            match self.peek()?.kind {
                TokenKind::Newline | TokenKind::Semicolon => {
                    self.advance()?;
                }
                TokenKind::Eof | TokenKind::RBrace => return Ok(()),
                TokenKind::Slashdash => {
                    self.advance()?;
                    log::trace!("discarding slashdashed node under {:?}", parent);
                    self.parse_one_node(parent, false)?;
                }
                _ => {
                    self.parse_one_node(parent, emit)?;
                }
            }
        }
    }

    /// Parse a single node header, entries, and optional children block,
    /// linking it under `parent` (or as a document root) when `emit`.
    fn parse_one_node(&mut self, parent: Option<NodeHandle>, emit: bool) -> Result<()> {
        let type_annotation = self.try_parse_type_annotation(emit)?;
        let name_token = self.advance()?;
        let name = match name_token.kind {
            TokenKind::Identifier | TokenKind::QuotedString { .. } | TokenKind::RawString { .. } => {
                self.decode_string_like(name_token, emit)?
            }
            _ => {
                return Err(self.err_at(&name_token, ErrorKind::UnexpectedToken {
                    got: name_token.text.to_string(),
                    expected: "a node name",
                }))
            }
        };

        // The node's handle is created now, with placeholder ranges, so
        // that a children block parsed below can link to it as their
        // parent. `doc.set_ranges` patches in the real argument/property
        // ranges once the whole header has been parsed.
        let handle = if emit {
            let h = self.doc.add_node(name, type_annotation, crate::value::Range::EMPTY, crate::value::Range::EMPTY);
            match parent {
                Some(p) => self.doc.link_child(p, h),
                None => self.doc.push_root(h),
            }
            log::debug!("added node {:?} under {:?}", h, parent);
            Some(h)
        } else {
            None
        };

        let mut args = Vec::new();
        let mut props: Vec<Property> = Vec::new();
        let mut has_children = false;

        loop {
            let t = self.peek()?;
            match t.kind {
                TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof | TokenKind::RBrace => break,
                TokenKind::LBrace => {
                    self.parse_children_block(handle, emit)?;
                    has_children = true;
                    break;
                }
                TokenKind::Slashdash => {
                    self.advance()?;
                    let after = self.peek()?;
                    if after.kind == TokenKind::LBrace {
                        log::trace!("discarding slashdashed children block of {:?}", handle);
                        self.parse_children_block(handle, false)?;
                        has_children = true;
                        break;
                    }
                    log::trace!("discarding slashdashed entry of {:?}", handle);
                    self.parse_one_entry(false)?;
                }
                _ => {
                    if !t.preceded_by_whitespace {
                        return Err(self.err_at(&t, ErrorKind::UnexpectedToken {
                            got: t.text.to_string(),
                            expected: "whitespace before the next entry",
                        }));
                    }
                    if let Some(entry) = self.parse_one_entry(emit)? {
                        match entry {
                            Entry::Argument(v) => args.push(v),
                            Entry::Property(p) => {
                                if let Some(existing) = props.iter_mut().find(|e| e.name == p.name) {
                                    if self.options.strict_duplicate_properties {
                                        return Err(self.err_at(&t, ErrorKind::DuplicateProperty {
                                            name: String::from_utf8_lossy(
                                                self.doc.resolve(p.name, self.source.as_bytes()),
                                            )
                                            .into_owned(),
                                        }));
                                    }
                                    *existing = p;
                                } else {
                                    props.push(p);
                                }
                            }
                        }
                    }
                }
            }
        }

        let _ = has_children;

        if let Some(handle) = handle {
            let arg_range = self.doc.reserve_args(args);
            let prop_range = self.doc.reserve_props(props);
            self.doc.set_ranges(handle, arg_range, prop_range);
        }

        if self.peek()?.kind == TokenKind::Semicolon {
            self.advance()?;
        }
        Ok(())
    }

    fn parse_children_block(&mut self, parent_handle: Option<NodeHandle>, emit: bool) -> Result<()> {
        let open = self.advance()?;
        debug_assert_eq!(open.kind, TokenKind::LBrace);
        self.depth += 1;
        if self.depth > self.options.max_depth {
            return Err(self.err_at(&open, ErrorKind::NestingTooDeep { limit: self.options.max_depth }));
        }
        self.parse_nodes(parent_handle, emit)?;
        let close = self.advance()?;
        self.depth -= 1;
        if close.kind != TokenKind::RBrace {
            return Err(self.err_at(&close, ErrorKind::UnexpectedToken {
                got: close.text.to_string(),
                expected: "`}`",
            }));
        }
        Ok(())
    }

    fn try_parse_type_annotation(&mut self, emit: bool) -> Result<StringRef> {
        if self.peek()?.kind != TokenKind::LParen {
            return Ok(StringRef::EMPTY);
        }
        self.advance()?;
        let name_token = self.advance()?;
        let name = match name_token.kind {
            TokenKind::Identifier | TokenKind::QuotedString { .. } | TokenKind::RawString { .. } => {
                self.decode_string_like(name_token, emit)?
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

    /// Parse one node entry: either `prop=value` or a bare `value`,
    /// optionally type-annotated. Returns `None` when `emit` is `false`.
    fn parse_one_entry(&mut self, emit: bool) -> Result<Option<Entry>> {
        // A property is `identifier-or-string '=' ...` with the `=`
        // immediately adjacent (no node-space) to the name.
        let t = self.peek()?;
        let is_name_like = matches!(
            t.kind,
            TokenKind::Identifier | TokenKind::QuotedString { .. } | TokenKind::RawString { .. }
        );
        if is_name_like {
            // We need two-token lookahead to distinguish `key=value` from a
            // bare string value; peek() only buffers one token, so consume
            // the name and speculatively check what follows.
            let name_token = self.advance()?;
            let eq = self.peek()?;
            if eq.kind == TokenKind::Equals && !eq.preceded_by_whitespace {
                self.advance()?;
                let name = self.decode_string_like(name_token, emit)?;
                let value_token = self.advance()?;
                if value_token.preceded_by_whitespace {
                    return Err(self.err_at(&value_token, ErrorKind::UnexpectedToken {
                        got: value_token.text.to_string(),
                        expected: "a value immediately after `=`",
                    }));
                }
                let type_annotation = if value_token.kind == TokenKind::LParen {
                    self.peeked = Some(value_token);
                    self.try_parse_type_annotation(emit)?
                } else {
                    self.peeked = Some(value_token);
                    StringRef::EMPTY
                };
                let value_token = self.advance()?;
                if type_annotation != StringRef::EMPTY && value_token.preceded_by_whitespace {
                    return Err(self.err_at(&value_token, ErrorKind::UnexpectedToken {
                        got: value_token.text.to_string(),
                        expected: "a value immediately after its type annotation",
                    }));
                }
                let value = self.parse_value_token(value_token, emit)?;
                if !emit {
                    return Ok(None);
                }
                return Ok(Some(Entry::Property(Property {
                    name,
                    value,
                    type_annotation,
                })));
            }
            // Not a property: this identifier/string is itself a value.
            let value = self.parse_value_token(name_token, emit)?;
            if !emit {
                return Ok(None);
            }
            return Ok(Some(Entry::Argument(TypedValue::plain(value))));
        }

        // A type-annotated or bare value.
        let type_annotation = self.try_parse_type_annotation(emit)?;
        let value_token = self.advance()?;
        if type_annotation != StringRef::EMPTY && value_token.preceded_by_whitespace {
            return Err(self.err_at(&value_token, ErrorKind::UnexpectedToken {
                got: value_token.text.to_string(),
                expected: "a value immediately after its type annotation",
            }));
        }
        let value = self.parse_value_token(value_token, emit)?;
        if !emit {
            return Ok(None);
        }
        Ok(Some(Entry::Argument(TypedValue { value, type_annotation })))
    }

    fn parse_value_token(&mut self, token: Token<'a>, emit: bool) -> Result<Value> {
        match token.kind {
            TokenKind::True => Ok(Value::Boolean(true)),
            TokenKind::False => Ok(Value::Boolean(false)),
            TokenKind::Null => Ok(Value::Null),
            TokenKind::Inf => Ok(Value::PositiveInf),
            TokenKind::NegInf => Ok(Value::NegativeInf),
            TokenKind::Nan => Ok(Value::Nan),
            TokenKind::Number => {
                let parsed = parse_number(token.text).map_err(|e| {
                    self.err_at(&token, ErrorKind::InvalidNumber {
                        text: token.text.to_string(),
                        reason: number_error_reason(e),
                    })
                })?;
                match parsed {
                    ParsedNumber::Integer(v) => Ok(Value::Integer(v)),
                    ParsedNumber::Float { value, keep_original } => {
                        let original = if keep_original && emit {
                            self.intern_verbatim(token.start, token.text)?
                        } else {
                            StringRef::EMPTY
                        };
                        Ok(Value::Float { value, original })
                    }
                }
            }
            TokenKind::Identifier
            | TokenKind::QuotedString { .. }
            | TokenKind::RawString { .. } => {
                Ok(Value::String(self.decode_string_like(token, emit)?))
            }
            _ => Err(self.err_at(&token, ErrorKind::UnexpectedToken {
                got: token.text.to_string(),
                expected: "a value",
            })),
        }
    }

    fn decode_string_like(&mut self, token: Token<'a>, emit: bool) -> Result<StringRef> {
        if !emit {
            return Ok(StringRef::EMPTY);
        }
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
        self.doc
            .intern(text.as_bytes())
            .ok_or_else(|| Error::without_span(ErrorKind::OutOfMemory { what: "string pool" }))
    }

    fn intern_owned(&mut self, s: String) -> Result<StringRef> {
        self.doc
            .intern(s.as_bytes())
            .ok_or_else(|| Error::without_span(ErrorKind::OutOfMemory { what: "string pool" }))
    }

    fn intern_decoded(&mut self, decoded: Decoded<'a>, range: (usize, usize)) -> Result<StringRef> {
        match decoded {
            Decoded::Borrowed(s) => self.intern_verbatim(range.0, s),
            Decoded::Owned(s) => self.intern_owned(s),
        }
    }
}

enum Entry {
    Argument(TypedValue),
    Property(Property),
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

    fn parse_str(src: &str) -> Document {
        parse(src, ParseOptions::default()).unwrap()
    }

    fn name_of(doc: &Document, h: NodeHandle, src: &[u8]) -> String {
        String::from_utf8(doc.resolve(doc.node(h).name, src).to_vec()).unwrap()
    }

    #[test]
    fn single_bare_node() {
        let doc = parse_str("node\n");
        assert_eq!(doc.roots().len(), 1);
        assert_eq!(name_of(&doc, doc.roots()[0], b""), "node");
    }

    #[test]
    fn node_with_args_and_props() {
        let doc = parse_str("node 1 2 key=3\n");
        let h = doc.roots()[0];
        assert_eq!(doc.args(h).len(), 2);
        assert_eq!(doc.props(h).len(), 1);
    }

    #[test]
    fn nested_children() {
        let doc = parse_str("parent {\n  child\n}\n");
        let parent = doc.roots()[0];
        let children: Vec<_> = doc.children(parent).collect();
        assert_eq!(children.len(), 1);
        assert_eq!(name_of(&doc, children[0], b""), "child");
    }

    #[test]
    fn slashdashed_node_is_discarded() {
        let doc = parse_str("/-node\nkept\n");
        assert_eq!(doc.roots().len(), 1);
        assert_eq!(name_of(&doc, doc.roots()[0], b""), "kept");
    }

    #[test]
    fn slashdashed_argument_is_discarded() {
        let doc = parse_str("node /-1 2\n");
        let h = doc.roots()[0];
        assert_eq!(doc.args(h).len(), 1);
    }

    #[test]
    fn duplicate_property_rightmost_wins() {
        let doc = parse_str("node a=1 a=2\n");
        let h = doc.roots()[0];
        assert_eq!(doc.props(h).len(), 1);
        match doc.props(h)[0].value {
            Value::Integer(2) => {}
            _ => panic!("expected rightmost value to win"),
        }
    }

    #[test]
    fn duplicate_property_strict_mode_errors() {
        let opts = ParseOptions::default().with_strict_duplicate_properties(true);
        let result = Parser::new("node a=1 a=2\n", opts).parse_document();
        assert!(result.is_err());
    }

    #[test]
    fn type_annotated_node_and_value() {
        let doc = parse_str("(kind)node (u8)1\n");
        let h = doc.roots()[0];
        assert_eq!(doc.resolve(doc.node(h).type_annotation, b""), b"kind");
        assert_eq!(doc.resolve(doc.args(h)[0].type_annotation, b""), b"u8");
    }

    #[test]
    fn depth_limit_is_enforced() {
        let opts = ParseOptions::default().with_max_depth(1);
        let src = "a {\n  b {\n    c\n  }\n}\n";
        assert!(Parser::new(src, opts).parse_document().is_err());
    }

    #[test]
    fn missing_whitespace_between_entries_is_rejected() {
        let mut p = Parser::new("node 1\"x\"\n", ParseOptions::default());
        assert!(p.parse_document().is_err());
    }
}
