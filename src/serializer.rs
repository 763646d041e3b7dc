//! Canonical KDL formatting of a [`Document`] back to text (§4.10): the
//! bare-vs-quoted identifier decision, type annotations, argument/property
//! layout, children blocks, and float round-trip formatting.
//!
//! Structurally this walks the document's forest directly rather than
//! driving an external struct/seq visitor, since a `Document` is already
//! fully materialized and there is no value graph to push context frames
//! for. What remains is the indent-tracking and escaped-string-writing
//! idiom common to this style of writer: a running `depth` counter, a
//! `write_indent` helper, and a dedicated string-escaping routine reused
//! for every quoted run of text.

use std::collections::HashMap;
use std::io;

use crate::document::Document;
use crate::options::SerializeOptions;
use crate::string_pool::StringRef;
use crate::unicode::{decode_utf8, is_identifier_char, is_identifier_start};
use crate::value::{NodeHandle, Property, TypedValue, Value};

/// Serialize `doc` as KDL text and write it to `writer`.
///
/// `source` must be the buffer `doc` was parsed from if it holds any
/// borrowed [`StringRef`]s (i.e. it was parsed with
/// [`crate::options::ParseOptions::copy_strings`] set to `false`); pass
/// `&[]` for documents known to be fully owned.
pub fn serialize<W: io::Write>(
    doc: &Document,
    source: &[u8],
    writer: &mut W,
    options: &SerializeOptions,
) -> io::Result<()> {
    writer.write_all(&serialize_to_string(doc, source, options))
}

/// Serialize `doc` as KDL text, returning the bytes directly.
pub fn serialize_to_string(doc: &Document, source: &[u8], options: &SerializeOptions) -> Vec<u8> {
    let mut s = Serializer {
        doc,
        source,
        options,
        out: Vec::new(),
        depth: 0,
    };
    for &root in doc.roots() {
        s.write_node(root);
    }
    s.out
}

struct Serializer<'a> {
    doc: &'a Document,
    source: &'a [u8],
    options: &'a SerializeOptions,
    out: Vec<u8>,
    depth: usize,
}

impl<'a> Serializer<'a> {
    fn write_indent(&mut self) {
        for _ in 0..self.depth {
            self.out.extend_from_slice(self.options.indent.as_bytes());
        }
    }

    fn write_node(&mut self, handle: NodeHandle) {
        self.write_indent();
        let view = self.doc.node(handle);
        self.write_type_annotation(view.type_annotation);
        self.write_identifier(view.name);

        for arg in self.doc.args(handle) {
            self.out.push(b' ');
            self.write_typed_value(arg);
        }
        for prop in effective_properties(self.doc, self.source, handle) {
            self.out.push(b' ');
            self.write_identifier(prop.name);
            self.out.push(b'=');
            self.write_type_annotation(prop.type_annotation);
            self.write_value(&prop.value);
        }

        let mut children = self.doc.children(handle).peekable();
        if children.peek().is_some() {
            self.out.extend_from_slice(b" {\n");
            self.depth += 1;
            for child in children {
                self.write_node(child);
            }
            self.depth -= 1;
            self.write_indent();
            self.out.push(b'}');
        }
        self.out.push(b'\n');
    }

    fn write_typed_value(&mut self, tv: &TypedValue) {
        self.write_type_annotation(tv.type_annotation);
        self.write_value(&tv.value);
    }

    fn write_type_annotation(&mut self, r: StringRef) {
        if r.is_empty() {
            return;
        }
        self.out.push(b'(');
        self.write_identifier(r);
        self.out.push(b')');
    }

    fn write_identifier(&mut self, r: StringRef) {
        let bytes = self.doc.resolve(r, self.source);
        if is_bare_identifier(bytes) {
            self.out.extend_from_slice(bytes);
        } else {
            self.write_quoted(bytes);
        }
    }

    fn write_value(&mut self, value: &Value) {
        match value {
            Value::String(r) => self.write_identifier(*r),
            Value::Integer(v) => {
                let mut buf = itoa::Buffer::new();
                self.out.extend_from_slice(buf.format(*v).as_bytes());
            }
            Value::Float { value, original } => self.write_float(*value, *original),
            Value::Boolean(true) => self.out.extend_from_slice(b"#true"),
            Value::Boolean(false) => self.out.extend_from_slice(b"#false"),
            Value::Null => self.out.extend_from_slice(b"#null"),
            Value::PositiveInf => self.out.extend_from_slice(b"#inf"),
            Value::NegativeInf => self.out.extend_from_slice(b"#-inf"),
            Value::Nan => self.out.extend_from_slice(b"#nan"),
        }
    }

    fn write_float(&mut self, value: f64, original: StringRef) {
        if !original.is_empty() {
            let text = self.doc.resolve(original, self.source).to_vec();
            self.out.extend_from_slice(&normalize_float_literal(&text));
            return;
        }
        if value.is_nan() {
            self.out.extend_from_slice(b"#nan");
        } else if value == f64::INFINITY {
            self.out.extend_from_slice(b"#inf");
        } else if value == f64::NEG_INFINITY {
            self.out.extend_from_slice(b"#-inf");
        } else {
            let abs = value.abs();
            if abs >= 1e10 || (abs > 0.0 && abs < 1e-4) {
                self.out.extend_from_slice(format_scientific(value).as_bytes());
            } else {
                let mut buf = ryu::Buffer::new();
                let s = buf.format(value);
                self.out.extend_from_slice(s.as_bytes());
                if !s.contains('.') {
                    self.out.extend_from_slice(b".0");
                }
            }
        }
    }

    fn write_quoted(&mut self, bytes: &[u8]) {
        self.out.push(b'"');
        let mut rest = bytes;
        while let Some((c, len)) = decode_utf8(rest) {
            self.write_escaped_char(c);
            rest = &rest[len..];
        }
        self.out.push(b'"');
    }

    fn write_escaped_char(&mut self, c: char) {
        match c {
            '\n' => self.out.extend_from_slice(b"\\n"),
            '\r' => self.out.extend_from_slice(b"\\r"),
            '\t' => self.out.extend_from_slice(b"\\t"),
            '\\' => self.out.extend_from_slice(b"\\\\"),
            '"' => self.out.extend_from_slice(b"\\\""),
            '\u{08}' => self.out.extend_from_slice(b"\\b"),
            '\u{0C}' => self.out.extend_from_slice(b"\\f"),
            c if (c as u32) < 0x20 => {
                self.out.extend_from_slice(format!("\\u{{{:x}}}", c as u32).as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                let encoded = c.encode_utf8(&mut buf);
                self.out.extend_from_slice(encoded.as_bytes());
            }
        }
    }
}

/// Resolve `handle`'s properties with duplicates collapsed rightmost-wins,
/// preserving the position of each name's first appearance (§4.10, §8
/// scenario 10).
fn effective_properties(doc: &Document, source: &[u8], handle: NodeHandle) -> Vec<Property> {
    let mut order: Vec<Property> = Vec::new();
    let mut index_of: HashMap<Vec<u8>, usize> = HashMap::new();
    for p in doc.props(handle) {
        let key = doc.resolve(p.name, source).to_vec();
        match index_of.get(&key) {
            Some(&i) => order[i] = p.clone(),
            None => {
                index_of.insert(key, order.len());
                order.push(p.clone());
            }
        }
    }
    order
}

/// Whether `bytes` can be written as a bare identifier: a valid identifier
/// under the KDL grammar that doesn't read as a number.
fn is_bare_identifier(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    let mut rest = bytes;
    let mut first = true;
    loop {
        let Some((c, len)) = decode_utf8(rest) else {
            return false;
        };
        let ok = if first { is_identifier_start(c) } else { is_identifier_char(c) };
        if !ok {
            return false;
        }
        first = false;
        rest = &rest[len..];
        if rest.is_empty() {
            break;
        }
    }
    !looks_numeric(bytes)
}

/// A leading digit, or a leading sign followed by a digit — the shape that
/// would make an otherwise-valid identifier ambiguous with a number.
fn looks_numeric(bytes: &[u8]) -> bool {
    match bytes.first() {
        Some(b) if b.is_ascii_digit() => true,
        Some(b'+') | Some(b'-') => bytes.get(1).is_some_and(u8::is_ascii_digit),
        _ => false,
    }
}

/// Strip underscores, uppercase the exponent marker, and insert an explicit
/// `+` after a non-negative exponent — the normalization applied to any
/// float whose original literal text was retained for round-trip fidelity.
fn normalize_float_literal(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 1);
    let mut i = 0;
    while i < text.len() {
        match text[i] {
            b'_' => i += 1,
            b'e' | b'E' => {
                out.push(b'E');
                i += 1;
                match text.get(i) {
                    Some(b'+') | Some(b'-') => {
                        out.push(text[i]);
                        i += 1;
                    }
                    _ => out.push(b'+'),
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

/// Render `value` in `mantissaEexponent` form with an explicit `+` on a
/// non-negative exponent, used for magnitudes outside the plain-decimal
/// range (§4.10).
fn format_scientific(value: f64) -> String {
    let formatted = format!("{:e}", value);
    let (mantissa, exp) = formatted
        .split_once('e')
        .expect("LowerExp output always contains 'e'");
    let exp_num: i32 = exp.parse().expect("LowerExp exponent is a plain integer");
    if exp_num >= 0 {
        format!("{mantissa}E+{exp_num}")
    } else {
        format!("{mantissa}E{exp_num}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ParseOptions;
    use crate::parser::parse;

    fn roundtrip(src: &str) -> String {
        let doc = parse(src, ParseOptions::default()).unwrap();
        String::from_utf8(serialize_to_string(&doc, b"", &SerializeOptions::default())).unwrap()
    }

    #[test]
    fn bare_node_with_integer_argument() {
        assert_eq!(roundtrip("node 42\n"), "node 42\n");
    }

    #[test]
    fn property_roundtrips_bare() {
        assert_eq!(roundtrip("node key=42\n"), "node key=42\n");
    }

    #[test]
    fn quoted_name_needing_escaping() {
        let out = roundtrip("\"quoted name\" 1\n");
        assert_eq!(out, "\"quoted name\" 1\n");
    }

    #[test]
    fn children_block_indented_with_default_four_spaces() {
        let out = roundtrip("parent {\n    child1\n    child2\n}\n");
        assert_eq!(out, "parent {\n    child1\n    child2\n}\n");
    }

    #[test]
    fn keyword_arguments_roundtrip_in_order() {
        let out = roundtrip("node #true #false #null #inf #-inf #nan\n");
        assert_eq!(out, "node #true #false #null #inf #-inf #nan\n");
    }

    #[test]
    fn type_annotations_on_node_and_argument() {
        let out = roundtrip("(mytype)node (int)42\n");
        assert_eq!(out, "(mytype)node (int)42\n");
    }

    #[test]
    fn duplicate_properties_collapse_to_rightmost() {
        let doc = parse("node zebra=1 apple=2 mango=3 zebra=9\n", ParseOptions::default()).unwrap();
        let out = String::from_utf8(serialize_to_string(&doc, b"", &SerializeOptions::default())).unwrap();
        assert_eq!(out, "node zebra=9 apple=2 mango=3\n");
    }

    #[test]
    fn float_with_exponent_is_normalized() {
        let out = roundtrip("node 1_2.5e+10\n");
        assert_eq!(out, "node 12.5E+10\n");
    }

    #[test]
    fn large_float_without_original_uses_scientific_notation() {
        let doc = parse("node 1\n", ParseOptions::default()).unwrap();
        // directly exercise the formatter on a value with no retained
        // original text, bypassing the parser's own exponent detection.
        let mut s = Serializer {
            doc: &doc,
            source: b"",
            options: &SerializeOptions::default(),
            out: Vec::new(),
            depth: 0,
        };
        s.write_float(2.5e12, StringRef::EMPTY);
        assert_eq!(String::from_utf8(s.out).unwrap(), "2.5E+12");
    }

    #[test]
    fn small_decimal_gets_trailing_dot_zero() {
        let doc = parse("node 1\n", ParseOptions::default()).unwrap();
        let mut s = Serializer {
            doc: &doc,
            source: b"",
            options: &SerializeOptions::default(),
            out: Vec::new(),
            depth: 0,
        };
        s.write_float(5.0, StringRef::EMPTY);
        assert_eq!(String::from_utf8(s.out).unwrap(), "5.0");
    }

    #[test]
    fn custom_indent_is_honored() {
        let doc = parse("parent {\n    child\n}\n", ParseOptions::default()).unwrap();
        let opts = SerializeOptions::default().with_indent("\t");
        let out = String::from_utf8(serialize_to_string(&doc, b"", &opts)).unwrap();
        assert_eq!(out, "parent {\n\tchild\n}\n");
    }
}
