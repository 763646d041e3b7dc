#![forbid(unsafe_code)]

//! A tokenizer, tree-building parser, event-based pull parser,
//! structure-of-arrays document IR, and canonical serializer for the KDL
//! 2.0.0 document language (<https://kdl.dev/>).
//!
//! ```
//! let doc = kaddle::parse("greeting \"hello world\"\n").unwrap();
//! let root = doc.roots()[0];
//! assert_eq!(doc.resolve(doc.node(root).name, b""), b"greeting");
//! ```

mod document;
mod error;
mod event;
mod number;
mod options;
mod parser;
mod partition;
mod scanner;
mod serializer;
mod string_pool;
mod unicode;
mod value;
mod value_builder;

pub use document::{ChildIter, Document, NodeView};
pub use error::{Error, ErrorKind, Result};
pub use event::Event;
pub use options::{ParseOptions, SerializeOptions};
pub use partition::{find_node_boundaries, merge_documents};
pub use string_pool::StringRef;
pub use value::{NodeHandle, Property, Range, TypedValue, Value};

/// The event-based pull parser (§4.7/§6). Exported under this name to match
/// the `Parser::new(source)` external interface; the type itself lives in
/// [`event`] as `EventParser`.
pub use event::EventParser as Parser;

/// Parse a complete KDL document from `source` with default
/// [`ParseOptions`].
pub fn parse(source: &str) -> Result<Document> {
    parse_with_options(source, ParseOptions::default())
}

/// Parse a complete KDL document from `source` with explicit `options`.
pub fn parse_with_options(source: &str, options: ParseOptions) -> Result<Document> {
    parser::parse(source, options)
}

/// Error produced by [`parse_reader`] and [`read_to_string`]: either the
/// byte source itself failed, or the bytes it produced did not parse as
/// KDL.
#[derive(Debug)]
pub enum ReaderError {
    /// The underlying reader failed, produced more bytes than
    /// `options.max_document_size` allows, or produced bytes that were not
    /// valid UTF-8.
    Io(std::io::Error),
    /// The bytes were read successfully but did not parse as KDL.
    Parse(Error),
}

impl std::fmt::Display for ReaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReaderError::Io(e) => write!(f, "{e}"),
            ReaderError::Parse(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ReaderError {}

impl From<Error> for ReaderError {
    fn from(e: Error) -> Self {
        ReaderError::Parse(e)
    }
}

/// Read `reader` to completion into a `String`, enforcing
/// `options.max_document_size` as a hard cap and rejecting non-UTF-8 bytes.
/// `options.buffer_size` only sizes this function's own copy loop (how many
/// bytes are pulled from `reader` per [`std::io::Read::read`] call); the
/// resulting `String` holds the *entire* document, and the tokenizer then
/// scans that complete in-memory buffer. There is currently no byte-level
/// resumable scan state that would let `buffer_size` bound memory use
/// during tokenization itself (see `DESIGN.md`'s "Disclosed scope cuts"
/// section). This function is the shared front door for both
/// [`parse_reader`] and the event API's reader path — since [`Parser`]
/// (the event parser) borrows its source for the whole of its lifetime,
/// it has no `from_reader` constructor of its own; read into a `String`
/// here first, then build the parser over a reference to it:
///
/// ```
/// # use std::io::Cursor;
/// let text = kaddle::read_to_string(Cursor::new(b"node 1\n".to_vec()), &kaddle::ParseOptions::default()).unwrap();
/// let mut events = kaddle::Parser::new(&text, kaddle::ParseOptions::default());
/// assert!(events.next_event().unwrap().is_some());
/// ```
pub fn read_to_string<R: std::io::Read>(
    mut reader: R,
    options: &ParseOptions,
) -> std::result::Result<String, ReaderError> {
    let mut buf = Vec::with_capacity(options.buffer_size);
    let mut chunk = vec![0u8; options.buffer_size];
    loop {
        let n = reader.read(&mut chunk).map_err(ReaderError::Io)?;
        if n == 0 {
            break;
        }
        if buf.len() as u64 + n as u64 > options.max_document_size {
            return Err(ReaderError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "document exceeds configured max_document_size",
            )));
        }
        buf.extend_from_slice(&chunk[..n]);
        log::trace!("read chunk of {} bytes, {} buffered", n, buf.len());
    }
    log::debug!("read {} bytes from reader", buf.len());
    String::from_utf8(buf)
        .map_err(|e| ReaderError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Parse a complete KDL document from a streaming byte source, per the
/// materialize-then-tokenize strategy documented on [`read_to_string`].
pub fn parse_reader<R: std::io::Read>(
    reader: R,
    options: ParseOptions,
) -> std::result::Result<Document, ReaderError> {
    let text = read_to_string(reader, &options)?;
    parse_with_options(&text, options).map_err(ReaderError::from)
}

/// Serialize `doc` as KDL text to `writer`.
///
/// `source` must be the buffer `doc` was parsed from if it was parsed with
/// [`ParseOptions::copy_strings`] set to `false`; pass `&[]` for documents
/// known to be fully owned (the default).
pub fn serialize<W: std::io::Write>(
    doc: &Document,
    source: &[u8],
    writer: &mut W,
    options: &SerializeOptions,
) -> std::io::Result<()> {
    serializer::serialize(doc, source, writer, options)
}

/// Serialize `doc` as KDL text, returning the bytes directly.
pub fn serialize_to_string(doc: &Document, source: &[u8], options: &SerializeOptions) -> Vec<u8> {
    serializer::serialize_to_string(doc, source, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_then_serialize_roundtrips() {
        let doc = parse("node 1 key=2 {\n    child\n}\n").unwrap();
        let out = serialize_to_string(&doc, b"", &SerializeOptions::default());
        let reparsed = parse(std::str::from_utf8(&out).unwrap()).unwrap();
        assert_eq!(reparsed.roots().len(), doc.roots().len());
    }

    #[test]
    fn parse_reader_reads_a_cursor() {
        let doc = parse_reader(std::io::Cursor::new(b"node 1\n".to_vec()), ParseOptions::default())
            .unwrap();
        assert_eq!(doc.roots().len(), 1);
    }

    #[test]
    fn parse_reader_rejects_oversized_input() {
        let opts = ParseOptions::default().with_max_document_size(4);
        let result = parse_reader(std::io::Cursor::new(b"node 1\n".to_vec()), opts);
        assert!(matches!(result, Err(ReaderError::Io(_))));
    }

    #[test]
    fn event_parser_is_reachable_as_parser() {
        let mut events = Parser::new("node\n", ParseOptions::default());
        assert!(events.next_event().unwrap().is_some());
    }

    #[test]
    fn find_node_boundaries_and_merge_documents_are_reachable() {
        let boundaries = find_node_boundaries("a\nb\n", 2);
        assert_eq!(boundaries[0], 0);
        let a = parse("a 1\n").unwrap();
        let b = parse("b 2\n").unwrap();
        let merged = merge_documents(vec![a, b]);
        assert_eq!(merged.roots().len(), 2);
    }
}
