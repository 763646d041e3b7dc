//! Splitting a document into independently parseable byte ranges and
//! merging the resulting [`Document`]s back into one (§7). This module
//! only provides the split/merge primitives; dispatching each range to a
//! worker (a thread pool, `rayon`, `std::thread::scope`, ...) is left to
//! the caller.
//!
//! Every sub-document handed to [`merge_documents`] must have been parsed
//! with [`crate::options::ParseOptions::copy_strings`] set, so that every
//! [`StringRef`] it holds is pool-owned rather than borrowed from that
//! range's own slice of the source. A borrowed ref is left untouched by
//! the merge (see [`shift_ref`]), which would silently point at the wrong
//! bytes once ranges are concatenated into one pool.

use crate::document::Document;
use crate::value::{NodeHandle, Property, Range, TypedValue, Value};
use crate::string_pool::StringRef;

/// Find byte offsets that split `source` into at most `max_partitions`
/// chunks, each ending on a top-level node boundary (never inside a
/// string, a children block, or a node header). Returns the chunk start
/// offsets, always beginning with `0`; the caller derives chunk `i`'s
/// range from `boundaries[i]..boundaries.get(i + 1).unwrap_or(source.len())`.
pub fn find_node_boundaries(source: &str, max_partitions: usize) -> Vec<usize> {
    if max_partitions <= 1 || source.is_empty() {
        return vec![0];
    }

    let candidates = top_level_boundaries(source);
    if candidates.is_empty() {
        return vec![0];
    }

    let target_chunk = source.len().div_ceil(max_partitions).max(1);
    let mut boundaries = vec![0usize];
    let mut next_target = target_chunk;
    for &pos in &candidates {
        if pos >= next_target && pos < source.len() {
            boundaries.push(pos);
            next_target = pos + target_chunk;
            if boundaries.len() >= max_partitions {
                break;
            }
        }
    }
    boundaries
}

/// Byte offsets, each immediately after a `Newline` or `Semicolon` token
/// scanned at top-level nesting depth zero — the only positions it is
/// safe to cut `source` at without splitting a node's own grammar.
fn top_level_boundaries(source: &str) -> Vec<usize> {
    let mut scanner = crate::scanner::Scanner::new(source);
    let mut depth: i64 = 0;
    let mut out = Vec::new();
    loop {
        let token = match scanner.next() {
            Ok(t) => t,
            Err(_) => return out, // malformed input: caller's full parse will report the real error
        };
        match token.kind {
            crate::scanner::TokenKind::LBrace => depth += 1,
            crate::scanner::TokenKind::RBrace => depth -= 1,
            crate::scanner::TokenKind::Newline | crate::scanner::TokenKind::Semicolon if depth == 0 => {
                out.push(token.start + token.text.len());
            }
            crate::scanner::TokenKind::Eof => return out,
            _ => {}
        }
    }
}

/// Concatenate `docs` into one [`Document`], in order, relocating every
/// node handle, argument/property range, and owned [`StringRef`] as it
/// goes. The result's roots are the concatenation of each input
/// document's roots, in order.
pub fn merge_documents(docs: Vec<Document>) -> Document {
    let mut merged = Document::new();
    let mut node_offset: u32 = 0;

    for doc in docs {
        let pool_delta = merged
            .string_pool
            .append_pool(&doc.string_pool)
            .expect("merged string pool exceeded its byte cap");
        let arg_base = merged.arguments.len() as u64;
        let prop_base = merged.properties.len() as u64;

        merged.arguments.extend(doc.arguments.iter().map(|tv| TypedValue {
            value: shift_value(&tv.value, pool_delta),
            type_annotation: shift_ref(tv.type_annotation, pool_delta),
        }));
        merged.properties.extend(doc.properties.iter().map(|p| Property {
            name: shift_ref(p.name, pool_delta),
            value: shift_value(&p.value, pool_delta),
            type_annotation: shift_ref(p.type_annotation, pool_delta),
        }));

        let count = doc.node_count();
        for i in 0..count {
            let handle = NodeHandle(i as u32);
            let view = doc.node(handle);
            let name = shift_ref(view.name, pool_delta);
            let type_annotation = shift_ref(view.type_annotation, pool_delta);
            let arg_range = Range {
                start: view.arg_range.start + arg_base,
                count: view.arg_range.count,
            };
            let prop_range = Range {
                start: view.prop_range.start + prop_base,
                count: view.prop_range.count,
            };
            let new_handle = merged.add_node(name, type_annotation, arg_range, prop_range);
            match view.parent {
                Some(parent) => {
                    merged.link_child(NodeHandle(parent.0 + node_offset), new_handle);
                }
                None => merged.push_root(new_handle),
            }
        }
        node_offset += count as u32;
    }

    merged
}

/// Shift an owned [`StringRef`] by `delta`, the byte offset its source
/// document's pool now starts at in the merged pool. Borrowed refs and the
/// empty sentinel are returned unchanged.
fn shift_ref(r: StringRef, delta: u64) -> StringRef {
    if r.is_empty() || r.is_borrowed() {
        r
    } else {
        r.shifted(delta)
    }
}

fn shift_value(value: &Value, delta: u64) -> Value {
    match value {
        Value::String(r) => Value::String(shift_ref(*r, delta)),
        Value::Float { value, original } => Value::Float {
            value: *value,
            original: shift_ref(*original, delta),
        },
        Value::Integer(v) => Value::Integer(*v),
        Value::Boolean(v) => Value::Boolean(*v),
        Value::Null => Value::Null,
        Value::PositiveInf => Value::PositiveInf,
        Value::NegativeInf => Value::NegativeInf,
        Value::Nan => Value::Nan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ParseOptions;

    #[test]
    fn boundaries_split_between_top_level_nodes_only() {
        let src = "a 1\nb {\n  c\n}\nd\n";
        let boundaries = find_node_boundaries(src, 4);
        for &b in &boundaries {
            assert!(b == 0 || src.as_bytes()[b - 1] == b'\n');
        }
    }

    #[test]
    fn single_partition_is_whole_document() {
        assert_eq!(find_node_boundaries("a\nb\n", 1), vec![0]);
    }

    #[test]
    fn merge_preserves_root_order_and_values() {
        let opts = ParseOptions::default().with_copy_strings(true);
        let doc_a = crate::parser::parse("first 1\n", opts.clone()).unwrap();
        let doc_b = crate::parser::parse("second 2\n", opts).unwrap();
        let merged = merge_documents(vec![doc_a, doc_b]);
        assert_eq!(merged.roots().len(), 2);
        let names: Vec<Vec<u8>> = merged
            .roots()
            .iter()
            .map(|&h| merged.resolve(merged.node(h).name, b"").to_vec())
            .collect();
        assert_eq!(names, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn merge_preserves_children() {
        let opts = ParseOptions::default();
        let doc = crate::parser::parse("a {\n  b\n  c\n}\n", opts.clone()).unwrap();
        let other = crate::parser::parse("d\n", opts).unwrap();
        let merged = merge_documents(vec![doc, other]);
        let a = merged.roots()[0];
        assert_eq!(merged.children(a).count(), 2);
        assert_eq!(merged.roots().len(), 2);
    }
}
