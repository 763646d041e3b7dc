//! The structure-of-arrays document IR (§3): a forest of nodes addressed by
//! [`NodeHandle`], with arguments, properties, and strings held in flat
//! columns rather than owned pointers. A whole document is freed in one
//! step, and [`crate::partition`] can merge several of these built from
//! independent byte ranges.

use crate::string_pool::{StringPool, StringRef};
use crate::value::{NodeHandle, Property, Range, TypedValue};

/// One node's worth of parallel-column data, returned by [`Document::node`]
/// for convenient read access without naming every column.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    /// The node's handle.
    pub handle: NodeHandle,
    /// Bare or quoted node name.
    pub name: StringRef,
    /// `(name)` preceding the node name, or [`StringRef::EMPTY`].
    pub type_annotation: StringRef,
    /// Parent handle, or `None` for a root node.
    pub parent: Option<NodeHandle>,
    /// First child, or `None` for a childless node.
    pub first_child: Option<NodeHandle>,
    /// Next sibling in the parent's (or the document's root) child chain.
    pub next_sibling: Option<NodeHandle>,
    /// Run of [`TypedValue`] arguments, indexing [`Document::arguments`].
    pub arg_range: Range,
    /// Run of [`Property`] entries, indexing [`Document::properties`].
    pub prop_range: Range,
    _marker: core::marker::PhantomData<&'a ()>,
}

/// A parsed KDL document: a forest of nodes plus the flat argument,
/// property, and string-pool columns they index into.
///
/// `Document` never borrows from the source buffer itself. Any
/// [`StringRef`] it hands back may be owned (resolvable from
/// [`Document::string_pool`] alone) or borrowed (resolvable only by also
/// passing the original source bytes to [`crate::string_pool::resolve`]);
/// see [`Document::resolve`].
#[derive(Debug, Default)]
pub struct Document {
    names: Vec<StringRef>,
    type_annotations: Vec<StringRef>,
    parents: Vec<Option<NodeHandle>>,
    first_child: Vec<Option<NodeHandle>>,
    next_sibling: Vec<Option<NodeHandle>>,
    last_child: Vec<Option<NodeHandle>>,
    arg_ranges: Vec<Range>,
    prop_ranges: Vec<Range>,

    /// Root nodes, in document order.
    roots: Vec<NodeHandle>,
    last_root: Option<NodeHandle>,

    /// Flat argument and property storage, sliced into by each node's
    /// `arg_range`/`prop_range`.
    pub arguments: Vec<TypedValue>,
    pub properties: Vec<Property>,

    /// Owned string storage backing every non-borrowed [`StringRef`] this
    /// document hands out.
    pub string_pool: StringPool,
}

impl Document {
    /// An empty document with no nodes.
    pub fn new() -> Self {
        Document::default()
    }

    /// Number of nodes in the document (of any depth).
    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Append a new, childless node and return its handle. The caller links
    /// it into the forest afterwards with [`Document::link_child`] or
    /// [`Document::push_root`].
    pub fn add_node(
        &mut self,
        name: StringRef,
        type_annotation: StringRef,
        arg_range: Range,
        prop_range: Range,
    ) -> NodeHandle {
        let handle = NodeHandle(self.names.len() as u32);
        self.names.push(name);
        self.type_annotations.push(type_annotation);
        self.parents.push(None);
        self.first_child.push(None);
        self.next_sibling.push(None);
        self.last_child.push(None);
        self.arg_ranges.push(arg_range);
        self.prop_ranges.push(prop_range);
        handle
    }

    /// Append `child` to the document's root list (no parent).
    pub fn push_root(&mut self, child: NodeHandle) {
        if let Some(last) = self.last_root {
            self.next_sibling[last.index()] = Some(child);
        }
        self.roots.push(child);
        self.last_root = Some(child);
    }

    /// Link `child` as the next child of `parent`, appending to its sibling
    /// chain. `O(1)` via the `last_child` column rather than walking the
    /// chain on every insertion.
    pub fn link_child(&mut self, parent: NodeHandle, child: NodeHandle) {
        self.parents[child.index()] = Some(parent);
        match self.last_child[parent.index()] {
            Some(last) => self.next_sibling[last.index()] = Some(child),
            None => self.first_child[parent.index()] = Some(child),
        }
        self.last_child[parent.index()] = Some(child);
    }

    /// Read-only view of one node's columns.
    pub fn node(&self, handle: NodeHandle) -> NodeView<'_> {
        let i = handle.index();
        NodeView {
            handle,
            name: self.names[i],
            type_annotation: self.type_annotations[i],
            parent: self.parents[i],
            first_child: self.first_child[i],
            next_sibling: self.next_sibling[i],
            arg_range: self.arg_ranges[i],
            prop_range: self.prop_ranges[i],
            _marker: core::marker::PhantomData,
        }
    }

    /// The document's top-level nodes, in order.
    pub fn roots(&self) -> &[NodeHandle] {
        &self.roots
    }

    /// Iterate `handle`'s direct children, in order.
    pub fn children(&self, handle: NodeHandle) -> ChildIter<'_> {
        ChildIter {
            doc: self,
            next: self.first_child[handle.index()],
        }
    }

    /// Arguments belonging to `handle`, in declaration order.
    pub fn args(&self, handle: NodeHandle) -> &[TypedValue] {
        let r = self.arg_ranges[handle.index()];
        &self.arguments[r.start as usize..r.end() as usize]
    }

    /// Properties belonging to `handle`. Later entries with the same name
    /// win; see [`crate::parser`] for where duplicates are resolved.
    pub fn props(&self, handle: NodeHandle) -> &[Property] {
        let r = self.prop_ranges[handle.index()];
        &self.properties[r.start as usize..r.end() as usize]
    }

    /// Resolve a [`StringRef`] to its bytes. `source` must be the original
    /// buffer the document was parsed from when `r` is borrowed; pass
    /// `&[]` (or anything) for refs known to be owned, e.g. ones the
    /// document itself produced via [`Document::intern`].
    pub fn resolve<'a>(&'a self, r: StringRef, source: &'a [u8]) -> &'a [u8] {
        crate::string_pool::resolve(r, &self.string_pool, source)
    }

    /// Intern `bytes` into this document's owned pool.
    pub fn intern(&mut self, bytes: &[u8]) -> Option<StringRef> {
        self.string_pool.add(bytes)
    }

    /// Patch a node's argument/property ranges after creation. Used by the
    /// tree parser, which must create a node's handle before parsing its
    /// children (so they can link to it as their parent) but only learns
    /// its argument and property ranges once the whole header is parsed.
    pub(crate) fn set_ranges(&mut self, handle: NodeHandle, arg_range: Range, prop_range: Range) {
        self.arg_ranges[handle.index()] = arg_range;
        self.prop_ranges[handle.index()] = prop_range;
    }

    /// Append `count` arguments starting now, returning their range.
    pub(crate) fn reserve_args(&mut self, values: Vec<TypedValue>) -> Range {
        let start = self.arguments.len() as u64;
        let count = values.len() as u64;
        self.arguments.extend(values);
        Range { start, count }
    }

    /// Append `count` properties starting now, returning their range.
    pub(crate) fn reserve_props(&mut self, values: Vec<Property>) -> Range {
        let start = self.properties.len() as u64;
        let count = values.len() as u64;
        self.properties.extend(values);
        Range { start, count }
    }
}

/// Iterator over a node's direct children, in document order.
pub struct ChildIter<'a> {
    doc: &'a Document,
    next: Option<NodeHandle>,
}

impl<'a> Iterator for ChildIter<'a> {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<NodeHandle> {
        let current = self.next?;
        self.next = self.doc.next_sibling[current.index()];
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn single_root_node_has_no_parent() {
        let mut doc = Document::new();
        let name = doc.intern(b"node").unwrap();
        let h = doc.add_node(name, StringRef::EMPTY, Range::EMPTY, Range::EMPTY);
        doc.push_root(h);
        assert_eq!(doc.roots(), &[h]);
        assert_eq!(doc.node(h).parent, None);
    }

    #[test]
    fn children_iterate_in_order() {
        let mut doc = Document::new();
        let parent_name = doc.intern(b"parent").unwrap();
        let parent = doc.add_node(parent_name, StringRef::EMPTY, Range::EMPTY, Range::EMPTY);
        doc.push_root(parent);

        let mut children = Vec::new();
        for label in [b"a".as_slice(), b"b", b"c"] {
            let name = doc.intern(label).unwrap();
            let child = doc.add_node(name, StringRef::EMPTY, Range::EMPTY, Range::EMPTY);
            doc.link_child(parent, child);
            children.push(child);
        }

        let collected: Vec<_> = doc.children(parent).collect();
        assert_eq!(collected, children);
    }

    #[test]
    fn multiple_roots_chain_through_next_sibling() {
        let mut doc = Document::new();
        let mut roots = Vec::new();
        for label in [b"x".as_slice(), b"y"] {
            let name = doc.intern(label).unwrap();
            let h = doc.add_node(name, StringRef::EMPTY, Range::EMPTY, Range::EMPTY);
            doc.push_root(h);
            roots.push(h);
        }
        assert_eq!(doc.roots(), &roots[..]);
        assert_eq!(doc.node(roots[0]).next_sibling, Some(roots[1]));
    }

    #[test]
    fn args_and_props_slice_their_ranges() {
        let mut doc = Document::new();
        let arg_range = doc.reserve_args(vec![TypedValue::plain(Value::Integer(1))]);
        let prop_name = doc.intern(b"k").unwrap();
        let prop_range = doc.reserve_props(vec![Property {
            name: prop_name,
            value: Value::Boolean(true),
            type_annotation: StringRef::EMPTY,
        }]);
        let name = doc.intern(b"n").unwrap();
        let h = doc.add_node(name, StringRef::EMPTY, arg_range, prop_range);
        doc.push_root(h);

        assert_eq!(doc.args(h).len(), 1);
        assert_eq!(doc.props(h).len(), 1);
        assert_eq!(doc.resolve(doc.props(h)[0].name, b""), b"k");
    }
}
