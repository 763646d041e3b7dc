//! Parse- and serialize-time configuration (§10.3).

/// Configuration for [`crate::parse_with_options`] and [`crate::Parser`].
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Maximum nesting depth of children blocks before
    /// [`crate::error::ErrorKind::NestingTooDeep`] is raised.
    pub max_depth: u32,
    /// Initial capacity of the reader-path input buffer, in bytes.
    pub buffer_size: usize,
    /// Whether every string is copied into the document's owned pool
    /// (`true`, the default) rather than borrowed from the source buffer
    /// where possible.
    pub copy_strings: bool,
    /// Hard cap, in bytes, on a document read via [`crate::parse_reader`].
    pub max_document_size: u64,
    /// Whether a duplicate property name on the same node is an error
    /// (`true`) or silently resolved rightmost-wins (`false`, the default).
    pub strict_duplicate_properties: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            max_depth: 256,
            buffer_size: 64 * 1024,
            copy_strings: true,
            max_document_size: 256 * 1024 * 1024,
            strict_duplicate_properties: false,
        }
    }
}

impl ParseOptions {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum children-block nesting depth.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the reader-path input buffer's initial capacity.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set whether strings are always copied into the document's pool.
    pub fn with_copy_strings(mut self, copy_strings: bool) -> Self {
        self.copy_strings = copy_strings;
        self
    }

    /// Set the hard cap on a reader-parsed document's size.
    pub fn with_max_document_size(mut self, max_document_size: u64) -> Self {
        self.max_document_size = max_document_size;
        self
    }

    /// Set whether duplicate property names on one node are a hard error.
    pub fn with_strict_duplicate_properties(mut self, strict: bool) -> Self {
        self.strict_duplicate_properties = strict;
        self
    }
}

/// Configuration for [`crate::serialize`] and [`crate::serialize_to_string`].
#[derive(Debug, Clone)]
pub struct SerializeOptions {
    /// The string inserted once per nesting level before each node.
    pub indent: String,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        SerializeOptions {
            indent: "    ".to_string(),
        }
    }
}

impl SerializeOptions {
    /// Start from the defaults (four-space indent).
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `indent` instead of the default four spaces.
    pub fn with_indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = ParseOptions::default();
        assert_eq!(opts.max_depth, 256);
        assert_eq!(opts.buffer_size, 64 * 1024);
        assert_eq!(opts.max_document_size, 256 * 1024 * 1024);
        assert!(opts.copy_strings);
        assert!(!opts.strict_duplicate_properties);
    }

    #[test]
    fn builder_methods_chain() {
        let opts = ParseOptions::new().with_max_depth(8).with_copy_strings(false);
        assert_eq!(opts.max_depth, 8);
        assert!(!opts.copy_strings);
    }

    #[test]
    fn serialize_options_default_indent() {
        assert_eq!(SerializeOptions::default().indent, "    ");
    }
}
