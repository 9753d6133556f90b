//! Source text that can be handed around cheaply.
//!
//! `SourceText` wraps the component source in an `Arc<str>`. The lifecycle
//! controller replaces it wholesale on every edit, and each compilation
//! attempt keeps its own clone, so an attempt never observes a newer edit.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Wrapper around component source code that can be cheaply cloned.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct SourceText(Arc<str>);

impl SourceText {
    pub fn new(code: impl Into<Arc<str>>) -> Self {
        SourceText(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the source code in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether both values share the same allocation.
    ///
    /// Clones of one edit are identical; a new edit with equal content is not.
    pub fn is_same_edit(&self, other: &SourceText) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for SourceText {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for SourceText {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for SourceText {
    fn from(code: &str) -> Self {
        SourceText::new(code)
    }
}

impl From<String> for SourceText {
    fn from(code: String) -> Self {
        SourceText::new(code)
    }
}

impl fmt::Debug for SourceText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceText({} bytes)", self.0.len())
    }
}

impl fmt::Display for SourceText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_is_same_edit() {
        let source = SourceText::new("export default 1");
        let clone = source.clone();
        assert!(source.is_same_edit(&clone));
        assert_eq!(clone.as_str(), "export default 1");
    }

    #[test]
    fn test_equal_content_is_new_edit() {
        let first = SourceText::from("a");
        let second = SourceText::from(String::from("a"));
        assert_eq!(first, second);
        assert!(!first.is_same_edit(&second));
    }

    #[test]
    fn test_source_text_is_send_sync() {
        fn is_send<T: Send>() {}
        fn is_sync<T: Sync>() {}
        is_send::<SourceText>();
        is_sync::<SourceText>();
    }
}
