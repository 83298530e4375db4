//! Content handlers and their registry.
//!
//! A handler owns one content-type tag. It validates nodes of that type,
//! turns them into a [`ContentFragment`](crate::domain::ContentFragment)
//! through the shared [`ProcessContext`], and declares the libraries its
//! output needs.

pub mod ai;
pub mod context;
pub mod media;
pub mod question;
pub mod text;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{ContentNode, LibraryIdentifier};
use crate::error::{CompileError, FieldError, Result};

pub use ai::{AiMultipleChoiceHandler, AiTextHandler, FALLBACK_MARKER};
pub use context::ProcessContext;
pub use media::{AudioHandler, ImageHandler};
pub use question::{MultipleChoiceHandler, TrueFalseHandler};
pub use text::TextHandler;

/// Builder logic for one content type
#[async_trait]
pub trait ContentHandler: Send + Sync {
    /// Tag used in documents, e.g. `multiple-choice`
    fn type_tag(&self) -> &str;

    /// Check a node's fields without side effects
    fn validate(&self, node: &ContentNode) -> std::result::Result<(), FieldError>;

    /// Emit the node's fragment (and media) into the context
    ///
    /// Only called on nodes that passed [`validate`](Self::validate).
    async fn process(&self, ctx: &mut ProcessContext, node: &ContentNode) -> Result<()>;

    /// Library that renders this handler's fragments
    fn main_library(&self) -> LibraryIdentifier;

    /// Every library this handler's output may reference
    fn required_libraries(&self) -> Vec<LibraryIdentifier> {
        vec![self.main_library()]
    }

    /// Whether fragments may be nested inside a column container
    fn embeddable(&self) -> bool {
        true
    }
}

/// Tag to handler map, built once and shared with the compiler
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn ContentHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in handler
    pub fn with_builtin_handlers() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(TextHandler)?;
        registry.register(ImageHandler)?;
        registry.register(AudioHandler)?;
        registry.register(MultipleChoiceHandler)?;
        registry.register(TrueFalseHandler)?;
        registry.register(AiTextHandler)?;
        registry.register(AiMultipleChoiceHandler)?;
        Ok(registry)
    }

    /// Add a handler; tags must be unique
    pub fn register<H: ContentHandler + 'static>(&mut self, handler: H) -> Result<()> {
        let tag = handler.type_tag().to_string();
        if self.handlers.contains_key(&tag) {
            return Err(CompileError::DuplicateHandler(tag));
        }
        self.handlers.insert(tag, Box::new(handler));
        Ok(())
    }

    pub fn lookup(&self, tag: &str) -> Option<&dyn ContentHandler> {
        self.handlers.get(tag).map(|h| h.as_ref())
    }

    /// Registered tags, sorted
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ============================================================================
// Field helpers shared by the built-in handlers
// ============================================================================

/// Required non-empty string field
pub(crate) fn require_str<'a>(
    node: &'a ContentNode,
    field: &str,
) -> std::result::Result<&'a str, FieldError> {
    match node.str_field(field) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(FieldError::new(field, "must be a non-empty string")),
    }
}

/// Optional string field; present but non-string is an error
pub(crate) fn optional_str<'a>(
    node: &'a ContentNode,
    field: &str,
) -> std::result::Result<Option<&'a str>, FieldError> {
    match node.field(field) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| FieldError::new(field, "must be a string")),
    }
}
