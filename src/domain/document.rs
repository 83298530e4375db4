//! Typed input documents.
//!
//! Documents are normally produced by an external parser. For convenience
//! they can also be loaded directly from YAML:
//!
//! ```yaml
//! title: Intro course
//! language: en
//! kind: column
//! content:
//!   - type: text
//!     title: Intro
//!     text: Hello
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A complete content document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Package title
    pub title: String,

    /// Content language (BCP 47 tag, e.g. "en")
    #[serde(default = "default_language")]
    pub language: String,

    /// Shape of the produced package
    #[serde(default)]
    pub kind: PackageKind,

    /// Document-wide generation settings for AI-backed content
    #[serde(default)]
    pub generation: Option<GenerationConfig>,

    /// Content items in document order
    #[serde(default)]
    pub content: Vec<ContentNode>,

    /// Directory relative media paths are resolved against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

fn default_language() -> String {
    "en".to_string()
}

impl Document {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            language: default_language(),
            kind: PackageKind::default(),
            generation: None,
            content: Vec::new(),
            base_dir: None,
        }
    }

    /// Append a content node
    pub fn with_node(mut self, node: ContentNode) -> Self {
        self.content.push(node);
        self
    }

    pub fn with_kind(mut self, kind: PackageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Load a document from a YAML file; media paths resolve next to it
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read document: {}", path.display()))?;

        let mut document = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse document: {}", path.display()))?;
        document.base_dir = path.parent().map(Path::to_path_buf);
        Ok(document)
    }

    /// Parse a document from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse document YAML")
    }

    /// Node path used in error messages, e.g. `content[3]`
    pub fn node_path(index: usize) -> String {
        format!("content[{}]", index)
    }
}

/// Package shapes the compiler can build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    /// Nodes stacked inside a column container
    #[default]
    Column,

    /// Exactly one node, which becomes the package's main content
    Single,
}

/// One declared content item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentNode {
    /// Content-type tag used for handler dispatch
    #[serde(rename = "type")]
    pub type_tag: String,

    /// Node-scoped generation overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationConfig>,

    /// Remaining type-specific fields, validated by the handler
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ContentNode {
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            generation: None,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String field, if present and a string
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Prompt settings for AI-backed handlers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// System prompt sent with every generation request in scope
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Extra instructions appended to the user prompt
    #[serde(default)]
    pub instructions: Option<String>,
}

impl GenerationConfig {
    /// Field-wise merge: values in `inner` win over `self`
    pub fn overlay(&self, inner: Option<&GenerationConfig>) -> GenerationConfig {
        match inner {
            None => self.clone(),
            Some(inner) => GenerationConfig {
                system_prompt: inner
                    .system_prompt
                    .clone()
                    .or_else(|| self.system_prompt.clone()),
                instructions: inner
                    .instructions
                    .clone()
                    .or_else(|| self.instructions.clone()),
            },
        }
    }
}
